//! In-process camera backend with a control handle that plays the part of
//! the hardware and of other clients competing for the camera.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender};

use crate::capture::domain::camera_backend::{
    CameraBackend, CameraDevice, CameraEvent, CameraInfo, CaptureStream, EventSender, LensFacing,
};
use crate::capture::domain::capture_error::CaptureError;
use crate::capture::domain::frame_reader::FrameReader;
use crate::shared::frame::{Frame, FrameError, Plane};

/// Device error code reported when opening a camera another client holds.
pub const ERROR_CAMERA_IN_USE: i32 = 1;

const LUMA_PADDING: usize = 16;
const CHROMA_PADDING: usize = 8;

struct ActiveDevice {
    id: String,
    token: u64,
    events: EventSender,
    reader: Option<Arc<FrameReader>>,
    streaming: bool,
}

#[derive(Default)]
struct Counters {
    opens: u64,
    closes: u64,
    sessions: u64,
}

struct Shared {
    cameras: Vec<CameraInfo>,
    open_error: Option<CaptureError>,
    fail_configure: bool,
    availability: Option<EventSender>,
    active: Option<ActiveDevice>,
    claimed_externally: bool,
    next_token: u64,
    counters: Counters,
}

type SharedState = Arc<Mutex<Shared>>;

fn lock(shared: &SharedState) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A [`CameraBackend`] whose hardware is driven by a
/// [`SimulatedCameraControl`].
pub struct SimulatedCamera {
    shared: SharedState,
    sequence: Arc<AtomicU64>,
}

impl SimulatedCamera {
    pub fn new(cameras: Vec<CameraInfo>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                cameras,
                open_error: None,
                fail_configure: false,
                availability: None,
                active: None,
                claimed_externally: false,
                next_token: 0,
                counters: Counters::default(),
            })),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// A back camera `"0"` and a front camera `"1"`, like most phones.
    pub fn phone() -> Self {
        Self::new(vec![
            CameraInfo::new("0", LensFacing::Back),
            CameraInfo::new("1", LensFacing::Front),
        ])
    }

    /// Every `open` fails with `error`.
    pub fn with_open_error(self, error: CaptureError) -> Self {
        lock(&self.shared).open_error = Some(error);
        self
    }

    /// Every capture session request reports `ConfigureFailed`.
    pub fn with_failing_configuration(self) -> Self {
        lock(&self.shared).fail_configure = true;
        self
    }

    pub fn control(&self) -> SimulatedCameraControl {
        SimulatedCameraControl {
            shared: Arc::clone(&self.shared),
            sequence: Arc::clone(&self.sequence),
        }
    }
}

impl CameraBackend for SimulatedCamera {
    fn cameras(&self) -> Result<Vec<CameraInfo>, CaptureError> {
        Ok(lock(&self.shared).cameras.clone())
    }

    fn open(&mut self, camera_id: &str, events: EventSender) -> Result<(), CaptureError> {
        let mut shared = lock(&self.shared);
        if let Some(error) = shared.open_error.clone() {
            return Err(error);
        }
        if !shared.cameras.iter().any(|c| c.id == camera_id) {
            return Err(CaptureError::Backend(format!("unknown camera {camera_id}")));
        }
        shared.counters.opens += 1;

        if shared.claimed_externally {
            let _ = events.send(CameraEvent::Error(ERROR_CAMERA_IN_USE));
            return Ok(());
        }

        shared.next_token += 1;
        let token = shared.next_token;
        shared.active = Some(ActiveDevice {
            id: camera_id.to_string(),
            token,
            events: events.clone(),
            reader: None,
            streaming: false,
        });
        if let Some(availability) = &shared.availability {
            let _ = availability.send(CameraEvent::CameraUnavailable(camera_id.to_string()));
        }
        drop(shared);

        let device = SimulatedDevice {
            id: camera_id.to_string(),
            token,
            shared: Arc::clone(&self.shared),
        };
        let _ = events.send(CameraEvent::Opened(Box::new(device)));
        Ok(())
    }

    fn register_availability(&mut self, events: EventSender) {
        lock(&self.shared).availability = Some(events);
    }

    fn unregister_availability(&mut self) {
        lock(&self.shared).availability = None;
    }
}

struct SimulatedDevice {
    id: String,
    token: u64,
    shared: SharedState,
}

impl CameraDevice for SimulatedDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn create_session(
        &mut self,
        output: Arc<FrameReader>,
        events: EventSender,
    ) -> Result<(), CaptureError> {
        let mut shared = lock(&self.shared);
        let fail = shared.fail_configure;
        match shared.active.as_mut() {
            Some(active) if active.token == self.token => {
                if !fail {
                    active.reader = Some(output);
                }
            }
            _ => return Err(CaptureError::Backend(format!("camera {} is closed", self.id))),
        }
        shared.counters.sessions += 1;
        drop(shared);

        let event = if fail {
            CameraEvent::ConfigureFailed
        } else {
            CameraEvent::Configured(Box::new(SimulatedStream {
                token: self.token,
                shared: Arc::clone(&self.shared),
            }))
        };
        let _ = events.send(event);
        Ok(())
    }

    fn close(&mut self) {
        let mut shared = lock(&self.shared);
        shared.counters.closes += 1;
        let ours = shared
            .active
            .as_ref()
            .is_some_and(|active| active.token == self.token);
        if !ours {
            return;
        }
        shared.active = None;
        if let Some(availability) = &shared.availability {
            let _ = availability.send(CameraEvent::CameraAvailable(self.id.clone()));
        }
    }
}

struct SimulatedStream {
    token: u64,
    shared: SharedState,
}

impl SimulatedStream {
    fn set_streaming(&self, streaming: bool) -> bool {
        match lock(&self.shared).active.as_mut() {
            Some(active) if active.token == self.token => {
                active.streaming = streaming;
                true
            }
            _ => false,
        }
    }
}

impl CaptureStream for SimulatedStream {
    fn set_repeating_request(&mut self) -> Result<(), CaptureError> {
        if self.set_streaming(true) {
            Ok(())
        } else {
            Err(CaptureError::Backend("capture session is closed".into()))
        }
    }

    fn close(&mut self) {
        self.set_streaming(false);
    }
}

/// Drives a [`SimulatedCamera`] from tests or a demo: delivers frames and
/// injects the events real hardware and competing clients would cause.
#[derive(Clone)]
pub struct SimulatedCameraControl {
    shared: SharedState,
    sequence: Arc<AtomicU64>,
}

impl SimulatedCameraControl {
    /// Publishes `frame` into the streaming session. Returns `false` when
    /// nothing is streaming.
    pub fn push_frame(&self, frame: Frame) -> bool {
        let reader = {
            let shared = lock(&self.shared);
            match shared.active.as_ref() {
                Some(active) if active.streaming => active.reader.clone(),
                _ => None,
            }
        };
        reader.is_some_and(|reader| reader.publish(frame))
    }

    /// Publishes a generated frame sized for the streaming session.
    pub fn push_synthetic(&self) -> Result<bool, FrameError> {
        let size = {
            let shared = lock(&self.shared);
            shared
                .active
                .as_ref()
                .filter(|active| active.streaming)
                .and_then(|active| active.reader.as_ref())
                .map(|reader| (reader.width(), reader.height()))
        };
        let Some((width, height)) = size else {
            return Ok(false);
        };
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        Ok(self.push_frame(synthetic_frame(width, height, sequence)?))
    }

    /// Another client with higher priority takes `camera_id`. An open device
    /// on it is disconnected first.
    pub fn claim_externally(&self, camera_id: &str) {
        let mut shared = lock(&self.shared);
        shared.claimed_externally = true;
        if shared.active.as_ref().is_some_and(|a| a.id == camera_id) {
            if let Some(active) = shared.active.take() {
                let _ = active.events.send(CameraEvent::Disconnected);
            }
        }
        if let Some(availability) = &shared.availability {
            let _ = availability.send(CameraEvent::CameraUnavailable(camera_id.to_string()));
        }
    }

    /// The competing client lets go of `camera_id`.
    pub fn release_externally(&self, camera_id: &str) {
        let mut shared = lock(&self.shared);
        shared.claimed_externally = false;
        if let Some(availability) = &shared.availability {
            let _ = availability.send(CameraEvent::CameraAvailable(camera_id.to_string()));
        }
    }

    /// The open device drops off without anyone claiming it.
    pub fn disconnect(&self) {
        if let Some(active) = lock(&self.shared).active.take() {
            let _ = active.events.send(CameraEvent::Disconnected);
        }
    }

    /// The open device reports a fatal error.
    pub fn fail(&self, code: i32) {
        if let Some(active) = lock(&self.shared).active.take() {
            let _ = active.events.send(CameraEvent::Error(code));
        }
    }

    pub fn is_open(&self) -> bool {
        lock(&self.shared).active.is_some()
    }

    pub fn is_streaming(&self) -> bool {
        lock(&self.shared)
            .active
            .as_ref()
            .is_some_and(|active| active.streaming)
    }

    pub fn open_count(&self) -> u64 {
        lock(&self.shared).counters.opens
    }

    pub fn close_count(&self) -> u64 {
        lock(&self.shared).counters.closes
    }

    pub fn session_count(&self) -> u64 {
        lock(&self.shared).counters.sessions
    }

    /// Pushes synthetic frames at `fps` until the returned generator drops.
    pub fn start_generator(&self, fps: f64) -> FrameGenerator {
        let period = Duration::from_secs_f64(1.0 / fps.max(0.1));
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
        let control = self.clone();
        let handle = std::thread::spawn(move || loop {
            match stop_rx.recv_timeout(period) {
                Err(RecvTimeoutError::Timeout) => {
                    if let Err(e) = control.push_synthetic() {
                        log::error!("Synthetic frame rejected: {e}");
                        break;
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });
        FrameGenerator {
            stop: Some(stop_tx),
            handle: Some(handle),
        }
    }
}

/// Background frame source started by
/// [`SimulatedCameraControl::start_generator`].
pub struct FrameGenerator {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for FrameGenerator {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// A planar YUV 4:2:0 frame with padded row strides and a moving gradient.
pub fn synthetic_frame(width: u32, height: u32, sequence: u64) -> Result<Frame, FrameError> {
    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = (w / 2, h / 2);
    let luma_stride = w + LUMA_PADDING;
    let chroma_stride = cw + CHROMA_PADDING;
    let shift = sequence as usize;

    let mut y = vec![0u8; luma_stride * h];
    for row in 0..h {
        for col in 0..w {
            y[row * luma_stride + col] = ((col + row + shift) % 256) as u8;
        }
    }
    let u = vec![128u8; chroma_stride * ch];
    let v = vec![128u8; chroma_stride * ch];

    Frame::new(
        width,
        height,
        Plane::new(y, luma_stride, 1),
        Plane::new(u, chroma_stride, 1),
        Plane::new(v, chroma_stride, 1),
        sequence,
    )
}

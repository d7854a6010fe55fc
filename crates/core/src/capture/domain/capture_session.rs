use std::sync::Arc;

use crate::shared::frame::Frame;

use super::camera_backend::{
    select_front_camera, CameraBackend, CameraDevice, CameraEvent, CaptureStream, EventSender,
};
use super::capture_error::CaptureError;
use super::frame_reader::FrameReader;
use super::resource_arbiter::ResourceArbiter;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Opening,
    Opened,
    Configuring,
    Streaming,
}

/// Receives every frame the session streams. The frame is only lent: the
/// session releases it as soon as `on_frame` returns.
pub trait FrameSink: Send {
    fn on_frame(&mut self, frame: &Frame);
}

/// Owns the open-device → configured-session → streaming lifecycle of the
/// front camera.
///
/// All transitions happen in `open`, `close` and `handle_event`, which the
/// owner calls from a single thread draining the session's event queue.
/// Events that do not fit the current state release whatever handle they
/// carry and are otherwise ignored.
pub struct CaptureSession {
    backend: Box<dyn CameraBackend>,
    arbiter: Arc<ResourceArbiter>,
    sink: Box<dyn FrameSink>,
    events: EventSender,
    width: u32,
    height: u32,
    state: SessionState,
    camera_id: Option<String>,
    device: Option<Box<dyn CameraDevice>>,
    stream: Option<Box<dyn CaptureStream>>,
    reader: Option<Arc<FrameReader>>,
    frames_delivered: u64,
}

impl CaptureSession {
    pub fn new(
        backend: Box<dyn CameraBackend>,
        arbiter: Arc<ResourceArbiter>,
        sink: Box<dyn FrameSink>,
        events: EventSender,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            backend,
            arbiter,
            sink,
            events,
            width,
            height,
            state: SessionState::Closed,
            camera_id: None,
            device: None,
            stream: None,
            reader: None,
            frames_delivered: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn camera_id(&self) -> Option<&str> {
        self.camera_id.as_deref()
    }

    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered
    }

    pub fn register_availability(&mut self) {
        self.backend.register_availability(self.events.clone());
    }

    /// Selects the first front-facing camera and requests it be opened.
    ///
    /// A no-op unless the session is `Closed`.
    pub fn open(&mut self) -> Result<(), CaptureError> {
        if self.state != SessionState::Closed {
            log::debug!("Open requested while {:?}; ignoring", self.state);
            return Ok(());
        }

        let cameras = self.backend.cameras().map_err(|e| {
            log::error!("Camera enumeration failed: {e}");
            e
        })?;
        let Some(camera) = select_front_camera(&cameras) else {
            log::error!("No front-facing camera among {} cameras", cameras.len());
            return Err(CaptureError::NoDeviceFound);
        };
        let camera_id = camera.id.clone();

        self.reader = Some(Arc::new(FrameReader::new(
            self.width,
            self.height,
            self.events.clone(),
        )));
        self.camera_id = Some(camera_id.clone());
        self.state = SessionState::Opening;
        log::info!("Opening front camera {camera_id}");

        if let Err(e) = self.backend.open(&camera_id, self.events.clone()) {
            log::error!("Failed to open camera {camera_id}: {e}");
            self.close();
            return Err(e);
        }
        Ok(())
    }

    /// Applies one hardware event. An `Err` means the session was torn down.
    pub fn handle_event(&mut self, event: CameraEvent) -> Result<(), CaptureError> {
        match event {
            CameraEvent::Opened(device) => self.on_opened(device),
            CameraEvent::Configured(stream) => self.on_configured(stream),
            CameraEvent::ConfigureFailed => self.on_configure_failed(),
            CameraEvent::Disconnected => self.on_disconnected(),
            CameraEvent::Error(code) => self.on_error(code),
            CameraEvent::FrameAvailable => {
                self.deliver_latest();
                Ok(())
            }
            CameraEvent::CameraUnavailable(id) => {
                // Our own open in flight also shows up as "unavailable".
                if self.state == SessionState::Opening && self.camera_id() == Some(id.as_str()) {
                    log::debug!("Camera {id} unavailable due to our own open");
                } else {
                    self.arbiter.on_external_unavailable();
                }
                Ok(())
            }
            CameraEvent::CameraAvailable(_) => {
                self.arbiter.on_external_available();
                Ok(())
            }
        }
    }

    /// Releases session, device and frame reader, in that order.
    ///
    /// Idempotent, and safe while an open is still pending.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed
            && self.device.is_none()
            && self.stream.is_none()
            && self.reader.is_none()
        {
            return;
        }

        if let Some(mut stream) = self.stream.take() {
            stream.close();
        }
        let had_device = match self.device.take() {
            Some(mut device) => {
                device.close();
                true
            }
            None => false,
        };
        if let Some(reader) = self.reader.take() {
            reader.close();
        }
        if had_device {
            self.arbiter.on_self_closed();
        }

        if let Some(id) = self.camera_id.take() {
            log::info!("Closed camera {id}");
        }
        self.state = SessionState::Closed;
    }

    /// Closes the session and hands the backend back to the caller.
    pub fn into_backend(mut self) -> Box<dyn CameraBackend> {
        self.close();
        self.backend.unregister_availability();
        self.backend
    }

    fn on_opened(&mut self, mut device: Box<dyn CameraDevice>) -> Result<(), CaptureError> {
        if self.state != SessionState::Opening {
            log::warn!(
                "Camera {} opened while {:?}; releasing it",
                device.id(),
                self.state
            );
            device.close();
            return Ok(());
        }

        self.state = SessionState::Opened;
        self.arbiter.on_self_opened();
        log::info!("Camera {} opened", device.id());

        let Some(reader) = self.reader.clone() else {
            self.device = Some(device);
            self.close();
            return Err(CaptureError::ConfigurationFailed);
        };
        let requested = device.create_session(reader, self.events.clone());
        self.device = Some(device);
        self.state = SessionState::Configuring;

        if let Err(e) = requested {
            log::error!("Capture session request failed: {e}");
            self.close();
            return Err(CaptureError::ConfigurationFailed);
        }
        Ok(())
    }

    fn on_configured(&mut self, mut stream: Box<dyn CaptureStream>) -> Result<(), CaptureError> {
        if self.state != SessionState::Configuring {
            log::warn!("Capture session configured while {:?}; releasing it", self.state);
            stream.close();
            return Ok(());
        }

        let started = stream.set_repeating_request();
        self.stream = Some(stream);
        if let Err(e) = started {
            log::error!("Repeating capture request failed: {e}");
            self.close();
            return Err(CaptureError::ConfigurationFailed);
        }

        self.state = SessionState::Streaming;
        log::info!("Capture session streaming");
        Ok(())
    }

    fn on_configure_failed(&mut self) -> Result<(), CaptureError> {
        if self.state != SessionState::Configuring {
            return Ok(());
        }
        log::error!("Capture session configuration failed");
        self.close();
        Err(CaptureError::ConfigurationFailed)
    }

    fn on_disconnected(&mut self) -> Result<(), CaptureError> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        log::warn!("Camera disconnected; treating as reclaimed by another client");
        self.close();
        self.arbiter.on_external_reclaim();
        Err(CaptureError::UnexpectedDisconnect)
    }

    fn on_error(&mut self, code: i32) -> Result<(), CaptureError> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        log::error!("Camera error: {code}");
        self.close();
        Err(CaptureError::DeviceError(code))
    }

    fn deliver_latest(&mut self) {
        let Some(reader) = self.reader.as_ref() else {
            return;
        };
        let Some(frame) = reader.acquire_latest() else {
            return;
        };
        if self.state == SessionState::Streaming {
            self.sink.on_frame(&frame);
            self.frames_delivered += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::domain::camera_backend::{CameraInfo, LensFacing};
    use crate::capture::domain::resource_arbiter::ResourceState;
    use crate::shared::frame::Plane;
    use crossbeam_channel::Receiver;
    use std::sync::Mutex;

    // --- Stubs ---

    #[derive(Default)]
    struct Calls {
        opens: Vec<String>,
        sessions_requested: usize,
        repeating_started: usize,
        stream_closes: usize,
        device_closes: usize,
        release_order: Vec<&'static str>,
        availability_registered: bool,
    }

    struct StubBackend {
        cameras: Result<Vec<CameraInfo>, CaptureError>,
        open_result: Result<(), CaptureError>,
        calls: Arc<Mutex<Calls>>,
    }

    impl CameraBackend for StubBackend {
        fn cameras(&self) -> Result<Vec<CameraInfo>, CaptureError> {
            self.cameras.clone()
        }

        fn open(&mut self, camera_id: &str, _events: EventSender) -> Result<(), CaptureError> {
            self.calls.lock().unwrap().opens.push(camera_id.to_string());
            self.open_result.clone()
        }

        fn register_availability(&mut self, _events: EventSender) {
            self.calls.lock().unwrap().availability_registered = true;
        }

        fn unregister_availability(&mut self) {
            self.calls.lock().unwrap().availability_registered = false;
        }
    }

    struct StubDevice {
        id: String,
        fail_request: bool,
        calls: Arc<Mutex<Calls>>,
    }

    impl CameraDevice for StubDevice {
        fn id(&self) -> &str {
            &self.id
        }

        fn create_session(
            &mut self,
            _output: Arc<FrameReader>,
            _events: EventSender,
        ) -> Result<(), CaptureError> {
            self.calls.lock().unwrap().sessions_requested += 1;
            if self.fail_request {
                Err(CaptureError::Backend("no surface".into()))
            } else {
                Ok(())
            }
        }

        fn close(&mut self) {
            let mut calls = self.calls.lock().unwrap();
            calls.device_closes += 1;
            calls.release_order.push("device");
        }
    }

    struct StubStream {
        calls: Arc<Mutex<Calls>>,
    }

    impl CaptureStream for StubStream {
        fn set_repeating_request(&mut self) -> Result<(), CaptureError> {
            self.calls.lock().unwrap().repeating_started += 1;
            Ok(())
        }

        fn close(&mut self) {
            let mut calls = self.calls.lock().unwrap();
            calls.stream_closes += 1;
            calls.release_order.push("session");
        }
    }

    struct RecordingSink {
        sequences: Arc<Mutex<Vec<u64>>>,
    }

    impl FrameSink for RecordingSink {
        fn on_frame(&mut self, frame: &Frame) {
            self.sequences.lock().unwrap().push(frame.sequence());
        }
    }

    // --- Helpers ---

    struct Harness {
        session: CaptureSession,
        arbiter: Arc<ResourceArbiter>,
        calls: Arc<Mutex<Calls>>,
        delivered: Arc<Mutex<Vec<u64>>>,
        _events: Receiver<CameraEvent>,
    }

    fn harness_with(
        cameras: Result<Vec<CameraInfo>, CaptureError>,
        open_result: Result<(), CaptureError>,
    ) -> Harness {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let arbiter = Arc::new(ResourceArbiter::new());
        let (tx, rx) = crossbeam_channel::unbounded();
        let session = CaptureSession::new(
            Box::new(StubBackend {
                cameras,
                open_result,
                calls: calls.clone(),
            }),
            arbiter.clone(),
            Box::new(RecordingSink {
                sequences: delivered.clone(),
            }),
            tx,
            4,
            4,
        );
        Harness {
            session,
            arbiter,
            calls,
            delivered,
            _events: rx,
        }
    }

    fn harness() -> Harness {
        harness_with(
            Ok(vec![
                CameraInfo::new("0", LensFacing::Back),
                CameraInfo::new("1", LensFacing::Front),
            ]),
            Ok(()),
        )
    }

    fn device(h: &Harness) -> Box<dyn CameraDevice> {
        Box::new(StubDevice {
            id: "1".into(),
            fail_request: false,
            calls: h.calls.clone(),
        })
    }

    fn stream(h: &Harness) -> Box<dyn CaptureStream> {
        Box::new(StubStream {
            calls: h.calls.clone(),
        })
    }

    fn frame(sequence: u64) -> Frame {
        Frame::new(
            4,
            4,
            Plane::new(vec![0; 16], 4, 1),
            Plane::new(vec![128; 4], 2, 1),
            Plane::new(vec![128; 4], 2, 1),
            sequence,
        )
        .unwrap()
    }

    fn streaming(h: &mut Harness) {
        h.session.open().unwrap();
        let d = device(h);
        h.session.handle_event(CameraEvent::Opened(d)).unwrap();
        let s = stream(h);
        h.session.handle_event(CameraEvent::Configured(s)).unwrap();
        assert_eq!(h.session.state(), SessionState::Streaming);
    }

    fn publish(h: &Harness, sequence: u64) {
        assert!(h.session.reader.as_ref().unwrap().publish(frame(sequence)));
    }

    // --- Tests ---

    #[test]
    fn test_open_selects_first_front_camera() {
        let mut h = harness();
        h.session.open().unwrap();
        assert_eq!(h.session.state(), SessionState::Opening);
        assert_eq!(h.session.camera_id(), Some("1"));
        assert_eq!(h.calls.lock().unwrap().opens, vec!["1".to_string()]);
    }

    #[test]
    fn test_open_without_front_camera_stays_closed() {
        let mut h = harness_with(Ok(vec![CameraInfo::new("0", LensFacing::Back)]), Ok(()));
        assert_eq!(h.session.open(), Err(CaptureError::NoDeviceFound));
        assert_eq!(h.session.state(), SessionState::Closed);
        assert!(h.calls.lock().unwrap().opens.is_empty());
    }

    #[test]
    fn test_open_permission_denied_stays_closed() {
        let mut h = harness_with(
            Ok(vec![CameraInfo::new("1", LensFacing::Front)]),
            Err(CaptureError::PermissionDenied),
        );
        assert_eq!(h.session.open(), Err(CaptureError::PermissionDenied));
        assert_eq!(h.session.state(), SessionState::Closed);
        assert!(h.session.reader.is_none());
    }

    #[test]
    fn test_enumeration_failure_is_returned() {
        let mut h = harness_with(Err(CaptureError::PermissionDenied), Ok(()));
        assert_eq!(h.session.open(), Err(CaptureError::PermissionDenied));
        assert_eq!(h.session.state(), SessionState::Closed);
    }

    #[test]
    fn test_open_while_open_is_noop() {
        let mut h = harness();
        h.session.open().unwrap();
        h.session.open().unwrap();
        assert_eq!(h.calls.lock().unwrap().opens.len(), 1);
    }

    #[test]
    fn test_full_lifecycle_reaches_streaming() {
        let mut h = harness();
        h.session.open().unwrap();
        let d = device(&h);
        h.session.handle_event(CameraEvent::Opened(d)).unwrap();
        assert_eq!(h.session.state(), SessionState::Configuring);
        assert_eq!(h.arbiter.state(), ResourceState::OwnedBySelf);
        assert_eq!(h.calls.lock().unwrap().sessions_requested, 1);

        let s = stream(&h);
        h.session.handle_event(CameraEvent::Configured(s)).unwrap();
        assert_eq!(h.session.state(), SessionState::Streaming);
        assert_eq!(h.calls.lock().unwrap().repeating_started, 1);
    }

    #[test]
    fn test_frames_delivered_only_while_streaming() {
        let mut h = harness();
        streaming(&mut h);

        publish(&h, 1);
        h.session.handle_event(CameraEvent::FrameAvailable).unwrap();
        publish(&h, 2);
        publish(&h, 3);
        h.session.handle_event(CameraEvent::FrameAvailable).unwrap();
        // Spurious notification with nothing pending.
        h.session.handle_event(CameraEvent::FrameAvailable).unwrap();

        assert_eq!(*h.delivered.lock().unwrap(), vec![1, 3]);
        assert_eq!(h.session.frames_delivered(), 2);
    }

    #[test]
    fn test_configure_failure_tears_down() {
        let mut h = harness();
        h.session.open().unwrap();
        let d = device(&h);
        h.session.handle_event(CameraEvent::Opened(d)).unwrap();

        let result = h.session.handle_event(CameraEvent::ConfigureFailed);

        assert_eq!(result, Err(CaptureError::ConfigurationFailed));
        assert_eq!(h.session.state(), SessionState::Closed);
        assert_eq!(h.calls.lock().unwrap().device_closes, 1);
        assert_eq!(h.arbiter.state(), ResourceState::Idle);
    }

    #[test]
    fn test_session_request_failure_tears_down() {
        let mut h = harness();
        h.session.open().unwrap();
        let d = Box::new(StubDevice {
            id: "1".into(),
            fail_request: true,
            calls: h.calls.clone(),
        });

        let result = h.session.handle_event(CameraEvent::Opened(d));

        assert_eq!(result, Err(CaptureError::ConfigurationFailed));
        assert_eq!(h.session.state(), SessionState::Closed);
        assert_eq!(h.calls.lock().unwrap().device_closes, 1);
    }

    #[test]
    fn test_disconnect_marks_external_reclaim() {
        let mut h = harness();
        streaming(&mut h);

        let result = h.session.handle_event(CameraEvent::Disconnected);

        assert_eq!(result, Err(CaptureError::UnexpectedDisconnect));
        assert_eq!(h.session.state(), SessionState::Closed);
        assert_eq!(h.arbiter.state(), ResourceState::OwnedExternally);
        assert!(h.arbiter.is_paused());
        let calls = h.calls.lock().unwrap();
        assert_eq!(calls.stream_closes, 1);
        assert_eq!(calls.device_closes, 1);
    }

    #[test]
    fn test_error_while_opening_tears_down() {
        let mut h = harness();
        h.session.open().unwrap();

        let result = h.session.handle_event(CameraEvent::Error(4));

        assert_eq!(result, Err(CaptureError::DeviceError(4)));
        assert_eq!(h.session.state(), SessionState::Closed);
        assert!(h.session.reader.is_none());
    }

    #[test]
    fn test_events_after_close_are_ignored() {
        let mut h = harness();
        streaming(&mut h);
        h.session.close();

        assert_eq!(h.session.handle_event(CameraEvent::Disconnected), Ok(()));
        assert_eq!(h.session.handle_event(CameraEvent::Error(1)), Ok(()));
        assert_eq!(h.session.handle_event(CameraEvent::ConfigureFailed), Ok(()));
        assert_eq!(h.calls.lock().unwrap().device_closes, 1);
    }

    #[test]
    fn test_late_open_after_close_releases_device() {
        let mut h = harness();
        h.session.open().unwrap();
        h.session.close();

        let d = device(&h);
        h.session.handle_event(CameraEvent::Opened(d)).unwrap();

        assert_eq!(h.session.state(), SessionState::Closed);
        assert_eq!(h.calls.lock().unwrap().device_closes, 1);
        assert_eq!(h.arbiter.state(), ResourceState::Idle);
    }

    #[test]
    fn test_stray_configured_stream_is_released() {
        let mut h = harness();
        let s = stream(&h);
        h.session.handle_event(CameraEvent::Configured(s)).unwrap();
        assert_eq!(h.session.state(), SessionState::Closed);
        assert_eq!(h.calls.lock().unwrap().stream_closes, 1);
    }

    #[test]
    fn test_close_releases_in_reverse_acquisition_order() {
        let mut h = harness();
        streaming(&mut h);
        let reader = h.session.reader.clone().unwrap();

        h.session.close();

        assert_eq!(
            h.calls.lock().unwrap().release_order,
            vec!["session", "device"]
        );
        assert!(reader.is_closed());
        assert_eq!(h.arbiter.state(), ResourceState::Idle);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut h = harness();
        streaming(&mut h);

        h.session.close();
        h.session.close();

        let calls = h.calls.lock().unwrap();
        assert_eq!(calls.stream_closes, 1);
        assert_eq!(calls.device_closes, 1);
    }

    #[test]
    fn test_close_before_open_is_noop() {
        let mut h = harness();
        h.session.close();
        assert_eq!(h.session.state(), SessionState::Closed);
        assert_eq!(h.calls.lock().unwrap().device_closes, 0);
    }

    #[test]
    fn test_own_open_unavailability_does_not_pause() {
        let mut h = harness();
        h.session.open().unwrap();

        h.session
            .handle_event(CameraEvent::CameraUnavailable("1".into()))
            .unwrap();

        assert!(!h.arbiter.is_paused());
    }

    #[test]
    fn test_other_camera_unavailability_pauses() {
        let mut h = harness();
        h.session
            .handle_event(CameraEvent::CameraUnavailable("0".into()))
            .unwrap();
        assert!(h.arbiter.is_paused());

        h.session
            .handle_event(CameraEvent::CameraAvailable("0".into()))
            .unwrap();
        assert!(!h.arbiter.is_paused());
    }

    #[test]
    fn test_into_backend_closes_and_unregisters() {
        let mut h = harness();
        h.session.register_availability();
        streaming(&mut h);
        let calls = h.calls.clone();

        let _backend = h.session.into_backend();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.device_closes, 1);
        assert!(!calls.availability_registered);
    }
}

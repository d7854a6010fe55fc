use std::fmt;
use std::sync::Arc;

use crossbeam_channel::Sender;

use super::capture_error::CaptureError;
use super::frame_reader::FrameReader;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LensFacing {
    Front,
    Back,
    External,
}

/// One camera identity reported by enumeration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraInfo {
    pub id: String,
    pub facing: LensFacing,
}

impl CameraInfo {
    pub fn new(id: impl Into<String>, facing: LensFacing) -> Self {
        Self {
            id: id.into(),
            facing,
        }
    }
}

/// Hardware callbacks, funnelled into a single event queue.
///
/// Handles travel inside the events that create them so the consumer
/// becomes their sole owner.
pub enum CameraEvent {
    /// The requested device finished opening.
    Opened(Box<dyn CameraDevice>),
    /// The open device was taken away (typically by a higher-priority client).
    Disconnected,
    /// The open device hit a fatal error.
    Error(i32),
    /// The capture session is configured and ready for requests.
    Configured(Box<dyn CaptureStream>),
    ConfigureFailed,
    /// The frame reader holds a new latest frame.
    FrameAvailable,
    /// Some client (possibly this one) claimed the camera.
    CameraUnavailable(String),
    /// The camera was released and can be opened.
    CameraAvailable(String),
}

impl fmt::Debug for CameraEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraEvent::Opened(device) => write!(f, "Opened({})", device.id()),
            CameraEvent::Disconnected => write!(f, "Disconnected"),
            CameraEvent::Error(code) => write!(f, "Error({code})"),
            CameraEvent::Configured(_) => write!(f, "Configured"),
            CameraEvent::ConfigureFailed => write!(f, "ConfigureFailed"),
            CameraEvent::FrameAvailable => write!(f, "FrameAvailable"),
            CameraEvent::CameraUnavailable(id) => write!(f, "CameraUnavailable({id})"),
            CameraEvent::CameraAvailable(id) => write!(f, "CameraAvailable({id})"),
        }
    }
}

pub type EventSender = Sender<CameraEvent>;

/// Platform camera service: enumeration, opening, availability callbacks.
///
/// Opening is asynchronous: `open` only issues the request, and the outcome
/// arrives later as [`CameraEvent::Opened`], `Disconnected` or `Error`.
/// Implementations must not emit device events for a device after its
/// `close` has returned.
pub trait CameraBackend: Send {
    fn cameras(&self) -> Result<Vec<CameraInfo>, CaptureError>;

    fn open(&mut self, camera_id: &str, events: EventSender) -> Result<(), CaptureError>;

    /// Starts reporting `CameraAvailable`/`CameraUnavailable` for every camera.
    fn register_availability(&mut self, events: EventSender);

    fn unregister_availability(&mut self);
}

/// An opened camera device.
pub trait CameraDevice: Send {
    fn id(&self) -> &str;

    /// Requests a capture session targeting `output`; the outcome arrives as
    /// [`CameraEvent::Configured`] or [`CameraEvent::ConfigureFailed`].
    fn create_session(
        &mut self,
        output: Arc<FrameReader>,
        events: EventSender,
    ) -> Result<(), CaptureError>;

    fn close(&mut self);
}

/// A configured capture session.
pub trait CaptureStream: Send {
    /// Starts the continuous repeating capture into the session's output.
    fn set_repeating_request(&mut self) -> Result<(), CaptureError>;

    fn close(&mut self);
}

/// First front-facing camera in enumeration order. No tie-break beyond order.
pub fn select_front_camera(cameras: &[CameraInfo]) -> Option<&CameraInfo> {
    cameras.iter().find(|c| c.facing == LensFacing::Front)
}

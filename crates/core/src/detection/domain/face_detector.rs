use thiserror::Error;

use crate::shared::constants::ALERT_MIN_FACES;
use crate::shared::converted_image::ConvertedImage;

/// Outcome of one detector run: how many faces the image contains.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DetectionResult {
    face_count: u32,
}

impl DetectionResult {
    pub fn new(face_count: u32) -> Self {
        Self { face_count }
    }

    pub fn face_count(&self) -> u32 {
        self.face_count
    }

    /// More than one face in view: someone may be looking over a shoulder.
    pub fn is_shoulder_surfing(&self) -> bool {
        self.face_count >= ALERT_MIN_FACES
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DetectorError {
    #[error("face detection failed: {0}")]
    Failed(String),
    #[error("detector is still busy with an earlier frame")]
    Busy,
    #[error("detector has shut down")]
    Unavailable,
}

/// Domain interface for a blocking face detector.
///
/// Implementations may keep state between calls, hence `&mut self`.
pub trait FaceDetector: Send {
    fn detect(
        &mut self,
        image: &ConvertedImage,
    ) -> Result<DetectionResult, Box<dyn std::error::Error>>;
}

pub type DetectionCallback = Box<dyn FnOnce(Result<DetectionResult, DetectorError>) + Send>;

/// Fire-and-forget face detection.
///
/// `submit` must not block on the detection itself. `on_complete` runs
/// exactly once, possibly on another thread and possibly out of submission
/// order.
pub trait AsyncFaceDetector: Send + Sync {
    fn submit(&self, image: ConvertedImage, on_complete: DetectionCallback);
}

use crate::detection::domain::face_detector::{DetectionResult, FaceDetector};
use crate::shared::converted_image::ConvertedImage;

/// Replays a fixed cycle of face counts, one per detection.
///
/// Stands in for a real model when exercising the monitor end to end
/// (demos, simulated sources, tests).
pub struct ScriptedFaceDetector {
    counts: Vec<u32>,
    next: usize,
}

impl ScriptedFaceDetector {
    pub fn new(counts: Vec<u32>) -> Result<Self, &'static str> {
        if counts.is_empty() {
            return Err("face count script must not be empty");
        }
        Ok(Self { counts, next: 0 })
    }
}

impl FaceDetector for ScriptedFaceDetector {
    fn detect(
        &mut self,
        _image: &ConvertedImage,
    ) -> Result<DetectionResult, Box<dyn std::error::Error>> {
        let count = self.counts[self.next % self.counts.len()];
        self.next += 1;
        Ok(DetectionResult::new(count))
    }
}

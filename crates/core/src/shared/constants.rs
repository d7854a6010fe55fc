use std::time::Duration;

pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

/// Minimum spacing between two frames admitted to face detection.
pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_millis(800);

/// Frame size requested from the capture pipeline.
pub const DEFAULT_CAPTURE_WIDTH: u32 = 640;
pub const DEFAULT_CAPTURE_HEIGHT: u32 = 480;

/// Rotation handed to the detector. Front-camera orientation correction is
/// device specific and not applied.
pub const DETECTOR_ROTATION_DEGREES: i32 = 0;

/// Face count at which a frame counts as shoulder surfing.
pub const ALERT_MIN_FACES: u32 = 2;

use thiserror::Error;

/// Failures of the camera capture lifecycle.
///
/// Every variant ends with the capture session fully torn down to `Closed`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no front-facing camera found")]
    NoDeviceFound,
    #[error("capture session configuration failed")]
    ConfigurationFailed,
    #[error("camera disconnected unexpectedly")]
    UnexpectedDisconnect,
    #[error("camera device error (code {0})")]
    DeviceError(i32),
    #[error("camera backend error: {0}")]
    Backend(String),
}

impl CaptureError {
    /// Errors that abort startup rather than degrade a running monitor.
    pub fn is_fatal_to_open(&self) -> bool {
        matches!(self, Self::PermissionDenied | Self::NoDeviceFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::permission(CaptureError::PermissionDenied, true)]
    #[case::no_device(CaptureError::NoDeviceFound, true)]
    #[case::configuration(CaptureError::ConfigurationFailed, false)]
    #[case::disconnect(CaptureError::UnexpectedDisconnect, false)]
    #[case::device(CaptureError::DeviceError(3), false)]
    fn test_is_fatal_to_open(#[case] err: CaptureError, #[case] fatal: bool) {
        assert_eq!(err.is_fatal_to_open(), fatal);
    }

    #[test]
    fn test_display_includes_code() {
        assert_eq!(
            CaptureError::DeviceError(4).to_string(),
            "camera device error (code 4)"
        );
    }
}

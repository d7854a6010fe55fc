use std::time::Duration;

use super::constants::{DEFAULT_CAPTURE_HEIGHT, DEFAULT_CAPTURE_WIDTH, DEFAULT_THROTTLE_INTERVAL};

/// Tunables for one monitoring service.
#[derive(Clone, Debug, PartialEq)]
pub struct MonitorConfig {
    pub throttle_interval: Duration,
    pub capture_width: u32,
    pub capture_height: u32,
    /// Reopen the camera once another consumer that reclaimed it lets go.
    pub reopen_on_available: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            throttle_interval: DEFAULT_THROTTLE_INTERVAL,
            capture_width: DEFAULT_CAPTURE_WIDTH,
            capture_height: DEFAULT_CAPTURE_HEIGHT,
            reopen_on_available: true,
        }
    }
}

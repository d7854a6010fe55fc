use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use privacy_guard_core::detection::infrastructure::onnx_face_detector::DEFAULT_CONFIDENCE;
use privacy_guard_core::shared::monitor_config::MonitorConfig;

/// Persisted defaults for the `privacy-guard` command. Command-line flags
/// override them for a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub interval_ms: u64,
    /// Detection confidence in percent.
    pub confidence: u32,
    pub capture_width: u32,
    pub capture_height: u32,
    pub reopen_on_available: bool,
    pub bell: bool,
}

impl Default for Settings {
    fn default() -> Self {
        let config = MonitorConfig::default();
        Self {
            interval_ms: config.throttle_interval.as_millis() as u64,
            confidence: (DEFAULT_CONFIDENCE * 100.0).round() as u32,
            capture_width: config.capture_width,
            capture_height: config.capture_height,
            reopen_on_available: config.reopen_on_available,
            bell: false,
        }
    }
}

impl Settings {
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("PrivacyGuard").join("settings.json"))
    }

    /// Saved settings, or defaults when none are saved or the file is unreadable.
    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    pub fn load_from(path: &Path) -> Self {
        let parsed = fs::read_to_string(path)
            .ok()
            .map(|json| serde_json::from_str::<Self>(&json));
        match parsed {
            Some(Ok(settings)) => settings,
            Some(Err(e)) => {
                log::warn!("Ignoring malformed settings {}: {e}", path.display());
                Self::default()
            }
            None => Self::default(),
        }
    }

    pub fn save(&self) -> io::Result<PathBuf> {
        let path = Self::config_path()
            .ok_or_else(|| io::Error::other("could not determine config directory"))?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        fs::write(path, json)
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence.min(100) as f64 / 100.0
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            throttle_interval: Duration::from_millis(self.interval_ms),
            capture_width: self.capture_width,
            capture_height: self.capture_height,
            reopen_on_available: self.reopen_on_available,
        }
    }
}

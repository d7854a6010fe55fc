use crate::alert::domain::alert_sink::AlertSink;

/// Reports alerts through the `log` facade at warn level.
#[derive(Debug, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn alert(&self, face_count: u32) {
        log::warn!("Shoulder surfing suspected: {face_count} faces in view");
    }
}

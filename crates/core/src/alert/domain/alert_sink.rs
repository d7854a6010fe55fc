/// Receives shoulder-surfing alerts.
///
/// Called from the detector's completion thread. Implementations must not
/// block for long: the next detection waits behind them.
pub trait AlertSink: Send + Sync {
    fn alert(&self, face_count: u32);
}

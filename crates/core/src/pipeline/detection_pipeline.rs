use std::sync::Arc;
use std::time::Instant;

use crate::alert::domain::alert_sink::AlertSink;
use crate::capture::domain::capture_session::FrameSink;
use crate::capture::domain::pixel_format_converter::convert;
use crate::capture::domain::resource_arbiter::ResourceArbiter;
use crate::detection::domain::face_detector::{AsyncFaceDetector, DetectorError};
use crate::detection::domain::frame_throttle::FrameThrottle;
use crate::shared::constants::DETECTOR_ROTATION_DEGREES;
use crate::shared::frame::Frame;

use super::pipeline_liveness::PipelineLiveness;
use super::pipeline_stats::PipelineStats;

/// What happened to one frame handed to the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The pipeline has been shut down.
    Stopped,
    /// Another client owns the camera.
    Paused,
    /// Too soon after the last admitted frame.
    Throttled,
    /// Converted and handed to the detector.
    Submitted,
}

/// Gates frames through pause and throttle, sends survivors to the face
/// detector and raises an alert when a result shows more than one face.
///
/// Each admitted frame causes exactly one detector submission and at most
/// one alert. Detector failures are logged and never retried.
pub struct DetectionPipeline {
    arbiter: Arc<ResourceArbiter>,
    throttle: Arc<FrameThrottle>,
    detector: Arc<dyn AsyncFaceDetector>,
    alert_sink: Arc<dyn AlertSink>,
    liveness: Arc<PipelineLiveness>,
    stats: Arc<PipelineStats>,
}

impl DetectionPipeline {
    pub fn new(
        arbiter: Arc<ResourceArbiter>,
        throttle: Arc<FrameThrottle>,
        detector: Arc<dyn AsyncFaceDetector>,
        alert_sink: Arc<dyn AlertSink>,
        liveness: Arc<PipelineLiveness>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            arbiter,
            throttle,
            detector,
            alert_sink,
            liveness,
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    pub fn liveness(&self) -> &Arc<PipelineLiveness> {
        &self.liveness
    }

    /// Discards every in-flight detection. No alert is raised once this
    /// returns.
    pub fn shutdown(&self) {
        self.liveness.shut_down();
    }

    /// Runs one frame through the gates as of `now`.
    ///
    /// The pause check comes first so paused frames never consume the
    /// throttle window.
    pub fn process(&self, frame: &Frame, now: Instant) -> FrameOutcome {
        self.stats.record_frame();

        let Some(ticket) = self.liveness.ticket() else {
            return FrameOutcome::Stopped;
        };
        if self.arbiter.is_paused() {
            self.stats.record_paused();
            log::debug!("Frame {} dropped: camera paused", frame.sequence());
            return FrameOutcome::Paused;
        }
        if !self.throttle.admit(now) {
            self.stats.record_throttled();
            return FrameOutcome::Throttled;
        }

        let image = convert(frame, DETECTOR_ROTATION_DEGREES);
        let sequence = frame.sequence();
        let alert_sink = Arc::clone(&self.alert_sink);
        let stats = Arc::clone(&self.stats);
        self.stats.record_submitted();
        log::debug!("Frame {sequence} submitted for detection");

        self.detector.submit(
            image,
            Box::new(move |result| {
                let delivered = ticket.deliver(|| match result {
                    Ok(detection) => {
                        stats.record_detection();
                        if detection.is_shoulder_surfing() {
                            stats.record_alert();
                            alert_sink.alert(detection.face_count());
                        }
                    }
                    Err(DetectorError::Busy) => {
                        stats.record_failure();
                        log::debug!("Frame {sequence} skipped: detector busy");
                    }
                    Err(e) => {
                        stats.record_failure();
                        log::error!("Face detection failed for frame {sequence}: {e}");
                    }
                });
                if !delivered {
                    stats.record_stale();
                    log::debug!("Discarding detection for frame {sequence} after shutdown");
                }
            }),
        );
        FrameOutcome::Submitted
    }
}

impl FrameSink for DetectionPipeline {
    fn on_frame(&mut self, frame: &Frame) {
        self.process(frame, Instant::now());
    }
}

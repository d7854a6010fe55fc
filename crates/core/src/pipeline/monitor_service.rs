use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use crossbeam_channel::{select, Receiver, Sender};
use thiserror::Error;

use crate::alert::domain::alert_sink::AlertSink;
use crate::capture::domain::camera_backend::{CameraBackend, CameraEvent};
use crate::capture::domain::capture_error::CaptureError;
use crate::capture::domain::capture_session::{CaptureSession, SessionState};
use crate::capture::domain::resource_arbiter::ResourceArbiter;
use crate::detection::domain::face_detector::AsyncFaceDetector;
use crate::detection::domain::frame_throttle::FrameThrottle;
use crate::shared::monitor_config::MonitorConfig;

use super::detection_pipeline::DetectionPipeline;
use super::pipeline_liveness::PipelineLiveness;
use super::pipeline_stats::{PipelineStats, StatsSnapshot};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error("failed to start capture: {0}")]
    Capture(#[from] CaptureError),
    #[error("monitor worker thread panicked")]
    WorkerPanicked,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// Externally visible state of the service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MonitorStatus {
    Stopped,
    /// The camera is being opened or configured.
    Starting,
    /// Frames are flowing to the detector.
    Watching,
    /// Another client holds the camera.
    Paused,
    /// Running, but capture failed and will not recover on its own.
    Degraded(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Phase {
    Starting,
    Streaming,
    /// Closed after the camera was taken away; waiting for it to come back.
    Reclaimed,
    Degraded(String),
}

enum Control {
    Stop,
}

struct Run {
    control: Sender<Control>,
    worker: JoinHandle<Box<dyn CameraBackend>>,
    arbiter: Arc<ResourceArbiter>,
    phase: Arc<Mutex<Phase>>,
}

/// Owns one front-camera monitoring lifecycle.
///
/// `start` spawns a worker thread that opens the camera and then handles
/// every camera event and control command from one loop. The backend moves
/// into the worker for the run and comes back when `stop` joins it, so the
/// service can be started again.
pub struct MonitorService {
    config: MonitorConfig,
    backend: Option<Box<dyn CameraBackend>>,
    detector: Arc<dyn AsyncFaceDetector>,
    alert_sink: Arc<dyn AlertSink>,
    throttle: Arc<FrameThrottle>,
    liveness: Arc<PipelineLiveness>,
    stats: Arc<PipelineStats>,
    run: Option<Run>,
}

impl MonitorService {
    pub fn new(
        config: MonitorConfig,
        backend: Box<dyn CameraBackend>,
        detector: Arc<dyn AsyncFaceDetector>,
        alert_sink: Arc<dyn AlertSink>,
    ) -> Self {
        let throttle = Arc::new(FrameThrottle::new(config.throttle_interval));
        Self {
            config,
            backend: Some(backend),
            detector,
            alert_sink,
            throttle,
            liveness: Arc::new(PipelineLiveness::new()),
            stats: Arc::new(PipelineStats::new()),
            run: None,
        }
    }

    /// Opens the front camera and starts watching.
    ///
    /// Returns once the open request has been issued. Permission and
    /// missing-camera failures are returned here; later capture failures
    /// show up in [`status`](Self::status).
    pub fn start(&mut self) -> Result<StartOutcome, MonitorError> {
        if self.run.is_some() {
            return Ok(StartOutcome::AlreadyRunning);
        }
        let backend = self.backend.take().ok_or(MonitorError::WorkerPanicked)?;

        self.throttle.reset();
        self.liveness.begin();

        let arbiter = Arc::new(ResourceArbiter::new());
        let phase = Arc::new(Mutex::new(Phase::Starting));
        let pipeline = DetectionPipeline::new(
            Arc::clone(&arbiter),
            Arc::clone(&self.throttle),
            Arc::clone(&self.detector),
            Arc::clone(&self.alert_sink),
            Arc::clone(&self.liveness),
            Arc::clone(&self.stats),
        );

        // Fresh per run: events from a previous run die with their channel.
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let (control_tx, control_rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let worker = Worker {
            session: CaptureSession::new(
                backend,
                Arc::clone(&arbiter),
                Box::new(pipeline),
                events_tx,
                self.config.capture_width,
                self.config.capture_height,
            ),
            arbiter: Arc::clone(&arbiter),
            phase: Arc::clone(&phase),
            reopen_on_available: self.config.reopen_on_available,
        };
        let handle = std::thread::spawn(move || worker.run(control_rx, events_rx, ready_tx));

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.run = Some(Run {
                    control: control_tx,
                    worker: handle,
                    arbiter,
                    phase,
                });
                log::info!("Monitoring started");
                Ok(StartOutcome::Started)
            }
            Ok(Err(e)) => {
                self.liveness.shut_down();
                self.reclaim_backend(handle)?;
                Err(MonitorError::Capture(e))
            }
            Err(_) => {
                self.liveness.shut_down();
                self.reclaim_backend(handle)?;
                Err(MonitorError::WorkerPanicked)
            }
        }
    }

    /// Stops watching and releases the camera. A no-op when stopped.
    ///
    /// No alert is raised once this returns, even for detections still in
    /// flight.
    pub fn stop(&mut self) -> Result<(), MonitorError> {
        let Some(run) = self.run.take() else {
            return Ok(());
        };
        self.liveness.shut_down();
        let _ = run.control.send(Control::Stop);
        self.reclaim_backend(run.worker)?;
        log::info!("Monitoring stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    pub fn status(&self) -> MonitorStatus {
        let Some(run) = &self.run else {
            return MonitorStatus::Stopped;
        };
        if run.worker.is_finished() {
            return MonitorStatus::Degraded("monitor worker exited".into());
        }
        let phase = lock(&run.phase).clone();
        match phase {
            Phase::Starting => MonitorStatus::Starting,
            Phase::Degraded(reason) => MonitorStatus::Degraded(reason),
            _ if run.arbiter.is_paused() => MonitorStatus::Paused,
            Phase::Streaming => MonitorStatus::Watching,
            Phase::Reclaimed => {
                MonitorStatus::Degraded("camera was reclaimed and not reopened".into())
            }
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    fn reclaim_backend(
        &mut self,
        worker: JoinHandle<Box<dyn CameraBackend>>,
    ) -> Result<(), MonitorError> {
        match worker.join() {
            Ok(backend) => {
                self.backend = Some(backend);
                Ok(())
            }
            Err(_) => {
                log::error!("Monitor worker panicked; camera backend lost");
                Err(MonitorError::WorkerPanicked)
            }
        }
    }
}

impl Drop for MonitorService {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("Stopping monitor on drop failed: {e}");
        }
    }
}

struct Worker {
    session: CaptureSession,
    arbiter: Arc<ResourceArbiter>,
    phase: Arc<Mutex<Phase>>,
    reopen_on_available: bool,
}

impl Worker {
    fn run(
        mut self,
        control: Receiver<Control>,
        events: Receiver<CameraEvent>,
        ready: Sender<Result<(), CaptureError>>,
    ) -> Box<dyn CameraBackend> {
        self.session.register_availability();
        match self.session.open() {
            Ok(()) => {
                let _ = ready.send(Ok(()));
            }
            Err(e) if e.is_fatal_to_open() => {
                let _ = ready.send(Err(e));
                return self.session.into_backend();
            }
            Err(e) => {
                log::warn!("Monitoring degraded: {e}");
                self.set_phase(Phase::Degraded(e.to_string()));
                let _ = ready.send(Ok(()));
            }
        }
        drop(ready);

        loop {
            select! {
                recv(control) -> command => match command {
                    Ok(Control::Stop) | Err(_) => break,
                },
                recv(events) -> event => match event {
                    Ok(event) => self.handle(event),
                    Err(_) => break,
                },
            }
        }
        self.session.into_backend()
    }

    fn handle(&mut self, event: CameraEvent) {
        let became_available = matches!(event, CameraEvent::CameraAvailable(_));

        match self.session.handle_event(event) {
            Ok(()) => {
                if self.session.state() == SessionState::Streaming {
                    let mut phase = lock(&self.phase);
                    if *phase != Phase::Streaming {
                        *phase = Phase::Streaming;
                    }
                }
            }
            Err(CaptureError::UnexpectedDisconnect) => self.set_phase(Phase::Reclaimed),
            Err(e) if self.arbiter.is_paused() => {
                log::info!("Capture stopped while camera is claimed elsewhere: {e}");
                self.set_phase(Phase::Reclaimed);
            }
            Err(e) => {
                log::warn!("Monitoring degraded: {e}");
                self.set_phase(Phase::Degraded(e.to_string()));
            }
        }

        if became_available
            && self.reopen_on_available
            && self.session.state() == SessionState::Closed
            && *lock(&self.phase) == Phase::Reclaimed
        {
            log::info!("Camera released by other client; reopening");
            self.set_phase(Phase::Starting);
            if let Err(e) = self.session.open() {
                log::warn!("Reopening camera failed: {e}");
                self.set_phase(Phase::Degraded(e.to_string()));
            }
        }
    }

    fn set_phase(&self, phase: Phase) {
        *lock(&self.phase) = phase;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

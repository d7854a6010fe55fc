mod settings;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use crossbeam_channel::RecvTimeoutError;

use privacy_guard_core::alert::domain::alert_sink::AlertSink;
use privacy_guard_core::capture::domain::camera_backend::CameraBackend;
use privacy_guard_core::capture::infrastructure::ffmpeg_camera::FfmpegCamera;
use privacy_guard_core::capture::infrastructure::simulated_camera::{
    SimulatedCamera, SimulatedCameraControl,
};
use privacy_guard_core::detection::domain::face_detector::FaceDetector;
use privacy_guard_core::detection::infrastructure::model_resolver;
use privacy_guard_core::detection::infrastructure::onnx_face_detector::OnnxFaceDetector;
use privacy_guard_core::detection::infrastructure::scripted_face_detector::ScriptedFaceDetector;
use privacy_guard_core::detection::infrastructure::threaded_face_detector::ThreadedFaceDetector;
use privacy_guard_core::pipeline::monitor_service::{MonitorService, MonitorStatus, StartOutcome};
use privacy_guard_core::pipeline::pipeline_stats::StatsSnapshot;
use privacy_guard_core::shared::constants::{YOLO_MODEL_NAME, YOLO_MODEL_URL};

use settings::Settings;

const SIMULATED_SOURCE: &str = "simulated";
const STATUS_POLL: Duration = Duration::from_millis(250);

/// Watch the front camera and warn when more than one face is in view.
#[derive(Parser)]
#[command(name = "privacy-guard")]
struct Cli {
    /// Frame source: "simulated" or a video file played as the front camera.
    #[arg(long, default_value = SIMULATED_SOURCE)]
    source: String,

    /// Frame rate of the simulated camera.
    #[arg(long, default_value = "30")]
    fps: f64,

    /// Minimum milliseconds between frames sent to the detector.
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Face model file. Resolved from the cache or downloaded when omitted.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Skip the model and report these face counts in turn (comma-separated).
    #[arg(long, value_delimiter = ',')]
    scripted_faces: Option<Vec<u32>>,

    /// Stop after this many seconds instead of waiting for Enter.
    #[arg(long)]
    duration: Option<f64>,

    /// Ring the terminal bell on every alert.
    #[arg(long)]
    bell: bool,

    /// Store the effective interval, confidence and bell choice as defaults.
    #[arg(long)]
    save_settings: bool,
}

/// Prints alerts to stderr, optionally with the terminal bell as the cue.
struct ConsoleAlertSink {
    bell: bool,
    started: Instant,
    count: AtomicU64,
}

impl ConsoleAlertSink {
    fn new(bell: bool) -> Self {
        Self {
            bell,
            started: Instant::now(),
            count: AtomicU64::new(0),
        }
    }
}

impl AlertSink for ConsoleAlertSink {
    fn alert(&self, face_count: u32) {
        let n = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        let bell = if self.bell { "\x07" } else { "" };
        eprintln!(
            "{bell}[{:>7.1}s] Alert #{n}: {face_count} faces looking at the screen",
            self.started.elapsed().as_secs_f64()
        );
        log::warn!("Shoulder surfing suspected: {face_count} faces");
    }
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = effective_settings(&cli, Settings::load())?;
    if cli.save_settings {
        let path = settings.save()?;
        log::info!("Settings saved to {}", path.display());
    }

    let detector = Arc::new(ThreadedFaceDetector::new(build_detector(&cli, &settings)?));
    let (backend, simulated) = build_backend(&cli)?;
    let sink = Arc::new(ConsoleAlertSink::new(settings.bell));
    let mut service =
        MonitorService::new(settings.monitor_config(), backend, detector.clone(), sink);

    if service.start()? == StartOutcome::AlreadyRunning {
        log::warn!("Monitor was already running");
    }
    let _generator = simulated.map(|control| control.start_generator(cli.fps));

    watch(&service, cli.duration.map(Duration::from_secs_f64));

    service.stop()?;
    detector.shutdown();
    print_summary(&service.stats());
    Ok(())
}

fn effective_settings(cli: &Cli, mut settings: Settings) -> Result<Settings, Box<dyn std::error::Error>> {
    if let Some(confidence) = cli.confidence {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(format!("Confidence must be between 0.0 and 1.0, got {confidence}").into());
        }
        settings.confidence = (confidence * 100.0).round() as u32;
    }
    if let Some(interval_ms) = cli.interval_ms {
        settings.interval_ms = interval_ms;
    }
    if cli.bell {
        settings.bell = true;
    }
    if cli.fps.is_nan() || cli.fps <= 0.0 {
        return Err(format!("Frame rate must be positive, got {}", cli.fps).into());
    }
    if let Some(duration) = cli.duration {
        if duration.is_nan() || duration <= 0.0 {
            return Err(format!("Duration must be positive, got {duration}").into());
        }
    }
    Ok(settings)
}

fn build_detector(
    cli: &Cli,
    settings: &Settings,
) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>> {
    if let Some(counts) = &cli.scripted_faces {
        log::info!("Using scripted face counts {counts:?}");
        return Ok(Box::new(ScriptedFaceDetector::new(counts.clone())?));
    }

    let model_path = match &cli.model {
        Some(path) => path.clone(),
        None => {
            log::info!("Resolving model: {YOLO_MODEL_NAME}");
            let path = model_resolver::resolve(
                YOLO_MODEL_NAME,
                YOLO_MODEL_URL,
                None,
                Some(Box::new(download_progress)),
            )?;
            eprintln!();
            path
        }
    };
    Ok(Box::new(OnnxFaceDetector::new(
        &model_path,
        settings.confidence_threshold(),
    )?))
}

fn build_backend(
    cli: &Cli,
) -> Result<(Box<dyn CameraBackend>, Option<SimulatedCameraControl>), Box<dyn std::error::Error>> {
    if cli.source == SIMULATED_SOURCE {
        let camera = SimulatedCamera::phone();
        let control = camera.control();
        return Ok((Box::new(camera), Some(control)));
    }
    let path = PathBuf::from(&cli.source);
    if !path.exists() {
        return Err(format!("Source file not found: {}", path.display()).into());
    }
    Ok((Box::new(FfmpegCamera::new(path)), None))
}

/// Blocks until Enter is pressed or `duration` elapses, reporting status
/// changes as they happen.
fn watch(service: &MonitorService, duration: Option<Duration>) {
    let (enter_tx, enter_rx) = crossbeam_channel::bounded::<()>(1);
    if duration.is_none() {
        eprintln!("Watching; press Enter to stop.");
        std::thread::spawn(move || {
            let mut line = String::new();
            let _ = io::stdin().lock().read_line(&mut line);
            let _ = enter_tx.send(());
        });
    } else {
        drop(enter_tx);
    }

    let deadline = duration.map(|d| Instant::now() + d);
    let mut last_status = MonitorStatus::Stopped;
    loop {
        let status = service.status();
        if status != last_status {
            eprintln!("Status: {}", describe(&status));
            last_status = status;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        match enter_rx.recv_timeout(STATUS_POLL) {
            Ok(()) => break,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                if deadline.is_none() {
                    break;
                }
                std::thread::sleep(STATUS_POLL);
            }
        }
    }
}

fn describe(status: &MonitorStatus) -> String {
    match status {
        MonitorStatus::Stopped => "stopped".into(),
        MonitorStatus::Starting => "opening camera".into(),
        MonitorStatus::Watching => "watching".into(),
        MonitorStatus::Paused => "paused, camera in use by another app".into(),
        MonitorStatus::Degraded(reason) => format!("degraded ({reason})"),
    }
}

fn print_summary(stats: &StatsSnapshot) {
    println!("Frames seen:        {}", stats.frames_seen);
    println!("Dropped (paused):   {}", stats.dropped_paused);
    println!("Dropped (throttle): {}", stats.dropped_throttled);
    println!("Sent to detector:   {}", stats.submitted);
    println!("Detections:         {}", stats.detections);
    println!("Detector failures:  {}", stats.failures);
    println!("Alerts:             {}", stats.alerts);
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = downloaded as f64 / total as f64 * 100.0;
        eprint!(
            "\rDownloading model: {:.1}/{:.1} MB ({pct:.0}%)",
            downloaded as f64 / 1_048_576.0,
            total as f64 / 1_048_576.0,
        );
    } else {
        eprint!(
            "\rDownloading model: {:.1} MB",
            downloaded as f64 / 1_048_576.0
        );
    }
    let _ = io::stderr().flush();
}

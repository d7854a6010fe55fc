use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::capture::domain::camera_backend::{
    CameraBackend, CameraDevice, CameraEvent, CameraInfo, CaptureStream, EventSender, LensFacing,
};
use crate::capture::domain::capture_error::CaptureError;
use crate::capture::domain::frame_reader::FrameReader;
use crate::shared::frame::{Frame, Plane};

/// Identifier under which the video file is presented as a camera.
pub const FILE_CAMERA_ID: &str = "file";

/// Device error code reported when playback fails mid-stream.
pub const ERROR_CAMERA_DEVICE: i32 = 4;

const FALLBACK_FPS: f64 = 30.0;

/// Presents a video file as a front-facing camera.
///
/// Frames are decoded with ffmpeg, scaled to YUV420P at the capture size
/// and published with ffmpeg's own line padding as the row stride. The file
/// loops until the capture stream is closed.
pub struct FfmpegCamera {
    path: PathBuf,
}

impl FfmpegCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CameraBackend for FfmpegCamera {
    fn cameras(&self) -> Result<Vec<CameraInfo>, CaptureError> {
        Ok(vec![CameraInfo::new(FILE_CAMERA_ID, LensFacing::Front)])
    }

    fn open(&mut self, camera_id: &str, events: EventSender) -> Result<(), CaptureError> {
        if camera_id != FILE_CAMERA_ID {
            return Err(CaptureError::Backend(format!("unknown camera {camera_id}")));
        }
        probe(&self.path).map_err(|e| {
            CaptureError::Backend(format!("cannot open {}: {e}", self.path.display()))
        })?;

        let device = FfmpegDevice {
            path: self.path.clone(),
        };
        let _ = events.send(CameraEvent::Opened(Box::new(device)));
        Ok(())
    }

    // A file has no competing clients.
    fn register_availability(&mut self, _events: EventSender) {}

    fn unregister_availability(&mut self) {}
}

fn probe(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    ffmpeg_next::init()?;
    let ictx = ffmpeg_next::format::input(path)?;
    ictx.streams()
        .best(ffmpeg_next::media::Type::Video)
        .ok_or("No video stream found")?;
    Ok(())
}

struct FfmpegDevice {
    path: PathBuf,
}

impl CameraDevice for FfmpegDevice {
    fn id(&self) -> &str {
        FILE_CAMERA_ID
    }

    fn create_session(
        &mut self,
        output: Arc<FrameReader>,
        events: EventSender,
    ) -> Result<(), CaptureError> {
        let stream = FfmpegStream {
            path: self.path.clone(),
            output,
            events: events.clone(),
            stop: Arc::new(AtomicBool::new(false)),
            player: None,
        };
        let _ = events.send(CameraEvent::Configured(Box::new(stream)));
        Ok(())
    }

    fn close(&mut self) {}
}

struct FfmpegStream {
    path: PathBuf,
    output: Arc<FrameReader>,
    events: EventSender,
    stop: Arc<AtomicBool>,
    player: Option<JoinHandle<()>>,
}

impl CaptureStream for FfmpegStream {
    fn set_repeating_request(&mut self) -> Result<(), CaptureError> {
        if self.player.is_some() {
            return Ok(());
        }
        let path = self.path.clone();
        let output = Arc::clone(&self.output);
        let events = self.events.clone();
        let stop = Arc::clone(&self.stop);

        self.player = Some(std::thread::spawn(move || {
            if let Err(e) = play(&path, &output, &stop) {
                log::error!("Playback of {} failed: {e}", path.display());
                let _ = events.send(CameraEvent::Error(ERROR_CAMERA_DEVICE));
            }
        }));
        Ok(())
    }

    fn close(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(player) = self.player.take() {
            if player.join().is_err() {
                log::error!("Playback thread panicked");
            }
        }
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        self.close();
    }
}

/// Plays `path` in a loop into `output` until `stop` is set.
fn play(path: &Path, output: &FrameReader, stop: &AtomicBool) -> Result<(), Box<dyn std::error::Error>> {
    let mut sequence = 0u64;
    while !stop.load(Ordering::Relaxed) {
        let published = play_once(path, output, stop, &mut sequence)?;
        if published == 0 && !stop.load(Ordering::Relaxed) {
            return Err("video contains no decodable frames".into());
        }
    }
    Ok(())
}

struct Playback<'a> {
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    output: &'a FrameReader,
    stop: &'a AtomicBool,
    period: Duration,
    next_due: Instant,
    published: u64,
}

fn play_once(
    path: &Path,
    output: &FrameReader,
    stop: &AtomicBool,
    sequence: &mut u64,
) -> Result<u64, Box<dyn std::error::Error>> {
    let mut ictx = ffmpeg_next::format::input(path)?;
    let (stream_index, fps, parameters) = {
        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;
        let rate = stream.rate();
        let fps = if rate.denominator() != 0 && rate.numerator() > 0 {
            rate.numerator() as f64 / rate.denominator() as f64
        } else {
            FALLBACK_FPS
        };
        (stream.index(), fps, stream.parameters())
    };

    let decoder = ffmpeg_next::codec::context::Context::from_parameters(parameters)?
        .decoder()
        .video()?;
    let scaler = ffmpeg_next::software::scaling::Context::get(
        decoder.format(),
        decoder.width(),
        decoder.height(),
        ffmpeg_next::format::Pixel::YUV420P,
        output.width(),
        output.height(),
        ffmpeg_next::software::scaling::Flags::BILINEAR,
    )?;

    let mut playback = Playback {
        decoder,
        scaler,
        output,
        stop,
        period: Duration::from_secs_f64(1.0 / fps),
        next_due: Instant::now(),
        published: 0,
    };

    for (stream, packet) in ictx.packets() {
        if stop.load(Ordering::Relaxed) {
            return Ok(playback.published);
        }
        if stream.index() != stream_index {
            continue;
        }
        if playback.decoder.send_packet(&packet).is_err() {
            continue;
        }
        playback.drain(sequence)?;
    }
    let _ = playback.decoder.send_eof();
    playback.drain(sequence)?;
    Ok(playback.published)
}

impl Playback<'_> {
    fn drain(&mut self, sequence: &mut u64) -> Result<(), Box<dyn std::error::Error>> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            if self.stop.load(Ordering::Relaxed) {
                return Ok(());
            }
            let mut yuv = ffmpeg_next::util::frame::video::Video::empty();
            self.scaler.run(&decoded, &mut yuv)?;
            let frame = to_frame(&yuv, *sequence)?;
            *sequence += 1;

            // Pace to the file's frame rate, like a sensor would.
            let now = Instant::now();
            if self.next_due > now {
                std::thread::sleep(self.next_due - now);
            }
            self.next_due = self.next_due.max(now) + self.period;

            if !self.output.publish(frame) {
                self.stop.store(true, Ordering::Relaxed);
                return Ok(());
            }
            self.published += 1;
        }
        Ok(())
    }
}

/// Copies the three planes of a YUV420P frame, keeping their line sizes.
fn to_frame(
    yuv: &ffmpeg_next::util::frame::video::Video,
    sequence: u64,
) -> Result<Frame, Box<dyn std::error::Error>> {
    let plane = |index: usize| Plane::new(yuv.data(index).to_vec(), yuv.stride(index), 1);
    let frame = Frame::new(
        yuv.width(),
        yuv.height(),
        plane(0),
        plane(1),
        plane(2),
        sequence,
    )?;
    Ok(frame)
}

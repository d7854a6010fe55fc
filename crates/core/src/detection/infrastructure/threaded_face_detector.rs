use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use crossbeam_channel::{Sender, TrySendError};

use crate::detection::domain::face_detector::{
    AsyncFaceDetector, DetectionCallback, DetectorError, FaceDetector,
};
use crate::shared::converted_image::ConvertedImage;

const DEFAULT_QUEUE_CAPACITY: usize = 1;

struct Job {
    image: ConvertedImage,
    on_complete: DetectionCallback,
}

/// Runs a blocking [`FaceDetector`] on a dedicated thread.
///
/// Submissions go through a bounded queue. When the detector is still busy
/// and the queue is full, the submission completes immediately with
/// [`DetectorError::Busy`] instead of piling up work.
pub struct ThreadedFaceDetector {
    jobs: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<Box<dyn FaceDetector>>>>,
}

impl ThreadedFaceDetector {
    pub fn new(detector: Box<dyn FaceDetector>) -> Self {
        Self::with_capacity(detector, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(detector: Box<dyn FaceDetector>, capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded::<Job>(capacity.max(1));
        let worker = std::thread::spawn(move || {
            let mut detector = detector;
            for job in rx {
                let result = detector
                    .detect(&job.image)
                    .map_err(|e| DetectorError::Failed(e.to_string()));
                (job.on_complete)(result);
            }
            detector
        });
        Self {
            jobs: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Stops accepting work, lets the job in progress finish, and joins the
    /// worker. Jobs still queued complete with their detector results first.
    pub fn shutdown(&self) {
        drop(lock(&self.jobs).take());
        if let Some(handle) = lock(&self.worker).take() {
            if handle.join().is_err() {
                log::error!("Face detector thread panicked");
            }
        }
    }
}

impl AsyncFaceDetector for ThreadedFaceDetector {
    fn submit(&self, image: ConvertedImage, on_complete: DetectionCallback) {
        let sender = lock(&self.jobs).clone();
        let Some(sender) = sender else {
            on_complete(Err(DetectorError::Unavailable));
            return;
        };
        match sender.try_send(Job { image, on_complete }) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) => (job.on_complete)(Err(DetectorError::Busy)),
            Err(TrySendError::Disconnected(job)) => {
                (job.on_complete)(Err(DetectorError::Unavailable))
            }
        }
    }
}

impl Drop for ThreadedFaceDetector {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

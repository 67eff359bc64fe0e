//! Threaded video stream.
//!
//! The capture handle lives on a background thread that keeps grabbing frames
//! so the detection loop always sees the most recent one instead of a backlog.

use anyhow::{bail, Context, Result};
use log::{debug, warn};
use opencv::{prelude::*, videoio};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    thread::{self, JoinHandle},
};

/// Where frames come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Device(i32),
    Url(String),
}

impl Source {
    /// An integer selects a camera device, anything else is passed to the
    /// capture backend as a URL or file path.
    pub fn parse(src: &str) -> Self {
        match src.trim().parse::<i32>() {
            Ok(index) => Source::Device(index),
            Err(_) => Source::Url(src.to_string()),
        }
    }

    fn open(&self) -> Result<videoio::VideoCapture> {
        let cam = match self {
            Source::Device(index) => videoio::VideoCapture::new(*index, videoio::CAP_ANY),
            Source::Url(url) => videoio::VideoCapture::from_file(url, videoio::CAP_ANY),
        }
        .with_context(|| format!("Failed to open video source {:?}", self))?;

        if !cam.is_opened()? {
            bail!("video source {:?} could not be opened", self);
        }
        Ok(cam)
    }
}

#[derive(Default)]
struct Shared {
    latest: Mutex<Option<Mat>>,
    stopped: AtomicBool,
    finished: AtomicBool,
}

pub struct VideoStream {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl VideoStream {
    pub fn start(source: &Source) -> Result<Self> {
        let cam = source.open()?;
        let shared = Arc::new(Shared::default());

        let handle = thread::Builder::new()
            .name("video-stream".into())
            .spawn({
                let shared = shared.clone();
                move || grab_frames(cam, &shared)
            })
            .context("Failed to spawn capture thread")?;

        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Copy of the most recent frame, or `None` until the first one arrives.
    pub fn read(&self) -> Result<Option<Mat>> {
        let latest = self
            .shared
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match &*latest {
            Some(frame) => Ok(Some(frame.try_clone()?)),
            None => Ok(None),
        }
    }

    /// Whether the source ran dry or the capture thread exited.
    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::Acquire)
    }

    /// Stops the capture thread and releases the camera.
    pub fn stop(&mut self) {
        self.shared.stopped.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("capture thread panicked");
            }
        }
    }
}

impl Drop for VideoStream {
    fn drop(&mut self) {
        self.stop();
    }
}

fn grab_frames(mut cam: videoio::VideoCapture, shared: &Shared) {
    while !shared.stopped.load(Ordering::Acquire) {
        let mut frame = Mat::default();
        match cam.read(&mut frame) {
            Ok(true) if !frame.empty() => {
                *shared.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
            }
            Ok(_) => {
                debug!("video source returned no frame");
                break;
            }
            Err(e) => {
                warn!("failed to read frame: {}", e);
                break;
            }
        }
    }

    shared.finished.store(true, Ordering::Release);
    if let Err(e) = cam.release() {
        warn!("failed to release video source: {}", e);
    }
}

use anyhow::{anyhow, Result};
use crossbeam::queue::ArrayQueue;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use opencv::{core::Size, imgproc, prelude::*, videoio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::frame_data::FrameData;
use super::source::{CaptureError, SourceMetadata, SourceStatus, VideoSource};
use crate::utils::logger;

fn pack_dims(width: u32, height: u32) -> u64 {
    ((width as u64) << 32) | height as u64
}

fn unpack_dims(packed: u64) -> (u32, u32) {
    ((packed >> 32) as u32, packed as u32)
}

/// State shared between the session thread and the capture thread
struct CaptureShared {
    running: AtomicBool,
    paused: AtomicBool,
    requested: AtomicU64,
    /// Capacity 1: a newer frame always evicts the unread one.
    latest: ArrayQueue<FrameData>,
}

/// Webcam source backed by OpenCV `videoio`.
///
/// Opening the device and reading frames happens on a dedicated thread; the
/// session only ever sees the newest frame and a status stream.
pub struct CameraSource {
    index: i32,
    shared: Arc<CaptureShared>,
    events: Option<Receiver<SourceStatus>>,
    status: SourceStatus,
    handle: Option<JoinHandle<()>>,
}

impl CameraSource {
    pub fn new(index: i32, width: u32, height: u32) -> Self {
        Self {
            index,
            shared: Arc::new(CaptureShared {
                running: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                requested: AtomicU64::new(pack_dims(width, height)),
                latest: ArrayQueue::new(1),
            }),
            events: None,
            status: SourceStatus::Pending,
            handle: None,
        }
    }
}

impl VideoSource for CameraSource {
    fn start_capture(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        self.shared.running.store(true, Ordering::SeqCst);

        let (sender, receiver) = crossbeam_channel::bounded(4);
        let shared = Arc::clone(&self.shared);
        let index = self.index;

        let handle = std::thread::Builder::new()
            .name("camera-capture".into())
            .spawn(move || capture_loop(index, shared, sender))
            .map_err(|e| anyhow!("failed to spawn capture thread: {}", e))?;

        self.events = Some(receiver);
        self.handle = Some(handle);
        Ok(())
    }

    fn poll_status(&mut self) -> SourceStatus {
        if let Some(events) = &self.events {
            loop {
                match events.try_recv() {
                    Ok(status) => self.status = status,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        if self.status == SourceStatus::Pending {
                            self.status = SourceStatus::Failed(CaptureError::Disconnected);
                        }
                        break;
                    }
                }
            }
        }
        self.status.clone()
    }

    fn latest_frame(&mut self) -> Option<FrameData> {
        self.shared.latest.pop()
    }

    fn pause(&mut self) {
        self.shared.paused.store(true, Ordering::SeqCst);
        // drop whatever was captured before the pause
        let _ = self.shared.latest.pop();
    }

    fn resume(&mut self) {
        self.shared.paused.store(false, Ordering::SeqCst);
    }

    fn set_dimensions(&mut self, width: u32, height: u32) {
        self.shared.requested.store(pack_dims(width, height), Ordering::SeqCst);
    }

    fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.events = None;
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn capture_loop(index: i32, shared: Arc<CaptureShared>, events: Sender<SourceStatus>) {
    logger::debug(&format!("Capture thread started for device {}", index));

    let mut capture = match open_device(index, &shared) {
        Ok((capture, metadata)) => {
            logger::info(&format!(
                "Camera {} ready: {}x{} @ {:.1}fps",
                index, metadata.width, metadata.height, metadata.fps
            ));
            let _ = events.send(SourceStatus::Ready(metadata));
            capture
        }
        Err(err) => {
            logger::error(&format!("Camera {} acquisition failed: {}", index, err));
            let _ = events.send(SourceStatus::Failed(err));
            return;
        }
    };

    let started = Instant::now();
    let mut applied = shared.requested.load(Ordering::SeqCst);
    let mut frames_read = 0u64;
    let mut mat = Mat::default();

    while shared.running.load(Ordering::SeqCst) {
        if shared.paused.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(5));
            continue;
        }

        let requested = shared.requested.load(Ordering::SeqCst);
        if requested != applied {
            let (w, h) = unpack_dims(requested);
            apply_dimensions(&mut capture, w, h);
            applied = requested;
        }

        match read_rgba(&mut capture, &mut mat, started.elapsed()) {
            Ok(Some(frame)) => {
                shared.latest.force_push(frame);
                frames_read += 1;
            }
            Ok(None) => {
                // device had nothing this time around
                std::thread::sleep(Duration::from_millis(2));
            }
            Err(e) => {
                logger::error(&format!("Camera read error: {}", e));
                let _ = events.send(SourceStatus::Failed(CaptureError::Backend(e.to_string())));
                break;
            }
        }
    }

    let _ = capture.release();
    logger::debug(&format!("Capture thread exiting. Frames read: {}", frames_read));
}

fn open_device(
    index: i32,
    shared: &CaptureShared,
) -> std::result::Result<(videoio::VideoCapture, SourceMetadata), CaptureError> {
    // CAP_ANY lets OpenCV choose the platform backend (AVFoundation, MSMF, V4L2)
    let mut capture = videoio::VideoCapture::new(index, videoio::CAP_ANY)
        .map_err(|e| CaptureError::Backend(e.to_string()))?;

    if !capture.is_opened().map_err(|e| CaptureError::Backend(e.to_string()))? {
        return Err(CaptureError::DeviceUnavailable(index));
    }

    let (w, h) = unpack_dims(shared.requested.load(Ordering::SeqCst));
    apply_dimensions(&mut capture, w, h);

    let mut width = capture.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or(0.0) as u32;
    let mut height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0) as u32;
    let fps = capture.get(videoio::CAP_PROP_FPS).unwrap_or(0.0);

    if width == 0 || height == 0 {
        // some backends only learn the size from the first frame
        let mut first_frame = Mat::default();
        if capture.read(&mut first_frame).unwrap_or(false) && !first_frame.empty() {
            width = first_frame.cols() as u32;
            height = first_frame.rows() as u32;
        }
    }
    if width == 0 || height == 0 {
        return Err(CaptureError::NoMetadata(index));
    }

    Ok((capture, SourceMetadata { width, height, fps }))
}

fn apply_dimensions(capture: &mut videoio::VideoCapture, width: u32, height: u32) {
    // Drivers round to the nearest supported mode; the sampler scales anyway.
    let _ = capture.set(videoio::CAP_PROP_FRAME_WIDTH, width as f64);
    let _ = capture.set(videoio::CAP_PROP_FRAME_HEIGHT, height as f64);
}

fn read_rgba(
    capture: &mut videoio::VideoCapture,
    mat: &mut Mat,
    timestamp: Duration,
) -> Result<Option<FrameData>> {
    let start = Instant::now();
    if !capture.read(mat)? || mat.empty() {
        return Ok(None);
    }

    let mut rgba = Mat::default();
    imgproc::cvt_color_def(&*mat, &mut rgba, imgproc::COLOR_BGR2RGBA)?;

    let rgba = if rgba.is_continuous() {
        rgba
    } else {
        let mut packed = Mat::default();
        rgba.copy_to(&mut packed)?;
        packed
    };

    let size: Size = rgba.size()?;
    let frame = FrameData::new(
        rgba.data_bytes()?.to_vec(),
        size.width as u32,
        size.height as u32,
        timestamp,
    );

    let elapsed = start.elapsed();
    if elapsed.as_millis() > 10 {
        logger::debug(&format!(
            "SLOW CAPTURE: {}us for {}x{}",
            elapsed.as_micros(),
            frame.width,
            frame.height
        ));
    }

    Ok(Some(frame))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dims_round_trip_through_atomic() {
        assert_eq!(unpack_dims(pack_dims(160, 120)), (160, 120));
        assert_eq!(unpack_dims(pack_dims(u32::MAX, 1)), (u32::MAX, 1));
    }

    #[test]
    fn test_latest_slot_keeps_newest_frame() {
        let mut source = CameraSource::new(0, 4, 3);
        for i in 0..5u64 {
            source
                .shared
                .latest
                .force_push(FrameData::new(vec![0; 4], 1, 1, Duration::from_millis(i)));
        }
        let frame = source.latest_frame().unwrap();
        assert_eq!(frame.timestamp, Duration::from_millis(4));
        assert!(source.latest_frame().is_none());
        assert_eq!(source.poll_status(), SourceStatus::Pending);
    }
}

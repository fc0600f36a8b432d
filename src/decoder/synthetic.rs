use std::time::Duration;

use super::frame_data::FrameData;
use super::source::{CaptureError, SourceMetadata, SourceStatus, VideoSource};

/// Moving test pattern: a diagonal luminance ramp with a bright disc that
/// orbits the centre. Lets the pipeline run without a camera.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    fps: f64,
    phase: u64,
    started: bool,
    paused: bool,
    /// Polls left before metadata is reported.
    startup_polls: u32,
    failure: Option<CaptureError>,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            fps: 30.0,
            phase: 0,
            started: false,
            paused: false,
            startup_polls: 0,
            failure: None,
        }
    }

    /// Report `Pending` for the first `polls` status checks.
    #[cfg(test)]
    pub fn with_startup_delay(mut self, polls: u32) -> Self {
        self.startup_polls = polls;
        self
    }

    /// Fail acquisition with `error` once started.
    #[cfg(test)]
    pub fn failing(mut self, error: CaptureError) -> Self {
        self.failure = Some(error);
        self
    }

    fn generate(&self) -> FrameData {
        let (w, h) = (self.width as usize, self.height as usize);
        let t = self.phase as f32 / self.fps as f32;
        let (cx, cy) = (
            w as f32 * (0.5 + 0.3 * t.cos()),
            h as f32 * (0.5 + 0.3 * t.sin()),
        );
        let radius = (w.min(h) as f32 * 0.2).max(1.0);

        let mut buffer = Vec::with_capacity(w * h * 4);
        for y in 0..h {
            for x in 0..w {
                let ramp = ((x + y) as f32 / (w + h).max(1) as f32 * 255.0) as u8;
                let (dx, dy) = (x as f32 - cx, y as f32 - cy);
                if dx * dx + dy * dy <= radius * radius {
                    buffer.extend_from_slice(&[255, 255, 255, 255]);
                } else {
                    buffer.extend_from_slice(&[ramp / 4, ramp, ramp / 3, 255]);
                }
            }
        }

        let timestamp = Duration::from_secs_f64(self.phase as f64 / self.fps);
        FrameData::new(buffer, self.width, self.height, timestamp)
    }
}

impl VideoSource for SyntheticSource {
    fn start_capture(&mut self) -> anyhow::Result<()> {
        self.started = true;
        Ok(())
    }

    fn poll_status(&mut self) -> SourceStatus {
        if !self.started {
            return SourceStatus::Pending;
        }
        if let Some(err) = &self.failure {
            return SourceStatus::Failed(err.clone());
        }
        if self.startup_polls > 0 {
            self.startup_polls -= 1;
            return SourceStatus::Pending;
        }
        SourceStatus::Ready(SourceMetadata {
            width: self.width,
            height: self.height,
            fps: self.fps,
        })
    }

    fn latest_frame(&mut self) -> Option<FrameData> {
        if !self.started || self.paused || self.failure.is_some() {
            return None;
        }
        let frame = self.generate();
        self.phase += 1;
        Some(frame)
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    fn resume(&mut self) {
        self.paused = false;
    }

    fn set_dimensions(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
    }

    fn stop(&mut self) {
        self.started = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_until_startup_delay_elapses() {
        let mut source = SyntheticSource::new(8, 6).with_startup_delay(2);
        assert_eq!(source.poll_status(), SourceStatus::Pending);
        source.start_capture().unwrap();
        assert_eq!(source.poll_status(), SourceStatus::Pending);
        assert_eq!(source.poll_status(), SourceStatus::Pending);
        assert!(matches!(source.poll_status(), SourceStatus::Ready(m) if m.width == 8 && m.height == 6));
    }

    #[test]
    fn test_paused_source_yields_nothing() {
        let mut source = SyntheticSource::new(4, 3);
        source.start_capture().unwrap();
        assert!(source.latest_frame().is_some());
        source.pause();
        assert!(source.latest_frame().is_none());
        source.resume();
        let frame = source.latest_frame().unwrap();
        assert!(frame.is_complete());
    }

    #[test]
    fn test_dimensions_follow_requests() {
        let mut source = SyntheticSource::new(4, 3);
        source.start_capture().unwrap();
        source.set_dimensions(10, 7);
        let frame = source.latest_frame().unwrap();
        assert_eq!((frame.width, frame.height), (10, 7));
        assert_eq!(frame.buffer.len(), 10 * 7 * 4);
    }

    #[test]
    fn test_failure_reported() {
        let mut source = SyntheticSource::new(4, 3).failing(CaptureError::DeviceUnavailable(2));
        source.start_capture().unwrap();
        assert_eq!(source.poll_status(), SourceStatus::Failed(CaptureError::DeviceUnavailable(2)));
        assert!(source.latest_frame().is_none());
    }
}

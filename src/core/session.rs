use anyhow::Result;
use rand::RngCore;
use std::fmt;
use std::time::Instant;

use super::config::AppConfig;
use crate::decoder::{CaptureError, FrameSampler, PixelSurface, SourceStatus, VideoSource};
use crate::renderer::flicker::FlickerAxis;
use crate::renderer::processor::FrameProcessor;
use crate::renderer::OutputSink;
use crate::shared::constants;
use crate::utils::logger;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Height from the fixed 4:3 aspect ratio, never below one row.
    pub fn from_width(width: u32) -> Self {
        let (aw, ah) = constants::ASPECT_RATIO;
        let height = (width as u64 * ah as u64 / aw as u64) as u32;
        Self::new(width, height.max(1))
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Glyph point size hint for a sampling width; shrinks as the width grows.
pub fn glyph_point_size(width: u32) -> u32 {
    constants::MAX_GLYPH_POINT_SIZE
        .saturating_sub(width / constants::GLYPH_SIZE_WIDTH_DIVISOR)
        .max(constants::MIN_GLYPH_POINT_SIZE)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Running,
    Paused,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Idle,
    /// Waiting for the source to confirm its metadata.
    Acquiring,
    Active,
    Failed,
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing was scheduled, the session is paused, or not active.
    Idle,
    /// The source has not delivered its first frame; the next tick is
    /// still scheduled.
    NoFrame,
    Rendered,
}

/// Snapshot of the session for the status bar
#[derive(Clone, Debug, PartialEq)]
pub struct StatusLine {
    pub state: PlaybackState,
    pub resolution: Resolution,
    pub glyph_size: u32,
    pub frame_counter: u64,
    pub colorized: bool,
    pub flicker: Option<FlickerAxis>,
    pub input: String,
    pub notice: Option<String>,
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            PlaybackState::Running => "RUNNING",
            PlaybackState::Paused => "PAUSED",
        };
        let flicker = match self.flicker {
            Some(FlickerAxis::Row) => "rain:row",
            Some(FlickerAxis::Column) => "rain:column",
            None => "rain:off",
        };
        write!(
            f,
            "{} | {} | glyph {}pt | frame {} | {} | {} | width> {}_",
            state,
            self.resolution,
            self.glyph_size,
            self.frame_counter,
            if self.colorized { "color" } else { "mono" },
            flicker,
            self.input
        )?;
        if let Some(notice) = &self.notice {
            write!(f, " | {}", notice)?;
        }
        Ok(())
    }
}

/// Owns everything one viewing session mutates: resolution, pause state, the
/// flicker clock and the pending-tick flag.
///
/// All methods run on the caller's thread. A tick is only ever scheduled from
/// the end of the previous tick or from an explicit control action, so at most
/// one sample/render cycle is in flight.
pub struct Session<R: RngCore> {
    resolution: Resolution,
    state: PlaybackState,
    lifecycle: Lifecycle,
    frame_counter: u64,
    tick_scheduled: bool,
    glyph_size: u32,
    processor: FrameProcessor,
    sampler: FrameSampler,
    surface: Box<dyn PixelSurface>,
    rng: R,
    input: String,
    notice: Option<String>,
}

impl<R: RngCore> Session<R> {
    pub fn new(config: &AppConfig, mut surface: Box<dyn PixelSurface>, rng: R) -> Result<Self> {
        config.validate()?;
        let resolution = config.resolution();
        surface.resize(resolution.width, resolution.height);

        Ok(Self {
            resolution,
            state: PlaybackState::Running,
            lifecycle: Lifecycle::Idle,
            frame_counter: 0,
            tick_scheduled: false,
            glyph_size: glyph_point_size(resolution.width),
            processor: FrameProcessor::new(config.glyph_mapper()?, config.render_options()),
            sampler: FrameSampler::new(),
            surface,
            rng,
            input: String::new(),
            notice: None,
        })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    #[cfg(test)]
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    #[cfg(test)]
    pub fn glyph_size(&self) -> u32 {
        self.glyph_size
    }

    #[cfg(test)]
    pub fn is_tick_scheduled(&self) -> bool {
        self.tick_scheduled
    }

    pub fn set_notice(&mut self, notice: Option<String>) {
        self.notice = notice;
    }

    /// Pending width entry shown in the status bar.
    pub fn set_input(&mut self, input: &str) {
        self.input.clear();
        self.input.push_str(input);
    }

    pub fn toggle_color(&mut self) {
        let options = self.processor.options_mut();
        options.colorized = !options.colorized;
    }

    pub fn toggle_axis(&mut self) {
        let flicker = &mut self.processor.options_mut().flicker;
        flicker.axis = match flicker.axis {
            FlickerAxis::Row => FlickerAxis::Column,
            FlickerAxis::Column => FlickerAxis::Row,
        };
    }

    pub fn toggle_flicker(&mut self) {
        let flicker = &mut self.processor.options_mut().flicker;
        flicker.enabled = !flicker.enabled;
    }

    pub fn status_line(&self) -> StatusLine {
        let options = self.processor.options();
        StatusLine {
            state: self.state,
            resolution: self.resolution,
            glyph_size: self.glyph_size,
            frame_counter: self.frame_counter,
            colorized: options.colorized,
            flicker: options.flicker.enabled.then_some(options.flicker.axis),
            input: self.input.clone(),
            notice: self.notice.clone(),
        }
    }

    /// Requests acquisition. Ticks stay off until the source reports ready.
    pub fn start(&mut self, source: &mut dyn VideoSource) -> Result<()> {
        source.set_dimensions(self.resolution.width, self.resolution.height);
        source.start_capture()?;
        self.lifecycle = Lifecycle::Acquiring;
        logger::info(&format!("Session acquiring source at {}", self.resolution));
        Ok(())
    }

    /// Folds the source status into the lifecycle. Returns the capture error
    /// the first time the source fails.
    pub fn poll_source(
        &mut self,
        source: &mut dyn VideoSource,
        sink: &mut dyn OutputSink,
    ) -> Result<Option<CaptureError>> {
        if !matches!(self.lifecycle, Lifecycle::Acquiring | Lifecycle::Active) {
            return Ok(None);
        }

        match source.poll_status() {
            SourceStatus::Pending => {}
            SourceStatus::Ready(metadata) => {
                if self.lifecycle == Lifecycle::Acquiring {
                    logger::info(&format!(
                        "Source ready ({}x{} native), sampling at {}",
                        metadata.width, metadata.height, self.resolution
                    ));
                    self.lifecycle = Lifecycle::Active;
                    self.tick_scheduled = self.state == PlaybackState::Running;
                }
            }
            SourceStatus::Failed(err) => {
                logger::error(&format!("Source failed: {}", err));
                self.lifecycle = Lifecycle::Failed;
                self.tick_scheduled = false;
                source.stop();
                sink.show_fatal(constants::FATAL_CAPTURE_MESSAGE)?;
                return Ok(Some(err));
            }
        }
        Ok(None)
    }

    pub fn pause(&mut self, source: &mut dyn VideoSource) {
        if self.state == PlaybackState::Paused {
            return;
        }
        self.state = PlaybackState::Paused;
        source.pause();
        logger::debug(&format!("Paused at frame {}", self.frame_counter));
    }

    pub fn resume(&mut self, source: &mut dyn VideoSource) {
        if self.state == PlaybackState::Running {
            return;
        }
        self.state = PlaybackState::Running;
        source.resume();
        // run straight away instead of waiting a refresh
        self.tick_scheduled = self.lifecycle == Lifecycle::Active;
        logger::debug(&format!("Resumed at frame {}", self.frame_counter));
    }

    pub fn toggle_pause(&mut self, source: &mut dyn VideoSource) {
        match self.state {
            PlaybackState::Running => self.pause(source),
            PlaybackState::Paused => self.resume(source),
        }
    }

    /// Resizes sampling to `width` (4:3 height) and forces a tick, resuming
    /// if paused. `width` is assumed validated by the control surface.
    pub fn change_resolution(&mut self, width: u32, source: &mut dyn VideoSource) {
        let resolution = Resolution::from_width(width);
        self.resolution = resolution;
        self.surface.resize(resolution.width, resolution.height);
        source.set_dimensions(resolution.width, resolution.height);
        self.glyph_size = glyph_point_size(resolution.width);

        if self.state == PlaybackState::Paused {
            self.state = PlaybackState::Running;
            source.resume();
        }
        self.tick_scheduled = self.lifecycle == Lifecycle::Active;
        logger::info(&format!(
            "Resolution changed to {} (glyph {}pt)",
            resolution, self.glyph_size
        ));
    }

    /// Runs the scheduled tick, if any.
    ///
    /// Running: sample, render, present, advance the clock, reschedule.
    /// Paused: drop the pending tick without rescheduling.
    pub fn tick(&mut self, source: &mut dyn VideoSource, sink: &mut dyn OutputSink) -> Result<TickOutcome> {
        if self.lifecycle != Lifecycle::Active || !self.tick_scheduled {
            return Ok(TickOutcome::Idle);
        }
        self.tick_scheduled = false;

        if self.state == PlaybackState::Paused {
            return Ok(TickOutcome::Idle);
        }

        let start = Instant::now();
        let buffer = match self.sampler.sample(source, self.surface.as_mut()) {
            Ok(Some(buffer)) => buffer,
            Ok(None) => {
                self.tick_scheduled = true;
                return Ok(TickOutcome::NoFrame);
            }
            Err(e) => {
                logger::warn(&format!("Sampling skipped: {}", e));
                self.tick_scheduled = true;
                return Ok(TickOutcome::NoFrame);
            }
        };
        let sample_time = start.elapsed();

        let frame = self.processor.render(&buffer, self.frame_counter, &mut self.rng);
        let render_time = start.elapsed() - sample_time;

        sink.present(&frame)?;
        self.frame_counter += 1;
        sink.show_status(&self.status_line())?;
        self.tick_scheduled = true;

        let total = start.elapsed();
        if total.as_millis() > 10 {
            logger::debug(&format!(
                "SLOW TICK: Total={}us | Sample={}us | Render={}us | {}",
                total.as_micros(),
                sample_time.as_micros(),
                render_time.as_micros(),
                self.resolution
            ));
        }

        Ok(TickOutcome::Rendered)
    }

    pub fn shutdown(&mut self, source: &mut dyn VideoSource) {
        source.stop();
        self.tick_scheduled = false;
        if self.lifecycle != Lifecycle::Failed {
            self.lifecycle = Lifecycle::Closed;
        }
        logger::info(&format!("Session closed after {} frames", self.frame_counter));
    }
}

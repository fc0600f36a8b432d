use std::time::{Duration, Instant};

/// Paces the session tick loop at a fixed refresh rate.
///
/// Sleeps only for whatever is left of the current period after the tick's
/// own work, and resyncs instead of bursting when it falls far behind.
pub struct FrameTicker {
    target_fps: f64,
    frame_duration: Duration,
    next_frame_time: Instant,
    started: Instant,
    ticks: u64,
    resyncs: u64,
}

impl FrameTicker {
    pub fn new(fps: f64) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { 60.0 };
        let frame_duration = Duration::from_secs_f64(1.0 / fps);
        let now = Instant::now();
        Self {
            target_fps: fps,
            frame_duration,
            next_frame_time: now + frame_duration,
            started: now,
            ticks: 0,
            resyncs: 0,
        }
    }

    #[cfg(test)]
    pub fn frame_duration(&self) -> Duration {
        self.frame_duration
    }

    /// Time left until the next tick is due.
    #[cfg(test)]
    pub fn remaining(&self) -> Duration {
        self.next_frame_time.saturating_duration_since(Instant::now())
    }

    /// Blocks until the next tick is due.
    pub fn wait_for_next_frame(&mut self) {
        let now = Instant::now();

        // More than a few periods behind: restart the schedule from now
        if now > self.next_frame_time + self.frame_duration * 3 {
            self.next_frame_time = now + self.frame_duration;
            self.ticks += 1;
            self.resyncs += 1;
            return;
        }

        if now < self.next_frame_time {
            std::thread::sleep(self.next_frame_time - now);
        }

        self.next_frame_time += self.frame_duration;
        self.ticks += 1;
    }

    pub fn stats(&self) -> TickerStats {
        TickerStats {
            ticks: self.ticks,
            resyncs: self.resyncs,
            target_fps: self.target_fps,
            elapsed: self.started.elapsed(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TickerStats {
    pub ticks: u64,
    pub resyncs: u64,
    pub target_fps: f64,
    pub elapsed: Duration,
}

impl TickerStats {
    pub fn effective_fps(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.ticks as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

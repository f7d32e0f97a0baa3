//! Media time kept by the simulated clock component

use std::time::Instant;

/// Media time anchored to a wall-clock instant
///
/// While running, media time advances from `anchor_us` at `scale` times
/// wall-clock speed. Every change of scale re-anchors, so earlier
/// progress is kept.
#[derive(Debug, Clone)]
pub struct SimClock {
    running: bool,
    base: Instant,
    anchor_us: i64,
    scale: f32,
}

impl SimClock {
    pub fn new() -> Self {
        SimClock {
            running: false,
            base: Instant::now(),
            anchor_us: 0,
            scale: 1.0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn media_time_us(&self) -> i64 {
        if !self.running {
            return self.anchor_us;
        }
        let elapsed = self.base.elapsed().as_micros() as f64;
        self.anchor_us
            .saturating_add((elapsed * f64::from(self.scale)) as i64)
    }

    pub fn start(&mut self, start_us: i64) {
        self.anchor_us = start_us;
        self.base = Instant::now();
        self.running = true;
    }

    /// Freezes media time where it is
    pub fn stop(&mut self) {
        self.anchor_us = self.media_time_us();
        self.running = false;
    }

    pub fn set_scale(&mut self, scale: f32) {
        self.anchor_us = self.media_time_us();
        self.base = Instant::now();
        self.scale = scale.max(0.0);
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

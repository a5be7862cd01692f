//! Time management and fixed timestep support.
//!
//! This module provides:
//! - [`Time`] - Frame timing and delta time tracking for driver loops
//! - [`FixedTime`] - Fixed timestep accumulator used by rate-limited processors
//!
//! # Examples
//!
//! ```
//! use partition_ecs::time::{Time, FixedTime};
//!
//! let mut time = Time::new();
//! let mut fixed = FixedTime::new(60); // 60 Hz
//!
//! // In your game loop:
//! time.update();
//! for _ in 0..fixed.tick(time.delta()) {
//!     // Run logic at fixed 60 Hz
//! }
//! ```

use std::time::{Duration, Instant};

/// Frame timing for whatever loop drives `World::process`
#[derive(Clone, Debug)]
pub struct Time {
    /// Time since last frame
    delta: Duration,
    /// Total elapsed time since start
    elapsed: Duration,
    /// Frame counter
    frame_count: u64,
    /// Time scale multiplier (1.0 = normal speed)
    time_scale: f32,
    /// Time of last frame
    last_update: Instant,
}

impl Time {
    pub fn new() -> Self {
        Self {
            delta: Duration::ZERO,
            elapsed: Duration::ZERO,
            frame_count: 0,
            time_scale: 1.0,
            last_update: Instant::now(),
        }
    }

    /// Measure wall-clock time since the previous call (call once per frame)
    pub fn update(&mut self) {
        let now = Instant::now();
        let measured = now.duration_since(self.last_update);
        self.last_update = now;
        self.advance(measured);
    }

    /// Advance by an externally supplied delta, e.g. from a simulated clock
    pub fn advance(&mut self, delta: Duration) {
        self.delta = delta.mul_f32(self.time_scale);
        self.elapsed += self.delta;
        self.frame_count += 1;
    }

    /// Scaled time since last frame
    pub fn delta(&self) -> Duration {
        self.delta
    }

    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Total scaled time
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Set time scale (1.0 = normal, 0.5 = half speed, 2.0 = double speed)
    pub fn set_time_scale(&mut self, scale: f32) {
        self.time_scale = scale.max(0.0);
    }

    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// Pause time (set scale to 0)
    pub fn pause(&mut self) {
        self.time_scale = 0.0;
    }

    /// Resume time (set scale to 1)
    pub fn resume(&mut self) {
        self.time_scale = 1.0;
    }

    pub fn is_paused(&self) -> bool {
        self.time_scale == 0.0
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed timestep accumulator
#[derive(Clone, Debug)]
pub struct FixedTime {
    /// Fixed timestep duration
    timestep: Duration,
    /// Accumulated time not yet consumed by a step
    accumulator: Duration,
}

impl FixedTime {
    /// Create with given frequency (Hz). A zero frequency is clamped to 1 Hz.
    pub fn new(hz: u32) -> Self {
        Self::from_duration(Duration::from_secs_f64(1.0 / f64::from(hz.max(1))))
    }

    /// Create with explicit timestep duration
    pub fn from_duration(timestep: Duration) -> Self {
        Self {
            timestep,
            accumulator: Duration::ZERO,
        }
    }

    /// Add `delta` to the accumulator and return how many whole steps are due.
    ///
    /// A long frame yields several steps (catch-up); a short one may yield none.
    /// A count past `u32::MAX` saturates and the excess steps are dropped.
    pub fn tick(&mut self, delta: Duration) -> u32 {
        self.accumulator = self.accumulator.saturating_add(delta);
        let step = self.timestep.as_nanos();
        if step == 0 {
            self.accumulator = Duration::ZERO;
            return 1;
        }

        let pending = self.accumulator.as_nanos();
        // The remainder is below the timestep, which came from a Duration
        self.accumulator = Duration::from_nanos((pending % step) as u64);
        u32::try_from(pending / step).unwrap_or(u32::MAX)
    }

    pub fn timestep(&self) -> Duration {
        self.timestep
    }

    /// Time carried over to the next tick
    pub fn overstep(&self) -> Duration {
        self.accumulator
    }

    /// Overstep as a fraction of the timestep (0.0 to 1.0), for interpolation
    pub fn overstep_fraction(&self) -> f32 {
        if self.timestep.is_zero() {
            return 0.0;
        }
        self.accumulator.as_secs_f32() / self.timestep.as_secs_f32()
    }
}

impl Default for FixedTime {
    fn default() -> Self {
        Self::new(60) // 60 Hz default
    }
}

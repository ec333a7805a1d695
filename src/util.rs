//! Shared utilities

use log::{debug, info};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Linear interpolation between two colors
#[inline]
pub fn lerp_color(c1: (u8, u8, u8), c2: (u8, u8, u8), t: f32) -> (u8, u8, u8) {
    let t = t.clamp(0.0, 1.0);
    (
        (c1.0 as f32 + (c2.0 as f32 - c1.0 as f32) * t) as u8,
        (c1.1 as f32 + (c2.1 as f32 - c1.1 as f32) * t) as u8,
        (c1.2 as f32 + (c2.2 as f32 - c1.2 as f32) * t) as u8,
    )
}

// ============================================================================
// Rolling average
// ============================================================================

/// Mean of the most recent `capacity` samples
#[derive(Debug, Clone)]
pub struct RollingAverage {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl RollingAverage {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Add a sample, dropping the oldest once the window is full
    pub fn push(&mut self, value: f32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Zero when empty
    pub fn average(&self) -> f32 {
        self.samples.iter().sum::<f32>() / self.samples.len().max(1) as f32
    }

    pub fn min(&self) -> Option<f32> {
        self.samples.iter().copied().reduce(f32::min)
    }

    pub fn max(&self) -> Option<f32> {
        self.samples.iter().copied().reduce(f32::max)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

// ============================================================================
// FPS Counter
// ============================================================================

/// FPS counter with rolling averages of frame time and solve time
pub struct FpsCounter {
    frame_times: RollingAverage,
    solve_times: RollingAverage,
    last_frame: Instant,
    last_report: Instant,
}

impl FpsCounter {
    /// Create a new FPS counter with specified sample window
    pub fn new(sample_count: usize) -> Self {
        let now = Instant::now();
        Self {
            frame_times: RollingAverage::new(sample_count),
            solve_times: RollingAverage::new(sample_count),
            last_frame: now,
            last_report: now,
        }
    }

    /// Call at the start of each frame to record timing
    /// Returns (delta_time, current_fps, average_fps)
    pub fn tick(&mut self) -> (f32, f32, f32) {
        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.record(dt)
    }

    fn record(&mut self, dt: f32) -> (f32, f32, f32) {
        self.frame_times.push(dt);

        let current_fps = if dt > 0.0 { 1.0 / dt } else { 0.0 };
        let avg_dt = self.frame_times.average();
        let avg_fps = if avg_dt > 0.0 { 1.0 / avg_dt } else { 0.0 };

        (dt, current_fps, avg_fps)
    }

    /// Record how long the solver took this frame
    pub fn record_solve(&mut self, elapsed: Duration) {
        self.solve_times.push(elapsed.as_secs_f32() * 1000.0);
    }

    /// Forget solve times, e.g. after switching solvers
    pub fn reset_solve(&mut self) {
        self.solve_times.clear();
    }

    /// Get the average frame time in milliseconds
    pub fn avg_frame_time_ms(&self) -> f32 {
        self.frame_times.average() * 1000.0
    }

    /// Average solver time in milliseconds
    pub fn avg_solve_time_ms(&self) -> f32 {
        self.solve_times.average()
    }

    /// Get min/max FPS from sample window
    pub fn min_max_fps(&self) -> (f32, f32) {
        let fps = |dt: Option<f32>| match dt {
            Some(dt) if dt > 0.0 => 1.0 / dt,
            _ => 0.0,
        };
        (fps(self.frame_times.max()), fps(self.frame_times.min()))
    }

    /// Log rolling statistics at most once per second. `verbose` raises the
    /// record from debug to info; `solver` names the executor being timed.
    pub fn report(&mut self, verbose: bool, solver: &str) {
        if self.last_report.elapsed() < Duration::from_secs(1) || self.frame_times.is_empty() {
            return;
        }
        self.last_report = Instant::now();

        let avg_ms = self.avg_frame_time_ms();
        let fps = if avg_ms > 0.0 { 1000.0 / avg_ms } else { 0.0 };
        let (min_fps, max_fps) = self.min_max_fps();
        let solve_ms = self.avg_solve_time_ms();
        if verbose {
            info!(
                "{:.1} fps ({:.2} ms, min {:.1}, max {:.1}), {} solve {:.2} ms",
                fps, avg_ms, min_fps, max_fps, solver, solve_ms
            );
        } else {
            debug!(
                "{:.1} fps ({:.2} ms, min {:.1}, max {:.1}), {} solve {:.2} ms",
                fps, avg_ms, min_fps, max_fps, solver, solve_ms
            );
        }
    }
}

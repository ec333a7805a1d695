//! Per-frame animation inputs: the global pulse and the smoothed pointer.

use crate::math::Vec2;
use crate::sim::FrameUniforms;
use std::f64::consts::TAU;

/// Phase offset of the pulse in milliseconds
const PULSE_OFFSET_MS: i64 = 800;

/// Fraction of the remaining distance the follower covers each frame
const FOLLOW_RATE: f32 = 1.0 / 18.0;

/// One sine cycle per second of wall-clock time, in [-1, 1]
pub fn pulse_at(epoch_millis: i64) -> f32 {
    let ms = (epoch_millis + PULSE_OFFSET_MS).rem_euclid(1000);
    (TAU * ms as f64 * 0.001).sin() as f32
}

/// Map a window pixel position to [-1, 1] coordinates with y pointing up
pub fn normalized_pointer(x: i32, y: i32, width: u32, height: u32) -> Vec2 {
    let w = width.max(1) as f32;
    let h = height.max(1) as f32;
    Vec2::new(
        (x as f32 / w) * 2.0 - 1.0,
        (1.0 - y as f32 / h) * 2.0 - 1.0,
    )
}

/// Smoothed pointer: a follower that closes a fixed fraction of the gap to
/// the raw pointer every frame, and the per-frame displacement it made.
#[derive(Debug, Clone, Default)]
pub struct PointerFollower {
    target: Vec2,
    follower: Option<Vec2>,
    velocity: Vec2,
}

impl PointerFollower {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pointer pressed: the follower jumps to the pointer
    pub fn press(&mut self, pos: Vec2) {
        self.target = pos;
        self.follower = Some(pos);
    }

    /// Pointer moved: the first sample also initialises the follower
    pub fn move_to(&mut self, pos: Vec2) {
        self.target = pos;
        if self.follower.is_none() {
            self.follower = Some(pos);
        }
    }

    /// Advance by one frame. Does nothing until the pointer has been seen.
    pub fn update(&mut self) {
        let Some(follower) = self.follower else {
            return;
        };
        let next = follower + (self.target - follower) * FOLLOW_RATE;
        self.velocity = next - follower;
        self.follower = Some(next);
    }

    /// Smoothed position, or the origin before any pointer input
    pub fn position(&self) -> Vec2 {
        self.follower.unwrap_or_default()
    }

    pub fn velocity(&self) -> Vec2 {
        self.velocity
    }

    /// Uniform block for this frame
    pub fn uniforms(&self, pulse: f32) -> FrameUniforms {
        FrameUniforms::new(pulse, self.position(), self.velocity())
    }
}

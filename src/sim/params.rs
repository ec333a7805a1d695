//! Reaction coefficients and the per-frame uniform block.

use crate::math::Vec2;
use serde::{Deserialize, Serialize};

/// Coefficients of the reaction integrator and the cache loader's
/// displacements. Loaded from the `reaction` section of the settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactionParams {
    pub feed: f32,
    pub base_kill: f32,
    /// Extra kill rate under the seed mask
    pub kill_boost: f32,
    pub kill_pulse_bias: f32,
    pub kill_pulse_gain: f32,

    pub diffusion_a: f32,
    pub diffusion_a_falloff: f32,
    pub diffusion_b: f32,
    pub diffusion_b_falloff: f32,
    pub diffusion_b_pulse: f32,
    /// Lower bound for the B diffusion rate; keeps the explicit step stable
    pub diffusion_b_floor: f32,

    pub pointer_damping_gain: f32,
    pub pointer_damping_max: f32,
    pub pointer_speed_scale: f32,
    /// Smoothstep edges applied to `1 - min(1, distance to pointer)`
    pub pointer_falloff_inner: f32,
    pub pointer_falloff_outer: f32,

    /// Radial sample displacement driven by the pulse
    pub pulse_push: f32,
    /// Sample displacement along the pointer velocity
    pub pointer_advection: f32,

    /// Scale on the `A * B * B` term; zero turns the model into pure diffusion
    pub reaction_rate: f32,
    /// Width/height ratio from which the distance term switches to the vertical axis
    pub wide_aspect: f32,
}

impl Default for ReactionParams {
    fn default() -> Self {
        Self {
            feed: 0.065,
            base_kill: 0.06,
            kill_boost: 0.05,
            kill_pulse_bias: 0.7,
            kill_pulse_gain: 0.3,
            diffusion_a: 1.0,
            diffusion_a_falloff: 0.15,
            diffusion_b: 0.25,
            diffusion_b_falloff: 0.10,
            diffusion_b_pulse: 0.1,
            diffusion_b_floor: 0.1,
            pointer_damping_gain: 0.2,
            pointer_damping_max: 0.15,
            pointer_speed_scale: 30.0,
            pointer_falloff_inner: 0.6,
            pointer_falloff_outer: 1.0,
            pulse_push: 0.01,
            pointer_advection: 2.5,
            reaction_rate: 1.0,
            wide_aspect: 1.4,
        }
    }
}

impl ReactionParams {
    /// Constant coefficients with no displacement: `dA = diffusion_a`,
    /// `dB = diffusion_b`, kill unaffected by the mask.
    pub fn uniform(diffusion_a: f32, diffusion_b: f32, feed: f32, kill: f32) -> Self {
        Self {
            feed,
            base_kill: kill,
            kill_boost: 0.0,
            diffusion_a,
            diffusion_a_falloff: 0.0,
            diffusion_b,
            diffusion_b_falloff: 0.0,
            diffusion_b_pulse: 0.0,
            diffusion_b_floor: 0.0,
            pointer_damping_gain: 0.0,
            pulse_push: 0.0,
            pointer_advection: 0.0,
            ..Self::default()
        }
    }
}

/// Values shared read-only by every cell of one frame's dispatches
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameUniforms {
    /// Smooth periodic value in [-1, 1]
    pub pulse: f32,
    /// Smoothed pointer position in normalized [-1, 1] coordinates, y up
    pub pointer_pos: Vec2,
    /// Per-frame displacement of the smoothed pointer
    pub pointer_velocity: Vec2,
}

impl FrameUniforms {
    pub fn new(pulse: f32, pointer_pos: Vec2, pointer_velocity: Vec2) -> Self {
        Self {
            pulse,
            pointer_pos,
            pointer_velocity,
        }
    }
}

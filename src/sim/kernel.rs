//! The reaction-diffusion stencil kernel.
//!
//! Load phase: each cache slot samples the source buffer at its edge-clamped
//! coordinate, displaced radially by the pulse and along the pointer
//! velocity near the pointer, with bilinear resampling. The seed mask is read
//! at the undisplaced coordinate.
//!
//! Compute phase: a 3x3 Laplacian over the cache feeds one explicit Euler
//! step of the Gray-Scott model with per-cell coefficients.
//!
//! The direct path skips the cache and the displacement, reading the
//! undisplaced neighbours straight from the source buffer.

use super::field::{clamp_coord, Cell, FieldBuffer, SeedMask};
use super::params::{FrameUniforms, ReactionParams};
use super::workgroup::{GroupKernel, SharedTile, HALO, KERNEL_SIZE};
use crate::math::{smoothstep, Vec2};

/// Discrete Laplacian weights, row-major. Sums to zero.
pub const LAPLACIAN: [[f32; KERNEL_SIZE]; KERNEL_SIZE] = [
    [0.05, 0.20, 0.05],
    [0.20, -1.0, 0.20],
    [0.05, 0.20, 0.05],
];

// Radial push is `push * (PULSE_PUSH_GAIN * pulse + PULSE_PUSH_BIAS)`
const PULSE_PUSH_GAIN: f32 = 2.0;
const PULSE_PUSH_BIAS: f32 = 3.5;

/// One slot of the shared tile: interpolated (A, B) plus the seed mask value
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CacheEntry {
    pub a: f32,
    pub b: f32,
    pub seed: f32,
}

/// Per-cell coefficients of one integration step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    pub diffusion_a: f32,
    pub diffusion_b: f32,
    pub feed: f32,
    pub kill: f32,
}

/// Laplacian of both channels around `center`, with `neighbor(dx, dy)`
/// returning the cell at that offset.
///
/// Evaluated as `sum(w * (neighbour - center))`, which equals the weighted
/// sum because the center weight is minus the sum of the others, and is
/// exactly zero on uniform input.
#[inline]
pub fn weighted_difference(center: Cell, neighbor: impl Fn(isize, isize) -> Cell) -> (f32, f32) {
    let mut lap_a = 0.0;
    let mut lap_b = 0.0;
    for (ky, row) in LAPLACIAN.iter().enumerate() {
        for (kx, &weight) in row.iter().enumerate() {
            if kx == HALO && ky == HALO {
                continue;
            }
            let n = neighbor(kx as isize - HALO as isize, ky as isize - HALO as isize);
            lap_a += weight * (n.a - center.a);
            lap_b += weight * (n.b - center.b);
        }
    }
    (lap_a, lap_b)
}

/// Laplacian of both channels at `slot` of the cache
pub fn laplacian(tile: &SharedTile<CacheEntry>, slot: [usize; 2]) -> (f32, f32) {
    let cell = |e: CacheEntry| Cell::new(e.a, e.b);
    weighted_difference(cell(tile.get(slot)), |dx, dy| cell(tile.neighbor(slot, dx, dy)))
}

/// Explicit Euler step of the Gray-Scott model. Never clamps.
#[inline]
pub fn integrate(entry: CacheEntry, lap: (f32, f32), k: Coefficients, reaction_rate: f32) -> Cell {
    let a = entry.a;
    let b = entry.b;
    let reaction = reaction_rate * a * b * b;
    Cell {
        a: a + k.diffusion_a * lap.0 - reaction + k.feed * (1.0 - a),
        b: b + k.diffusion_b * lap.1 + reaction - (k.kill + k.feed) * b,
    }
}

/// Field-wide values derived from the buffer dimensions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldGeometry {
    pub dims: Vec2,
    /// Dimensions divided by the longer one
    pub aspect: Vec2,
    /// Distance term follows the vertical axis
    pub wide: bool,
}

impl FieldGeometry {
    pub fn new(width: usize, height: usize, params: &ReactionParams) -> Self {
        let dims = Vec2::new(width as f32, height as f32);
        let longest = dims.x.max(dims.y);
        Self {
            dims,
            aspect: Vec2::new(dims.x / longest, dims.y / longest),
            wide: dims.x / dims.y >= params.wide_aspect,
        }
    }

    /// Map a cell coordinate to [-1, 1] on both axes
    #[inline]
    pub fn centered(&self, coord: Vec2) -> Vec2 {
        coord.div_elem(self.dims) * 2.0 - Vec2::splat(1.0)
    }
}

/// Kernel state for one dispatch: source buffer, mask, and frame uniforms
pub struct ReactionKernel<'a> {
    source: &'a FieldBuffer,
    mask: &'a SeedMask,
    uniforms: FrameUniforms,
    params: &'a ReactionParams,
    geometry: FieldGeometry,
}

impl<'a> ReactionKernel<'a> {
    /// `mask` must have the same dimensions as `source`
    pub fn new(
        source: &'a FieldBuffer,
        mask: &'a SeedMask,
        uniforms: FrameUniforms,
        params: &'a ReactionParams,
    ) -> Self {
        debug_assert_eq!(source.dims(), mask.dims());
        Self {
            source,
            mask,
            uniforms,
            params,
            geometry: FieldGeometry::new(source.width(), source.height(), params),
        }
    }

    /// Edge-clamped cell a cache slot is loaded from
    #[inline]
    pub fn sample_coord(&self, source: [i64; 2]) -> (usize, usize) {
        clamp_coord(source[0], source[1], self.source.width(), self.source.height())
    }

    /// Smooth falloff of the distance to the pointer: 1 on top of it, 0 far away
    fn pointer_mask(&self, centered: Vec2) -> f32 {
        let aspect = self.geometry.aspect;
        let st = centered.mul_elem(aspect) * 0.5 + Vec2::splat(0.5);
        let pointer = self.uniforms.pointer_pos.mul_elem(aspect) * 0.5 + Vec2::splat(0.5);
        let proximity = 1.0 - st.distance(pointer).min(1.0);
        smoothstep(
            self.params.pointer_falloff_inner,
            self.params.pointer_falloff_outer,
            proximity,
        )
    }

    /// Displaced, fractional sampling position for a clamped cell
    pub fn displaced(&self, x: usize, y: usize) -> Vec2 {
        let coord = Vec2::new(x as f32, y as f32);
        let centered = self.geometry.centered(coord);
        let push =
            self.params.pulse_push * (PULSE_PUSH_GAIN * self.uniforms.pulse + PULSE_PUSH_BIAS);
        let advection = self.params.pointer_advection * self.pointer_mask(centered);
        coord - centered * push - self.uniforms.pointer_velocity * advection
    }

    /// Coefficients for the cell at `centered` with seed value `seed`
    pub fn coefficients(&self, centered: Vec2, seed: f32) -> Coefficients {
        let p = self.params;
        let pulse = self.uniforms.pulse;

        let dist = if self.geometry.wide {
            centered.y * centered.y
        } else {
            centered.x * centered.x
        };

        let speed = self.uniforms.pointer_velocity.length();
        let damping = (p.pointer_damping_gain * self.pointer_mask(centered) * speed * p.pointer_speed_scale)
            .min(p.pointer_damping_max);

        let diffusion_b = p.diffusion_b + dist * p.diffusion_b_falloff
            + p.diffusion_b_pulse * (pulse * 0.5 + 0.5)
            - damping;

        Coefficients {
            diffusion_a: p.diffusion_a - dist * p.diffusion_a_falloff,
            diffusion_b: diffusion_b.max(p.diffusion_b_floor),
            feed: p.feed,
            kill: p.base_kill + seed * p.kill_boost * (pulse * p.kill_pulse_gain + p.kill_pulse_bias),
        }
    }
}

impl GroupKernel for ReactionKernel<'_> {
    type Entry = CacheEntry;
    type Output = Cell;

    fn load(&self, source: [i64; 2]) -> CacheEntry {
        let (x, y) = self.sample_coord(source);
        let sample = self.source.sample_bilinear(self.displaced(x, y));
        CacheEntry {
            a: sample.a,
            b: sample.b,
            seed: self.mask.get(x, y),
        }
    }

    fn compute(&self, slot: [usize; 2], cell: [usize; 2], tile: &SharedTile<CacheEntry>) -> Cell {
        let entry = tile.get(slot);
        let lap = laplacian(tile, slot);
        let centered = self
            .geometry
            .centered(Vec2::new(cell[0] as f32, cell[1] as f32));
        let k = self.coefficients(centered, entry.seed);
        integrate(entry, lap, k, self.params.reaction_rate)
    }

    fn direct(&self, cell: [usize; 2]) -> Cell {
        let (x, y) = (cell[0], cell[1]);
        let center = self.source.get(x, y);
        let lap = weighted_difference(center, |dx, dy| {
            self.source.fetch_clamped(x as i64 + dx as i64, y as i64 + dy as i64)
        });
        let entry = CacheEntry {
            a: center.a,
            b: center.b,
            seed: self.mask.get(x, y),
        };
        let centered = self.geometry.centered(Vec2::new(x as f32, y as f32));
        let k = self.coefficients(centered, entry.seed);
        integrate(entry, lap, k, self.params.reaction_rate)
    }
}

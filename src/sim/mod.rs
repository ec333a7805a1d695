//! Tiled, work-group parallel Gray-Scott solver.
//!
//! [`Solver`] owns the two field buffers and ping-pongs between them: every
//! dispatch reads one buffer through [`ReactionKernel`] and writes the other.
//! A frame issues `2 * iterations` dispatches, so the front buffer holds the
//! result at the end of every frame.

pub mod field;
pub mod kernel;
pub mod params;
pub mod pingpong;
pub mod workgroup;

pub use field::{Cell, FieldBuffer, InitialPattern, SeedMask};
pub use kernel::ReactionKernel;
pub use params::{FrameUniforms, ReactionParams};
pub use pingpong::{PingPong, Slot};
pub use workgroup::{ExecutionMode, KernelLayout};

use crate::error::SimError;

/// Construction-time solver settings
#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    /// Field resolution relative to the display resolution
    pub scale: f32,
    pub execution: ExecutionMode,
    pub params: ReactionParams,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            scale: 0.25,
            execution: ExecutionMode::default(),
            params: ReactionParams::default(),
        }
    }
}

pub struct Solver {
    layout: KernelLayout,
    config: SolverConfig,
    buffers: [FieldBuffer; 2],
    ping_pong: PingPong,
    groups: [usize; 2],
}

impl Solver {
    /// Allocate buffers for a `display_width * display_height` viewport and
    /// seed the front buffer with `pattern`.
    pub fn new(
        display_width: u32,
        display_height: u32,
        config: SolverConfig,
        pattern: InitialPattern<'_>,
    ) -> Result<Self, SimError> {
        Self::with_layout(KernelLayout::DEFAULT, display_width, display_height, config, pattern)
    }

    /// Like [`Solver::new`] with an explicit work-group layout
    pub fn with_layout(
        layout: KernelLayout,
        display_width: u32,
        display_height: u32,
        config: SolverConfig,
        pattern: InitialPattern<'_>,
    ) -> Result<Self, SimError> {
        layout.check()?;
        let (width, height) = field_size(display_width, display_height, config.scale);
        let buffers = allocate_buffers(width, height, pattern)?;
        Ok(Self {
            layout,
            groups: layout.group_count(width, height),
            config,
            buffers,
            ping_pong: PingPong::new(),
        })
    }

    /// Field dimensions this solver would use for a viewport
    pub fn field_size_for(&self, display_width: u32, display_height: u32) -> (usize, usize) {
        field_size(display_width, display_height, self.config.scale)
    }

    /// Replace both buffers for a new viewport size. In-flight state is
    /// discarded; on failure the previous buffers stay in place.
    pub fn resize(
        &mut self,
        display_width: u32,
        display_height: u32,
        pattern: InitialPattern<'_>,
    ) -> Result<(), SimError> {
        let (width, height) = self.field_size_for(display_width, display_height);
        self.buffers = allocate_buffers(width, height, pattern)?;
        self.groups = self.layout.group_count(width, height);
        self.ping_pong.reset();
        Ok(())
    }

    /// Re-seed in place without reallocating
    pub fn reseed(&mut self, pattern: InitialPattern<'_>) -> Result<(), SimError> {
        self.buffers[0].seed(pattern)?;
        self.buffers[1].fill(Cell::default());
        self.ping_pong.reset();
        Ok(())
    }

    /// Run one frame: `iterations` pairs of dispatches. Returns the buffer
    /// holding the newest state.
    pub fn step(
        &mut self,
        iterations: usize,
        uniforms: &FrameUniforms,
        mask: &SeedMask,
    ) -> Result<&FieldBuffer, SimError> {
        self.check_mask(mask)?;
        for _ in 0..iterations {
            self.dispatch(uniforms, mask)?;
            self.dispatch(uniforms, mask)?;
        }
        Ok(self.result())
    }

    /// Run a single dispatch from the current source into the destination
    pub fn dispatch(&mut self, uniforms: &FrameUniforms, mask: &SeedMask) -> Result<(), SimError> {
        self.check_mask(mask)?;
        let (width, height) = self.dims();

        let (front, back) = self.buffers.split_at_mut(1);
        let (source, destination) = match self.ping_pong.source() {
            Slot::Front => (&front[0], &mut back[0]),
            Slot::Back => (&back[0], &mut front[0]),
        };

        let kernel = ReactionKernel::new(source, mask, *uniforms, &self.config.params);
        workgroup::dispatch(
            &kernel,
            &self.layout,
            width,
            height,
            destination.cells_mut(),
            self.config.execution,
        )?;

        self.ping_pong.advance();
        Ok(())
    }

    /// The buffer most recently written (the front buffer before any dispatch)
    pub fn result(&self) -> &FieldBuffer {
        &self.buffers[self.ping_pong.latest().index()]
    }

    pub fn dims(&self) -> (usize, usize) {
        self.buffers[0].dims()
    }

    /// Work groups per dispatch along x and y
    pub fn groups(&self) -> [usize; 2] {
        self.groups
    }

    pub fn execution(&self) -> ExecutionMode {
        self.config.execution
    }

    /// Switch executors between dispatches; the field state is untouched
    pub fn set_execution(&mut self, execution: ExecutionMode) {
        self.config.execution = execution;
    }

    pub fn ping_pong(&self) -> &PingPong {
        &self.ping_pong
    }

    fn check_mask(&self, mask: &SeedMask) -> Result<(), SimError> {
        if mask.dims() != self.dims() {
            return Err(SimError::MaskSize {
                expected: self.dims(),
                actual: mask.dims(),
            });
        }
        Ok(())
    }
}

/// Reduced-resolution field size for a viewport, at least 1x1
pub fn field_size(display_width: u32, display_height: u32, scale: f32) -> (usize, usize) {
    let scaled = |d: u32| ((d as f32 * scale).round() as usize).max(1);
    (scaled(display_width), scaled(display_height))
}

fn allocate_buffers(
    width: usize,
    height: usize,
    pattern: InitialPattern<'_>,
) -> Result<[FieldBuffer; 2], SimError> {
    let mut front = FieldBuffer::try_new(width, height)?;
    let back = FieldBuffer::try_new(width, height)?;
    front.seed(pattern)?;
    Ok([front, back])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec2;

    fn exact_config(params: ReactionParams) -> SolverConfig {
        SolverConfig {
            scale: 1.0,
            execution: ExecutionMode::Phased,
            params,
        }
    }

    fn far_pointer(pulse: f32) -> FrameUniforms {
        FrameUniforms::new(pulse, Vec2::new(10.0, 10.0), Vec2::zero())
    }

    /// Smooth, non-uniform starting field
    fn wavy(solver: &mut Solver) {
        let (w, h) = solver.dims();
        let front = &mut solver.buffers[0];
        for y in 0..h {
            for x in 0..w {
                let a = 0.5 + 0.4 * (x as f32 * 0.7).sin() * (y as f32 * 0.3).cos();
                let b = 0.3 + 0.25 * ((x + 2 * y) as f32 * 0.45).sin();
                front.set(x, y, Cell::new(a, b));
            }
        }
    }

    #[test]
    fn test_block_scenario_single_dispatch() {
        let params = ReactionParams::uniform(1.0, 0.25, 0.065, 0.06);
        let mut solver =
            Solver::new(16, 16, exact_config(params), InitialPattern::Blob { half_size: 0.0 }).unwrap();
        for y in 6..10 {
            for x in 6..10 {
                solver.buffers[0].set(x, y, Cell::new(0.0, 1.0));
            }
        }
        let mask = SeedMask::try_new(16, 16).unwrap();
        solver.dispatch(&far_pointer(0.0), &mask).unwrap();
        let out = solver.result();
        assert_eq!(solver.ping_pong().latest(), Slot::Back);

        // Strictly inside: zero Laplacian, no A to react with, B decays by kill + feed
        for y in 7..9 {
            for x in 7..9 {
                let c = out.get(x, y);
                assert!((c.a - 0.065).abs() < 1e-6, "{:?}", c);
                assert!((c.b - 0.875).abs() < 1e-6, "{:?}", c);
            }
        }

        // Edge neighbour of the block: B leaks out through diffusion only
        let border = out.get(5, 7);
        assert!(border.b > 0.0);
        assert!((border.b - 0.25 * 0.30).abs() < 1e-6);
        assert!((border.a - 0.70).abs() < 1e-6);

        // Far from the block nothing changes
        for &(x, y) in &[(0, 0), (15, 15), (0, 15), (15, 0), (2, 12), (12, 2)] {
            assert_eq!(out.get(x, y), Cell::new(1.0, 0.0));
        }
    }

    #[test]
    fn test_uniform_field_is_stationary_without_reaction() {
        let mut params = ReactionParams::uniform(1.0, 0.25, 0.0, 0.0);
        params.reaction_rate = 0.0;
        let mut solver =
            Solver::new(21, 13, exact_config(params), InitialPattern::Blob { half_size: 0.0 }).unwrap();
        solver.buffers[0].fill(Cell::new(0.42, 0.17));
        let mask = SeedMask::try_new(21, 13).unwrap();
        solver.step(3, &far_pointer(0.0), &mask).unwrap();
        assert!(solver.result().cells().iter().all(|&c| c == Cell::new(0.42, 0.17)));
    }

    #[test]
    fn test_pure_diffusion_conserves_mass() {
        let mut params = ReactionParams::uniform(1.0, 0.25, 0.0, 0.0);
        params.reaction_rate = 0.0;
        let mut solver =
            Solver::new(23, 17, exact_config(params), InitialPattern::Blob { half_size: 0.0 }).unwrap();
        wavy(&mut solver);
        let (a0, b0) = solver.result().totals();

        let mask = SeedMask::try_new(23, 17).unwrap();
        for _ in 0..21 {
            solver.dispatch(&far_pointer(0.3), &mask).unwrap();
        }
        let (a1, b1) = solver.result().totals();
        assert!(((a1 - a0) / a0).abs() < 1e-4, "A {} -> {}", a0, a1);
        assert!(((b1 - b0) / b0).abs() < 1e-4, "B {} -> {}", b0, b1);
    }

    #[test]
    fn test_ping_pong_parity_selects_result() {
        let mask = SeedMask::try_new(20, 10).unwrap();
        for n in 0..5 {
            let mut solver = Solver::new(
                20,
                10,
                exact_config(ReactionParams::default()),
                InitialPattern::Blob { half_size: 3.0 },
            )
            .unwrap();
            for _ in 0..n {
                solver.dispatch(&far_pointer(0.0), &mask).unwrap();
            }
            let expected = if n % 2 == 0 { 0 } else { 1 };
            assert!(std::ptr::eq(solver.result(), &solver.buffers[expected]));
        }
    }

    #[test]
    fn test_step_ends_on_front_buffer() {
        let mask = SeedMask::try_new(30, 20).unwrap();
        let mut solver = Solver::new(
            30,
            20,
            exact_config(ReactionParams::default()),
            InitialPattern::Blob { half_size: 4.0 },
        )
        .unwrap();
        solver.step(3, &far_pointer(0.5), &mask).unwrap();
        assert_eq!(solver.ping_pong().dispatches(), 6);
        assert_eq!(solver.ping_pong().latest(), Slot::Front);
        assert!(std::ptr::eq(solver.result(), &solver.buffers[0]));
    }

    #[test]
    fn test_runs_are_deterministic() {
        let run = |execution: ExecutionMode| {
            let config = SolverConfig {
                scale: 0.5,
                execution,
                params: ReactionParams::default(),
            };
            let mut solver = Solver::new(64, 40, config, InitialPattern::Blob { half_size: 4.0 }).unwrap();
            let (w, h) = solver.dims();
            let mut mask = SeedMask::try_new(w, h).unwrap();
            for x in 4..12 {
                mask.set(x, 5, 1.0);
            }
            for frame in 0..4 {
                let t = frame as f32 * 0.1;
                let uniforms = FrameUniforms::new(
                    (t * 6.0).sin(),
                    Vec2::new(t - 0.2, 0.1),
                    Vec2::new(0.01, -0.005),
                );
                solver.step(2, &uniforms, &mask).unwrap();
            }
            solver
                .result()
                .cells()
                .iter()
                .map(|c| (c.a.to_bits(), c.b.to_bits()))
                .collect::<Vec<_>>()
        };

        let first = run(ExecutionMode::Phased);
        assert_eq!(first, run(ExecutionMode::Phased));
        assert_eq!(first, run(ExecutionMode::Threaded));
    }

    #[test]
    fn test_direct_mode_matches_tiled_without_displacement() {
        let mut params = ReactionParams::default();
        params.pulse_push = 0.0;
        params.pointer_advection = 0.0;
        let mask = SeedMask::from_values(
            37,
            22,
            (0..37 * 22).map(|i| if i % 11 < 3 { 1.0 } else { 0.0 }).collect(),
        )
        .unwrap();
        let uniforms = FrameUniforms::new(0.4, Vec2::new(0.2, -0.1), Vec2::new(0.02, 0.01));

        let run = |execution: ExecutionMode| {
            let mut solver =
                Solver::new(37, 22, exact_config(params.clone()), InitialPattern::Blob { half_size: 0.0 })
                    .unwrap();
            wavy(&mut solver);
            solver.set_execution(execution);
            let result = solver.step(3, &uniforms, &mask).unwrap().clone();
            result
        };
        assert_eq!(run(ExecutionMode::Phased), run(ExecutionMode::Direct));
    }

    #[test]
    fn test_execution_switch_keeps_state() {
        let mask = SeedMask::try_new(20, 20).unwrap();
        let mut solver = Solver::new(
            20,
            20,
            exact_config(ReactionParams::default()),
            InitialPattern::Blob { half_size: 3.0 },
        )
        .unwrap();
        solver.dispatch(&far_pointer(0.0), &mask).unwrap();
        let before = solver.result().clone();
        solver.set_execution(ExecutionMode::Direct);
        assert_eq!(solver.execution(), ExecutionMode::Direct);
        assert_eq!(solver.result(), &before);
        assert_eq!(solver.ping_pong().dispatches(), 1);
    }

    #[test]
    fn test_invalid_layout_is_an_error() {
        let result = Solver::with_layout(
            KernelLayout::new([1, 1], [2, 2]),
            16,
            16,
            exact_config(ReactionParams::default()),
            InitialPattern::Blob { half_size: 2.0 },
        );
        assert!(matches!(result, Err(SimError::InvalidLayout { .. })));
    }

    #[test]
    fn test_values_stay_finite_with_default_coefficients() {
        let mask = SeedMask::try_new(40, 24).unwrap();
        let mut solver = Solver::new(
            40,
            24,
            exact_config(ReactionParams::default()),
            InitialPattern::Blob { half_size: 5.0 },
        )
        .unwrap();
        for frame in 0..10 {
            let pulse = (frame as f32).sin();
            let uniforms = FrameUniforms::new(pulse, Vec2::new(0.1, 0.1), Vec2::new(0.05, 0.02));
            solver.step(10, &uniforms, &mask).unwrap();
        }
        assert!(solver
            .result()
            .cells()
            .iter()
            .all(|c| c.a.is_finite() && c.b.is_finite()));
    }

    #[test]
    fn test_mask_size_mismatch_is_reported() {
        let mut solver = Solver::new(
            16,
            16,
            exact_config(ReactionParams::default()),
            InitialPattern::Blob { half_size: 2.0 },
        )
        .unwrap();
        let before = solver.result().clone();
        let mask = SeedMask::try_new(8, 8).unwrap();
        let err = solver.step(1, &far_pointer(0.0), &mask).unwrap_err();
        assert_eq!(
            err,
            SimError::MaskSize {
                expected: (16, 16),
                actual: (8, 8)
            }
        );
        assert_eq!(solver.result(), &before);
        assert_eq!(solver.ping_pong().dispatches(), 0);
    }

    #[test]
    fn test_resize_reallocates_and_resets() {
        let config = SolverConfig {
            scale: 0.25,
            ..SolverConfig::default()
        };
        let mut solver = Solver::new(640, 480, config, InitialPattern::Blob { half_size: 4.0 }).unwrap();
        assert_eq!(solver.dims(), (160, 120));
        assert_eq!(solver.groups(), [12, 9]);

        let mask = SeedMask::try_new(160, 120).unwrap();
        solver.dispatch(&far_pointer(0.0), &mask).unwrap();

        let (w, h) = solver.field_size_for(1000, 300);
        let mut mask = SeedMask::try_new(w, h).unwrap();
        mask.fill(1.0);
        solver.resize(1000, 300, InitialPattern::Mask(&mask)).unwrap();
        assert_eq!(solver.dims(), (250, 75));
        assert_eq!(solver.groups(), [18, 6]);
        assert_eq!(solver.ping_pong().latest(), Slot::Front);
        assert!(solver.result().cells().iter().all(|&c| c == Cell::new(1.0, 0.0)));
        assert!(solver.buffers[1].cells().iter().all(|&c| c == Cell::default()));
    }

    #[test]
    fn test_failed_resize_keeps_previous_state() {
        let mut solver = Solver::new(
            32,
            32,
            exact_config(ReactionParams::default()),
            InitialPattern::Blob { half_size: 2.0 },
        )
        .unwrap();
        let wrong = SeedMask::try_new(3, 3).unwrap();
        assert!(solver.resize(64, 64, InitialPattern::Mask(&wrong)).is_err());
        assert_eq!(solver.dims(), (32, 32));
    }

    #[test]
    fn test_reseed_restarts_in_place() {
        let mask = SeedMask::try_new(24, 24).unwrap();
        let mut solver = Solver::new(
            24,
            24,
            exact_config(ReactionParams::default()),
            InitialPattern::Blob { half_size: 3.0 },
        )
        .unwrap();
        let seeded = solver.result().clone();
        solver.dispatch(&far_pointer(0.0), &mask).unwrap();
        assert_eq!(solver.ping_pong().latest(), Slot::Back);

        let front = solver.buffers[0].cells().as_ptr();
        solver.reseed(InitialPattern::Blob { half_size: 3.0 }).unwrap();
        assert_eq!(solver.buffers[0].cells().as_ptr(), front);
        assert_eq!(solver.ping_pong(), &PingPong::new());
        assert_eq!(solver.result(), &seeded);
        assert!(solver.buffers[1].cells().iter().all(|&c| c == Cell::default()));
    }

    #[test]
    fn test_field_size_rounds_and_floors_at_one() {
        assert_eq!(field_size(1920, 1080, 0.25), (480, 270));
        assert_eq!(field_size(3, 1, 0.25), (1, 1));
        assert_eq!(field_size(1, 1, 0.5), (1, 1));
    }
}

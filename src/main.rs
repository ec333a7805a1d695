mod animation;
mod composite;
mod config;
mod display;
mod error;
mod mask;
mod math;
mod sim;
mod util;

use animation::{normalized_pointer, pulse_at, PointerFollower};
use composite::composite;
use config::{parse_args, print_usage, Command, PatternKind, Settings, MAX_ITERATIONS, MIN_ITERATIONS};
use display::{Display, InputEvent, MouseButtonKind, PixelBuffer, RenderTarget};
use error::AppError;
use log::{debug, error, info, warn};
use mask::{ClockMask, ClockTime};
use sdl2::keyboard::Keycode;
use sim::{field_size, ExecutionMode, InitialPattern, Solver};
use std::time::Instant;
use util::FpsCounter;

const TITLE: &str = "rdclock";

/// Seed pattern selected by the settings; the clock pattern reads `clock`
fn initial_pattern<'a>(settings: &Settings, clock: &'a ClockMask) -> InitialPattern<'a> {
    match settings.simulation.initial_pattern {
        PatternKind::Clock => InitialPattern::Mask(clock.mask()),
        PatternKind::Blob => InitialPattern::Blob {
            half_size: settings.simulation.blob_half_size,
        },
    }
}

/// Reallocate the clock mask and solver for a new window size. On failure
/// the field is untouched and the mask is sized back to match it.
fn resize_simulation(
    settings: &Settings,
    solver: &mut Solver,
    clock: &mut ClockMask,
    width: u32,
    height: u32,
) -> Result<(), AppError> {
    let (fw, fh) = solver.field_size_for(width, height);
    clock.resize(fw, fh)?;
    clock.refresh(ClockTime::now());
    if let Err(e) = solver.resize(width, height, initial_pattern(settings, clock)) {
        let (w, h) = solver.dims();
        clock.resize(w, h)?;
        clock.refresh(ClockTime::now());
        return Err(e.into());
    }
    Ok(())
}

/// Executor the M key switches to
fn toggled(execution: ExecutionMode) -> ExecutionMode {
    match execution {
        ExecutionMode::Direct => ExecutionMode::Phased,
        ExecutionMode::Phased | ExecutionMode::Threaded => ExecutionMode::Direct,
    }
}

fn run() -> Result<(), AppError> {
    let opts = match parse_args(&std::env::args().skip(1).collect::<Vec<_>>()) {
        Command::Run(opts) => opts,
        Command::Help => {
            print_usage();
            return Ok(());
        },
    };

    let mut settings = Settings::load_or_default(&opts.config_path)?;
    opts.apply(&mut settings);
    settings.validate()?;
    for warning in settings.warnings() {
        warn!("{}", warning);
    }
    if opts.save_config {
        settings.save(&opts.config_path)?;
        info!("settings saved to {}", opts.config_path);
    }

    let (width, height) = (settings.display.width, settings.display.height);
    let (mut display, texture_creator) =
        Display::with_options(TITLE, width, height, settings.display.vsync)?;
    let mut target = RenderTarget::with_size(&texture_creator, width, height)?;
    let mut buffer = PixelBuffer::with_size(width, height);

    let (fw, fh) = field_size(width, height, settings.simulation.scale);
    let mut clock = ClockMask::new(fw, fh)?;
    clock.refresh(ClockTime::now());
    let mut solver = Solver::new(
        width,
        height,
        settings.solver_config(),
        initial_pattern(&settings, &clock),
    )?;

    let mut pointer = PointerFollower::new();
    let mut iterations = settings.simulation.iterations;
    let mut fps_counter = FpsCounter::new(60);
    let mut show_fps = false;

    info!(
        "{}x{} window, {}x{} field, {} groups, {} iterations, {:?} execution",
        width,
        height,
        fw,
        fh,
        solver.groups()[0] * solver.groups()[1],
        iterations,
        settings.simulation.execution
    );
    info!("keys: Esc quit, R reseed, Up/Down iterations, F fps, M toggle cached/direct solver");

    'main: loop {
        fps_counter.tick();

        for event in display.poll_events() {
            match event {
                InputEvent::Quit => break 'main,
                InputEvent::KeyDown(key) => match key {
                    Keycode::Escape => break 'main,
                    Keycode::R => {
                        solver.reseed(initial_pattern(&settings, &clock))?;
                        info!("field reseeded");
                    },
                    Keycode::Up | Keycode::Down => {
                        iterations = if key == Keycode::Up {
                            (iterations + 1).min(MAX_ITERATIONS)
                        } else {
                            iterations.saturating_sub(1).max(MIN_ITERATIONS)
                        };
                        display.set_title(&format!("{} ({} iterations)", TITLE, iterations))?;
                        debug!("iterations per frame: {}", iterations);
                    },
                    Keycode::F => show_fps = !show_fps,
                    Keycode::M => {
                        let execution = toggled(solver.execution());
                        solver.set_execution(execution);
                        fps_counter.reset_solve();
                        info!("{:?} execution", execution);
                    },
                    _ => {},
                },
                InputEvent::MouseMove { x, y } => {
                    pointer.move_to(normalized_pointer(x, y, display.width(), display.height()));
                },
                InputEvent::MouseDown {
                    x,
                    y,
                    button: MouseButtonKind::Left,
                } => {
                    pointer.press(normalized_pointer(x, y, display.width(), display.height()));
                },
                InputEvent::MouseDown { .. } => {},
                InputEvent::Resized { width, height } => {
                    match resize_simulation(&settings, &mut solver, &mut clock, width, height) {
                        Ok(()) => {
                            target = RenderTarget::with_size(&texture_creator, width, height)?;
                            buffer = PixelBuffer::with_size(width, height);
                            let (fw, fh) = solver.dims();
                            info!("resized to {}x{} ({}x{} field)", width, height, fw, fh);
                        },
                        Err(e) => warn!("resize to {}x{} failed, keeping field: {}", width, height, e),
                    }
                },
            }
        }

        pointer.update();
        if clock.refresh(ClockTime::now()) {
            debug!("clock mask refreshed");
        }

        let pulse = pulse_at(chrono::Utc::now().timestamp_millis());
        let solve_start = Instant::now();
        let field = solver.step(iterations, &pointer.uniforms(pulse), clock.mask())?;
        fps_counter.record_solve(solve_start.elapsed());
        composite(field, &mut buffer, &settings.composite);

        display.present(&mut target, &buffer)?;
        fps_counter.report(show_fps, &format!("{:?}", solver.execution()));
    }

    info!("exiting after {} dispatches", solver.ping_pong().dispatches());
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        error!("{}", e);
        std::process::exit(1);
    }
}

//! Persistent settings (`rdclock.json`) and command line overrides.

use crate::composite::Palette;
use crate::error::AppError;
use crate::sim::{ExecutionMode, ReactionParams, SolverConfig};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "rdclock.json";
pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;

/// Allowed range for solver iterations per frame
pub const MIN_ITERATIONS: usize = 1;
pub const MAX_ITERATIONS: usize = 40;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            vsync: true,
        }
    }
}

/// What the field is seeded with on start, reseed and resize
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    #[default]
    Clock,
    Blob,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Field resolution relative to the window
    pub scale: f32,
    /// Dispatch pairs per frame
    pub iterations: usize,
    pub execution: ExecutionMode,
    pub initial_pattern: PatternKind,
    /// Half edge length of the blob pattern, in cells
    pub blob_half_size: f32,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            scale: 0.25,
            iterations: 10,
            execution: ExecutionMode::default(),
            initial_pattern: PatternKind::default(),
            blob_half_size: 20.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub display: DisplaySettings,
    pub simulation: SimulationSettings,
    pub reaction: ReactionParams,
    pub composite: Palette,
}

impl Settings {
    /// Save settings to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), AppError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        fs::write(path, json).map_err(|e| AppError::Config(e.to_string()))
    }

    /// Load settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let json = fs::read_to_string(path).map_err(|e| AppError::Config(e.to_string()))?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self, AppError> {
        serde_json::from_str(json).map_err(|e| AppError::Config(e.to_string()))
    }

    /// Load `path` if it exists, otherwise fall back to defaults. A file
    /// that exists but does not parse is an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("{} not found, using default settings", path.display());
            return Ok(Self::default());
        }
        let settings = Self::load(path)?;
        info!("settings loaded from {}", path.display());
        Ok(settings)
    }

    /// Reject values the solver cannot run with
    pub fn validate(&self) -> Result<(), AppError> {
        let sim = &self.simulation;
        if !(sim.scale > 0.0 && sim.scale <= 1.0) {
            return Err(AppError::Config(format!(
                "simulation.scale must be in (0, 1], got {}",
                sim.scale
            )));
        }
        if !(MIN_ITERATIONS..=MAX_ITERATIONS).contains(&sim.iterations) {
            return Err(AppError::Config(format!(
                "simulation.iterations must be in {}..={}, got {}",
                MIN_ITERATIONS, MAX_ITERATIONS, sim.iterations
            )));
        }
        if self.display.width == 0 || self.display.height == 0 {
            return Err(AppError::Config(format!(
                "display size must be non-zero, got {}x{}",
                self.display.width, self.display.height
            )));
        }
        if sim.blob_half_size < 0.0 {
            return Err(AppError::Config(format!(
                "simulation.blob_half_size must not be negative, got {}",
                sim.blob_half_size
            )));
        }
        Ok(())
    }

    /// Settings that are valid but poor choices for the interactive loop
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.simulation.execution == ExecutionMode::Threaded {
            warnings.push(
                "threaded execution spawns a thread per invocation for every work group; \
                 it exists for testing and benchmarking and will not keep up in real time"
                    .to_string(),
            );
        }
        warnings
    }

    pub fn solver_config(&self) -> SolverConfig {
        SolverConfig {
            scale: self.simulation.scale,
            execution: self.simulation.execution,
            params: self.reaction.clone(),
        }
    }
}

// ============================================================================
// Command line
// ============================================================================

/// Parsed command line
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Run(CliOptions),
    Help,
}

/// Command line values; `None` leaves the loaded setting alone
#[derive(Debug, Clone, PartialEq)]
pub struct CliOptions {
    pub config_path: String,
    pub save_config: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub no_vsync: bool,
    pub iterations: Option<usize>,
    pub scale: Option<f32>,
    pub execution: Option<ExecutionMode>,
    pub blob: bool,
}

impl Default for CliOptions {
    fn default() -> Self {
        Self {
            config_path: DEFAULT_CONFIG_PATH.to_string(),
            save_config: false,
            width: None,
            height: None,
            no_vsync: false,
            iterations: None,
            scale: None,
            execution: None,
            blob: false,
        }
    }
}

impl CliOptions {
    /// Layer the command line on top of loaded settings
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(w) = self.width {
            settings.display.width = w;
        }
        if let Some(h) = self.height {
            settings.display.height = h;
        }
        if self.no_vsync {
            settings.display.vsync = false;
        }
        if let Some(n) = self.iterations {
            settings.simulation.iterations = n;
        }
        if let Some(s) = self.scale {
            settings.simulation.scale = s;
        }
        if let Some(execution) = self.execution {
            settings.simulation.execution = execution;
        }
        if self.blob {
            settings.simulation.initial_pattern = PatternKind::Blob;
        }
    }
}

/// Parse `value` for `flag`, warning and skipping it when malformed
fn parse_value<T: std::str::FromStr>(flag: &str, value: &str) -> Option<T> {
    let parsed = value.parse::<T>().ok();
    if parsed.is_none() {
        warn!("ignoring invalid value '{}' for {}", value, flag);
    }
    parsed
}

/// Parse command line arguments (without the program name)
pub fn parse_args(args: &[String]) -> Command {
    let mut opts = CliOptions::default();

    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = args.get(i + 1).map(String::as_str);
        match (flag, value) {
            ("--help", _) => return Command::Help,
            ("--no-vsync", _) => opts.no_vsync = true,
            ("--threaded", _) => opts.execution = Some(ExecutionMode::Threaded),
            ("--direct", _) => opts.execution = Some(ExecutionMode::Direct),
            ("--blob", _) => opts.blob = true,
            ("--save-config", _) => opts.save_config = true,
            ("--width" | "-w", Some(v)) => {
                opts.width = parse_value(flag, v).or(opts.width);
                i += 1;
            },
            ("--height" | "-h", Some(v)) => {
                opts.height = parse_value(flag, v).or(opts.height);
                i += 1;
            },
            ("--resolution" | "-r", Some(v)) => {
                // Parse WxH format (e.g., 1920x1080)
                let parts: Vec<&str> = v.split('x').collect();
                match parts.as_slice() {
                    [w, h] => match (w.parse::<u32>(), h.parse::<u32>()) {
                        (Ok(w), Ok(h)) => {
                            opts.width = Some(w);
                            opts.height = Some(h);
                        },
                        _ => warn!("ignoring invalid resolution '{}'", v),
                    },
                    _ => warn!("ignoring invalid resolution '{}'", v),
                }
                i += 1;
            },
            ("--iterations" | "-i", Some(v)) => {
                opts.iterations = parse_value(flag, v).or(opts.iterations);
                i += 1;
            },
            ("--scale", Some(v)) => {
                opts.scale = parse_value(flag, v).or(opts.scale);
                i += 1;
            },
            ("--config", Some(v)) => {
                opts.config_path = v.to_string();
                i += 1;
            },
            (_, _) => warn!("ignoring unknown argument '{}'", flag),
        }
        i += 1;
    }

    Command::Run(opts)
}

pub fn print_usage() {
    println!("Usage: rdclock [OPTIONS]");
    println!();
    println!("Options:");
    println!(
        "  --width W, -w W           Set window width (default: {})",
        DEFAULT_WIDTH
    );
    println!(
        "  --height H, -h H          Set window height (default: {})",
        DEFAULT_HEIGHT
    );
    println!("  --resolution WxH, -r WxH  Set resolution (e.g., 1920x1080)");
    println!("  --no-vsync                Disable VSync for uncapped framerate");
    println!(
        "  --iterations N, -i N      Dispatch pairs per frame ({}..={})",
        MIN_ITERATIONS, MAX_ITERATIONS
    );
    println!("  --scale S                 Field resolution relative to the window");
    println!("  --threaded                Run each work-group with one thread per invocation (slow)");
    println!("  --direct                  Evaluate cells without the work-group cache");
    println!("  --blob                    Seed a square instead of the clock");
    println!(
        "  --config PATH             Settings file (default: {})",
        DEFAULT_CONFIG_PATH
    );
    println!("  --save-config             Write the effective settings to the settings file");
    println!("  --help                    Show this help message");
}

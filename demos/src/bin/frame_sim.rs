//! # Frame Simulation
//!
//! Runs a render path against the tracking device for a fixed number of
//! frames and logs allocations, command lists and synchronization.
//!
//! ```bash
//! # Default settings, 120 frames
//! frame_sim
//!
//! # Load a config file and override the strategy
//! frame_sim --config demos/configs/default.toml --strategy deferred
//!
//! # Print the last frame's submission
//! frame_sim --frames 3 --dump
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use lumen_core::jobs::JobSystem;
use lumen_demos::{CameraMotion, DemoScene, run_frames};
use lumen_graphics::render_path::{RenderPath3D, RenderStrategy};
use lumen_graphics::{DeviceCapabilities, GraphicsDevice, RenderPathConfig};

/// Shading strategy selection for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliStrategy {
    Forward,
    TiledForward,
    Deferred,
    PathTracing,
}

impl From<CliStrategy> for RenderStrategy {
    fn from(cli: CliStrategy) -> Self {
        match cli {
            CliStrategy::Forward => RenderStrategy::Forward,
            CliStrategy::TiledForward => RenderStrategy::TiledForward,
            CliStrategy::Deferred => RenderStrategy::Deferred,
            CliStrategy::PathTracing => RenderStrategy::PathTracing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CliScene {
    Empty,
    Courtyard,
    Harbor,
}

impl From<CliScene> for DemoScene {
    fn from(cli: CliScene) -> Self {
        match cli {
            CliScene::Empty => DemoScene::Empty,
            CliScene::Courtyard => DemoScene::Courtyard,
            CliScene::Harbor => DemoScene::Harbor,
        }
    }
}

/// Headless render path frame simulation.
#[derive(Parser, Debug)]
#[command(name = "frame_sim", version, about)]
struct Args {
    /// TOML render path config; command line values override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of frames to run.
    #[arg(short, long, default_value_t = 120)]
    frames: u64,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    #[arg(long, value_enum)]
    strategy: Option<CliStrategy>,

    /// MSAA sample count (1, 2, 4 or 8).
    #[arg(long)]
    msaa: Option<u32>,

    /// Job system worker threads.
    #[arg(long)]
    workers: Option<usize>,

    #[arg(long, value_enum, default_value = "courtyard")]
    scene: CliScene,

    /// Orbit the camera around the scene.
    #[arg(long)]
    orbit: bool,

    /// Use a device without ray tracing support.
    #[arg(long)]
    no_raytracing: bool,

    /// Print the last submitted frame.
    #[arg(long)]
    dump: bool,
}

impl Args {
    fn load_config(&self) -> Result<RenderPathConfig, lumen_graphics::ConfigError> {
        let mut config = match &self.config {
            Some(path) => RenderPathConfig::load(path)?,
            None => RenderPathConfig::default(),
        };
        let display = &mut config.display;
        if let Some(width) = self.width {
            display.width = width;
        }
        if let Some(height) = self.height {
            display.height = height;
        }
        if let Some(strategy) = self.strategy {
            display.strategy = strategy.into();
        }
        if let Some(msaa) = self.msaa {
            display.msaa = msaa;
        }
        if self.workers.is_some() {
            config.jobs.workers = self.workers;
        }
        config.validate()?;
        Ok(config)
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = args.load_config()?;

    let capabilities = if args.no_raytracing {
        DeviceCapabilities::default()
    } else {
        DeviceCapabilities::full()
    };
    let device = GraphicsDevice::new("Simulated Adapter", capabilities);
    let jobs = JobSystem::new(config.jobs.worker_count());

    let mut path = RenderPath3D::new(device.clone(), config.display.strategy);
    path.apply_config(&config)?;
    path.start()?;

    let demo: DemoScene = args.scene.into();
    let mut scene = demo.build();
    log::info!(
        "Running {} frames of '{}' at {}x{} ({})",
        args.frames,
        demo.name(),
        config.display.width,
        config.display.height,
        config.display.strategy.name()
    );

    let motion = if args.orbit {
        CameraMotion::Orbit { radius: 14.0, speed: 0.4 }
    } else {
        CameraMotion::Still
    };
    let summary = run_frames(&mut path, &mut scene, &jobs, args.frames, 1.0 / 60.0, motion)?;

    log::info!(
        "Rendered {} frames, skipped {}",
        summary.frames_rendered,
        summary.frames_skipped
    );
    log::info!(
        "Command lists: {}, commands: {}, cross-queue waits: {}, alias barriers: {}",
        summary.command_lists,
        summary.commands,
        summary.cross_queue_waits,
        summary.alias_barriers
    );
    log::info!(
        "Textures: {} live, {:.1} MiB, {} resizes",
        device.texture_count(),
        path.memory_size_in_bytes() as f64 / (1024.0 * 1024.0),
        path.resize_count()
    );
    if path.strategy() == RenderStrategy::PathTracing {
        let accumulation = path.accumulation();
        log::info!(
            "Path tracing: {}/{} samples",
            accumulation.samples(),
            accumulation.target()
        );
    }

    if args.dump
        && let Some(report) = path.last_frame()
    {
        println!("{}", report.dump());
    }

    path.stop();
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    lumen_core::init();
    lumen_graphics::init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("frame_sim failed: {err}");
            ExitCode::FAILURE
        }
    }
}

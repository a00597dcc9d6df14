mod config;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use clap::Parser;
use log::{error, info, warn};

use gbemu_core::frontend::{AudioSink, Color, SCREEN_HEIGHT, SCREEN_WIDTH};
use gbemu_core::{Cartridge, GameBoy};

use crate::config::{EmulationMode, RunnerConfig};

#[derive(Parser)]
#[command(version, about = "Run a Game Boy ROM without a window")]
struct Args {
    /// Path to ROM file
    rom: PathBuf,

    /// Number of frames to run
    #[arg(long)]
    frames: Option<u32>,

    /// Force DMG mode
    #[arg(long, conflicts_with = "cgb")]
    dmg: bool,

    /// Force CGB mode
    #[arg(long, conflicts_with = "dmg")]
    cgb: bool,

    /// TOML file with runner settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the last frame to this PNG file
    #[arg(long)]
    screenshot: Option<PathBuf>,

    /// Print serial output to stdout
    #[arg(long)]
    serial: bool,
}

/// Counts buffers instead of playing them.
#[derive(Clone, Default)]
struct CountingAudio {
    buffers: Arc<AtomicUsize>,
}

impl AudioSink for CountingAudio {
    fn on_audio_buffer_full(&mut self, _samples: &[i16]) {
        self.buffers.fetch_add(1, Ordering::Relaxed);
    }
}

fn write_png(path: &Path, frame: &[Color]) -> io::Result<()> {
    let file = File::create(path)?;
    let mut encoder = png::Encoder::new(
        BufWriter::new(file),
        SCREEN_WIDTH as u32,
        SCREEN_HEIGHT as u32,
    );
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().map_err(io::Error::other)?;
    let data: Vec<u8> = frame.iter().flat_map(|c| [c.r, c.g, c.b]).collect();
    writer.write_image_data(&data).map_err(io::Error::other)?;
    Ok(())
}

fn resolve_config(args: &Args) -> RunnerConfig {
    let mut cfg = match &args.config {
        Some(path) => config::load_from_file(path),
        None => RunnerConfig::default(),
    };
    if let Some(frames) = args.frames {
        cfg.frames = frames;
    }
    if args.dmg {
        cfg.emulation_mode = EmulationMode::ForceDmg;
    } else if args.cgb {
        cfg.emulation_mode = EmulationMode::ForceCgb;
    }
    cfg.serial |= args.serial;
    cfg
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    let cfg = resolve_config(&args);

    let cart = match Cartridge::from_file(&args.rom) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load ROM: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut gb = GameBoy::with_config(cart, cfg.core_config());
    let audio = CountingAudio::default();
    gb.set_audio_sink(Box::new(audio.clone()));
    info!("Emulator initialized in {:?} mode", gb.model());

    let mut stdout = io::stdout().lock();
    let mut cycles = 0u64;
    for _ in 0..cfg.frames {
        cycles += gb.tick_one_frame() as u64;
        if cfg.serial {
            let out = gb.take_serial_output();
            if !out.is_empty() {
                let _ = stdout.write_all(&out);
                let _ = stdout.flush();
            }
        }
    }

    info!(
        "Ran {} frames ({cycles} cycles), {} audio buffers",
        cfg.frames,
        audio.buffers.load(Ordering::Relaxed)
    );

    if let Some(path) = &args.screenshot {
        match write_png(path, gb.framebuffer()) {
            Ok(()) => info!("Wrote screenshot to {}", path.display()),
            Err(e) => {
                error!("Failed to write screenshot {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        }
    }

    if let Err(e) = gb.save_ram_rtc() {
        warn!("Failed to save cartridge RAM: {e}");
    }
    ExitCode::SUCCESS
}

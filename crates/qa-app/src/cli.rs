use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use qa_core::config::{OutputFormat, SessionConfig};

/// quanta: live microphone spectral feature analyser.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file. Default: config/default.toml.
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Input device name (see --list-devices). Default: host default input.
    #[arg(long)]
    pub device: Option<String>,

    /// Print the available input devices and exit.
    #[arg(long, default_value_t = false)]
    pub list_devices: bool,

    /// Ticks per second.
    #[arg(long)]
    pub fps: Option<u32>,

    /// Output format: text or json.
    #[arg(long)]
    pub format: Option<OutputFormat>,

    /// Sample rate used to convert bins to Hz (default 22050).
    #[arg(long)]
    pub sample_rate_hz: Option<f32>,

    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    pub duration: Option<f64>,

    /// Log level: error, warn, info, debug, trace.
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

impl Cli {
    /// `--duration` as a [`Duration`], `None` when the session runs until Ctrl-C.
    ///
    /// # Errors
    /// Returns an error if the value is negative, not finite, or overflows.
    pub fn run_for(&self) -> anyhow::Result<Option<Duration>> {
        self.duration
            .map(|secs| {
                Duration::try_from_secs_f64(secs).with_context(|| {
                    format!("--duration must be a non-negative number of seconds, got {secs}")
                })
            })
            .transpose()
    }

    /// Apply command-line overrides on top of a loaded config.
    pub fn apply_overrides(&self, config: &mut SessionConfig) {
        if let Some(ref device) = self.device {
            config.session.device.clone_from(device);
        }
        if let Some(fps) = self.fps {
            config.session.target_fps = fps;
        }
        if let Some(format) = self.format {
            config.output.format = format;
        }
        if let Some(rate) = self.sample_rate_hz {
            config.analysis.sample_rate_hz = rate;
        }
        config.clamp_all();
    }
}

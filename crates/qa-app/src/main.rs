use std::sync::Arc;

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use clap::Parser;
use qa_core::config::SessionConfig;

pub mod cli;
pub mod hotreload;
pub mod sink;

fn main() -> Result<()> {
    // 1. Parse CLI
    let cli = cli::Cli::parse();
    let run_for = cli.run_for()?;

    // 2. Logging
    env_logger::Builder::new()
        .filter_level(cli.log_level.parse().unwrap_or(log::LevelFilter::Warn))
        .init();

    if cli.list_devices {
        for name in qa_audio::capture::list_input_devices()? {
            println!("{name}");
        }
        return Ok(());
    }

    // 3. Config + CLI overrides, then hot reload
    let mut config = resolve_config(&cli)?;
    cli.apply_overrides(&mut config);
    let config = Arc::new(ArcSwap::from_pointee(config));

    let _watcher = if cli.config.exists() {
        let overrides = cli.clone();
        Some(hotreload::spawn_config_watcher(
            &cli.config,
            &config,
            move |c| overrides.apply_overrides(c),
        )?)
    } else {
        None
    };

    // 4. Stop signal: Ctrl-C or --duration
    let (stop_tx, stop_rx) = flume::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })?;

    // 5. Capture session (device failure is fatal, no retry)
    let sink = sink::make_sink(&config, std::io::stdout());
    let mut session = qa_audio::session::spawn_session(&config, sink)
        .context("Cannot access microphone. Please ensure permission is granted")?;

    match run_for {
        Some(limit) => {
            let _ = stop_rx.recv_timeout(limit);
        }
        None => {
            let _ = stop_rx.recv();
        }
    }

    // 6. Stop synchronously: no tick runs after this returns
    let last = session.latest().clone();
    let stats = session.stop()?;
    log::info!(
        "Session stopped: {} ticks, {} skipped, last loudness {:.1}",
        stats.extracted,
        stats.skipped,
        last.loudness
    );
    Ok(())
}

/// Load `--config`, or fall back to defaults when the file is absent.
fn resolve_config(cli: &cli::Cli) -> Result<SessionConfig> {
    if cli.config.exists() {
        qa_core::config::load_config(&cli.config)
    } else {
        log::warn!(
            "Config not found: {}. Using defaults.",
            cli.config.display()
        );
        Ok(SessionConfig::default())
    }
}

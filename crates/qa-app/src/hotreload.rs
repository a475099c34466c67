use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use arc_swap::ArcSwap;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use qa_core::config::SessionConfig;

/// Start watching the config file and swap in each valid new version.
///
/// `overrides` is re-applied after every reload so command-line flags keep
/// precedence. Returns the watcher, which must stay alive while the app runs.
///
/// # Errors
/// Returns an error if the watcher cannot be created or the path cannot be watched.
pub fn spawn_config_watcher<F>(
    config_path: &Path,
    config: &Arc<ArcSwap<SessionConfig>>,
    overrides: F,
) -> Result<impl Watcher + use<F>>
where
    F: Fn(&mut SessionConfig) + Send + 'static,
{
    let config = Arc::clone(config);
    let path = config_path.to_path_buf();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        if let Ok(event) = res
            && matches!(event.kind, EventKind::Modify(_))
        {
            reload(&path, &config, &overrides);
        }
    })?;

    watcher.watch(config_path, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

/// Reload `path` into `config`. A bad file keeps the previous config.
fn reload<F>(path: &Path, config: &ArcSwap<SessionConfig>, overrides: &F) -> bool
where
    F: Fn(&mut SessionConfig),
{
    match qa_core::config::load_config(path) {
        Ok(mut new_config) => {
            overrides(&mut new_config);
            let old = config.load();
            if old.analysis.fft_size != new_config.analysis.fft_size
                || old.analysis.waveform_fft_size != new_config.analysis.waveform_fft_size
                || old.session.device != new_config.session.device
                || old.output.format != new_config.output.format
            {
                log::warn!(
                    "Window sizes, device and output format apply to the next session only"
                );
            }
            config.store(Arc::new(new_config));
            log::info!("Config reloaded from {}", path.display());
            true
        }
        Err(e) => {
            log::warn!("Config reload failed, keeping previous config: {e:#}");
            false
        }
    }
}

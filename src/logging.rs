use anyhow::{Context, Result};
use std::{fs::OpenOptions, path::Path, sync::Mutex};
use tracing_subscriber::EnvFilter;

/// Route tracing output to a file. The terminal is in raw mode on the
/// alternate screen, so nothing may be written to stdout/stderr while it runs.
///
/// Does nothing unless `force` is set or `RUST_LOG` is present.
pub(crate) fn init(log_path: &Path, force: bool) -> Result<()> {
    let from_env = std::env::var_os("RUST_LOG").is_some();
    if !force && !from_env {
        return Ok(());
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("opening log file {}", log_path.display()))?;

    let filter = if from_env {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new("skyscene=debug")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing log subscriber: {e}"))?;

    tracing::info!(path = %log_path.display(), "logging started");
    Ok(())
}

//! Logging setup for the engine's audit trail

use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging.
///
/// Transaction audit events are emitted at info level; `debug` widens the
/// filter and `quiet` narrows it to errors. An explicit `RUST_LOG` wins over
/// both flags. When a log file is given, events are also appended there
/// without ANSI escapes, so the file stays greppable.
pub fn init_logging(debug: bool, quiet: bool, log_file: Option<PathBuf>) -> anyhow::Result<()> {
    let default_filter = if debug {
        "fragpatch=debug"
    } else if quiet {
        "fragpatch=error"
    } else {
        "fragpatch=info"
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(debug)
        .with_file(debug)
        .with_writer(std::io::stderr);

    if let Some(log_path) = log_file {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_writer(file);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }

    Ok(())
}

/// Default audit log location under the user config directory.
///
/// One stable file rather than one per run: the audit trail is append-only
/// and meant to be read across sessions.
pub fn default_log_path() -> anyhow::Result<PathBuf> {
    let log_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))?
        .join("fragpatch")
        .join("logs");

    Ok(log_dir.join("audit.log"))
}

//! Tracing setup: structured logs to stderr and to the append-only
//! `WATCHD_LOG` file.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global tracing subscriber. Safe to call once per process;
/// a second call is a no-op (tolerates a parent having already set the
/// global default).
pub fn init(log_file: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)?;
    let (file_writer, guard) = tracing_appender::non_blocking(file);
    // Leak the guard: it must live for the process lifetime to keep
    // flushing the non-blocking writer, and the daemon never tears down
    // its own logging before exit.
    std::mem::forget(guard);

    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_ansi(true);
    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(false);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    Ok(())
}

//! Tracing subscriber setup.
//!
//! Always logs to stdout. With `logging.dir` set, also writes daily-rolling
//! `app.log` (everything that passes the filter) and `error.log` (errors
//! only) through non-blocking writers.

use std::fs;
use std::path::Path;

use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, prelude::*};

use crate::config::{LogFormat, LoggingConfig};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Keeps the file writers flushing; hold for the life of the process
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

/// Install the global subscriber
pub fn init_logging(config: &LoggingConfig) -> std::io::Result<LogGuards> {
    // RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let mut layers = vec![stdout_layer(config.format)];
    let mut guards = Vec::new();

    if let Some(dir) = &config.dir {
        let (file_layers, file_guards) = file_layers(dir)?;
        layers.extend(file_layers);
        guards.extend(file_guards);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .init();

    Ok(LogGuards { _guards: guards })
}

fn stdout_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Compact => fmt::layer()
            .event_format(
                fmt::format()
                    .with_target(true)
                    .with_thread_ids(true)
                    .compact(),
            )
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(false).boxed(),
    }
}

fn file_layers(dir: &Path) -> std::io::Result<(Vec<BoxedLayer>, Vec<WorkerGuard>)> {
    fs::create_dir_all(dir)?;

    let (app_writer, app_guard) = tracing_appender::non_blocking(rolling::daily(dir, "app.log"));
    let (error_writer, error_guard) =
        tracing_appender::non_blocking(rolling::daily(dir, "error.log"));

    let layers = vec![
        fmt::layer().with_ansi(false).with_writer(app_writer).boxed(),
        fmt::layer()
            .with_ansi(false)
            .with_writer(error_writer)
            .with_filter(LevelFilter::ERROR)
            .boxed(),
    ];

    Ok((layers, vec![app_guard, error_guard]))
}

use crate::error::HarnessError;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{filter::LevelFilter, fmt, EnvFilter, Layer, Registry};

/// Keeps the non-blocking file writer alive for the lifetime of the process.
pub struct Logging {
    _file_guard: Option<WorkerGuard>,
}

impl Logging {
    /// `RUST_LOG` takes precedence over [`default_level`].
    pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<Self, HarnessError> {
        let stdout_layer = fmt::layer()
            .with_target(verbose)
            .with_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(default_level(verbose))),
            )
            .boxed();

        let mut layers = vec![stdout_layer];
        let mut file_guard = None;
        if let Some(path) = log_file {
            let directory = path.parent().unwrap_or_else(|| Path::new(""));
            let file_name = path.file_name().ok_or_else(|| {
                HarnessError::CannotInitLogging(format!(
                    "invalid log file path: {}",
                    path.display()
                ))
            })?;
            let file_appender = tracing_appender::rolling::never(directory, file_name);
            let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);
            layers.push(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(non_blocking_file)
                    .with_filter(LevelFilter::TRACE)
                    .boxed(),
            );
            file_guard = Some(guard);
        }

        let subscriber = Registry::default().with(layers);
        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| HarnessError::CannotInitLogging(error.to_string()))?;
        Ok(Self {
            _file_guard: file_guard,
        })
    }
}

/// Quiet runs only surface problems, request level chatter needs `--verbose`.
pub fn default_level(verbose: bool) -> &'static str {
    if verbose {
        "DEBUG"
    } else {
        "WARN"
    }
}

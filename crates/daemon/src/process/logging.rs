use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::ServiceConfig;

const LOG_FILE_PREFIX: &str = "arbor.log";

/// Install the global subscriber: stderr plus, if enabled, a daily file
/// under `<data_dir>/logs`. `RUST_LOG` overrides the configured level.
///
/// Returns the file writer's guard, which must be kept alive for buffered
/// lines to be flushed. Does nothing if a subscriber is already installed.
pub fn init(config: &ServiceConfig) -> Option<WorkerGuard> {
    let filter = || {
        EnvFilter::builder()
            .with_default_directive(config.log_level.into())
            .from_env_lossy()
    };

    let (file_layer, guard) = if config.log_to_file {
        let appender = tracing_appender::rolling::daily(config.logs_dir(), LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(filter());
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter());

    match tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
    {
        Ok(()) => guard,
        Err(_) => None,
    }
}

// Logger initialization

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Directory for an additional daily-rolling log file.
pub const LOG_DIR_VAR: &str = "RAG_LOG_DIR";

const DEFAULT_FILTER: &str = "gemini_rag=debug,tower_http=debug,axum=info";

/// Install the global subscriber. Returns the file writer guard, which must
/// live as long as the process when file logging is enabled.
pub fn init_logger() -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_FILTER.into());

    match std::env::var(LOG_DIR_VAR).ok().filter(|d| !d.is_empty()) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "gemini-rag.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
            None
        }
    }
}

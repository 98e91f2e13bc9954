//! Logging setup for the server process

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

const LOG_FILE_NAME: &str = "switchyard.log";

/// Parse log level from config string
pub fn parse_log_level(level: &str) -> tracing::Level {
  match level.to_lowercase().as_str() {
    "off" | "error" => tracing::Level::ERROR,
    "warn" => tracing::Level::WARN,
    "info" => tracing::Level::INFO,
    "debug" => tracing::Level::DEBUG,
    "trace" => tracing::Level::TRACE,
    _ => tracing::Level::INFO,
  }
}

/// Install the global subscriber.
///
/// Logs go to stderr unless `log.directory` is set, in which case they go to
/// a rolling file there. stdout is never used since it may carry the
/// protocol stream. `RUST_LOG` overrides the configured level.
///
/// Returns the appender guard, which must be kept alive for the duration of
/// the program. Installing twice is a no-op.
pub fn init(config: &LogConfig) -> Option<WorkerGuard> {
  let level = parse_log_level(&config.level);
  let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

  let Some(dir) = &config.directory else {
    let _ = tracing_subscriber::fmt()
      .with_env_filter(env_filter)
      .with_target(true)
      .with_writer(std::io::stderr)
      .try_init();
    return None;
  };

  if let Err(e) = std::fs::create_dir_all(dir) {
    let _ = tracing_subscriber::fmt()
      .with_env_filter(env_filter)
      .with_writer(std::io::stderr)
      .try_init();
    tracing::warn!(dir = %dir.display(), error = %e, "Cannot create log directory, logging to stderr");
    return None;
  }

  let file_appender = match config.rotation.as_str() {
    "hourly" => tracing_appender::rolling::hourly(dir, LOG_FILE_NAME),
    "never" => tracing_appender::rolling::never(dir, LOG_FILE_NAME),
    _ => tracing_appender::rolling::daily(dir, LOG_FILE_NAME),
  };
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  let _ = tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_target(true)
    .with_ansi(false)
    .with_writer(file_writer)
    .try_init();

  Some(guard)
}

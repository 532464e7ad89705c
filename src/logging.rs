use color_eyre::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config;

/// Install a file-backed tracing subscriber.
///
/// Logs go to `<data_dir>/logs/zorg.log.<date>` rather than the terminal,
/// which belongs to the UI. The filter is read from `ZORG_LOG` and defaults
/// to `info`. Keep the returned guard alive until exit or buffered lines
/// are lost.
pub fn init() -> Result<WorkerGuard> {
  let dir = config::data_dir()?.join("logs");
  std::fs::create_dir_all(&dir)?;

  let appender = tracing_appender::rolling::daily(dir, "zorg.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_env("ZORG_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

  fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .try_init()
    .map_err(|e| color_eyre::eyre::eyre!("Failed to install log subscriber: {}", e))?;

  Ok(guard)
}

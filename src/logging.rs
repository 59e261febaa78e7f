//! Logging configuration with journald support on Linux.
//!
//! Logs go to the systemd journal when it is reachable and enabled, otherwise
//! to a daily rolling file.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Environment variable holding `EnvFilter` directives.
pub const LOG_ENV: &str = "PHOTOMAP_LOG";

/// Initialize the logging system.
///
/// `PHOTOMAP_LOG` takes precedence over the configured level, using
/// `EnvFilter` syntax (`debug`, `photomap::scanner=trace`, ...).
pub fn init(config: &LoggingConfig) -> Result<()> {
    let env_filter = env_filter(std::env::var(LOG_ENV).ok().as_deref(), &config.level);

    #[cfg(target_os = "linux")]
    {
        if config.journald {
            if let Ok(journald_layer) = tracing_journald::layer() {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(journald_layer.with_syslog_identifier("photomap".to_string()))
                    .try_init()?;

                tracing::info!("Logging initialized with journald backend");
                return Ok(());
            }
        }
    }

    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "photomap.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the writer alive for the lifetime of the process
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init()?;

    tracing::info!("Logging initialized with file backend at {:?}", log_dir);
    Ok(())
}

/// Directives from the environment if they parse, then the configured level,
/// then `info`.
fn env_filter(from_env: Option<&str>, level: &str) -> EnvFilter {
    from_env
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

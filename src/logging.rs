//! Logging setup with journald support on Linux.
//!
//! Events go to systemd's journal when it is reachable, otherwise to a
//! daily-rolling file under the given log directory.
//!
//! Verbosity comes from the `SENSOR_GALLERY_LOG` environment variable
//! (`debug`, `info`, `warn`, `error`; default `info`).

use anyhow::Result;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize the global subscriber. Calling it again is a no-op.
pub fn init(log_dir: Option<PathBuf>) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_env("SENSOR_GALLERY_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    #[cfg(target_os = "linux")]
    {
        if let Ok(journald_layer) = tracing_journald::layer() {
            if tracing_subscriber::registry()
                .with(env_filter)
                .with(journald_layer)
                .try_init()
                .is_ok()
            {
                tracing::info!("Logging initialized with journald backend");
            }
            return Ok(());
        }
    }

    let log_dir = log_dir.unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sensor-gallery")
            .join("logs")
    });

    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "sensor-gallery.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let initialized = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init()
        .is_ok();

    if initialized {
        let _ = GUARD.set(guard);
        tracing::info!("Logging initialized with file backend at {:?}", log_dir);
    }
    Ok(())
}

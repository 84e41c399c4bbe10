use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

static INIT: OnceCell<()> = OnceCell::new();

/// Installs the global fmt subscriber once; later calls are no-ops.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LogConfig) {
    INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(config.with_target)
            .try_init();
    });
}

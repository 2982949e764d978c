use std::sync::Once;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT_LOGGING: Once = Once::new();

/// Installs the global `tracing` subscriber. `RUST_LOG` wins; otherwise
/// `GRIDCOPILOT_LOG_LEVEL`, then `info`. Safe to call more than once.
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| {
                EnvFilter::try_new(
                    std::env::var("GRIDCOPILOT_LOG_LEVEL").unwrap_or_else(|_| "info".into()),
                )
            })
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let stdout_layer = fmt::layer().with_target(true);

        if tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .try_init()
            .is_err()
        {
            eprintln!("[gridcopilot][WARN] a global tracing subscriber was already installed");
        }
    });
}

// Tracing initialisation for embedders that do not install their own subscriber

use tracing_subscriber::EnvFilter;

/// Install a formatting subscriber. `RUST_LOG` wins over `default_filter`.
/// Calling this more than once, or after another subscriber was set, is a
/// no-op.
pub fn init(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .try_init();
}

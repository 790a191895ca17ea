//! Tracing subscriber setup for applications embedding WebFS.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install a stderr subscriber filtered by `RUST_LOG` (default `info`).
///
/// Returns false if a global subscriber was already installed, so it is
/// safe to call from every test.
pub fn init() -> bool {
    init_with_default("info")
}

/// Like [`init`], with a fallback filter directive such as `webfs=debug`.
pub fn init_with_default(directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .is_ok()
}

//! Tracing subscriber setup
//!
//! Console-only `tracing_subscriber` init (`EnvFilter` + `fmt::layer()`),
//! deliberately plain rather than wiring up a full OpenTelemetry stack.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a global tracing subscriber. `RUST_LOG` wins when set; otherwise
/// every span and event at `default_level` or above is printed.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init();
}

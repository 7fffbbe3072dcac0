//! Logging initialization for the CLI.
//!
//! Logging is owned by the CLI crate; the core crate only emits `tracing`
//! events.

use npmlocal_core::Config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber.
///
/// The level comes from [`Config::log_level`]; `config.json` switches to JSON
/// lines on stderr. `RUST_LOG` is honored, the flags override its level.
pub fn init(config: &Config) {
    let level = config.log_level();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"))
        .add_directive(level.into());

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

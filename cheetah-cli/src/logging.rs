//! Logging bootstrap.
//!
//! - `CHEETAH_LOG` - an `EnvFilter` directive (default: `info`)
//! - `CHEETAH_LOG_FORMAT=json|compact` - output format (default: compact)

use std::env;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Environment variable holding the filter directive.
pub const LOG_ENV: &str = "CHEETAH_LOG";

/// Environment variable selecting the output format.
pub const LOG_FORMAT_ENV: &str = "CHEETAH_LOG_FORMAT";

/// Initialize the global subscriber. Logs go to stderr.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    let result = match env::var(LOG_FORMAT_ENV).as_deref() {
        Ok("json") => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        _ => registry
            .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("Global subscriber already set");
    }
}

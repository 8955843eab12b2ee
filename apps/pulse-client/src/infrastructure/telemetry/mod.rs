//! Logging Setup
//!
//! Console logging through `tracing-subscriber`. The filter is `RUST_LOG`
//! merged with the crate defaults below.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Directives applied on top of `RUST_LOG`.
const DEFAULT_DIRECTIVES: [&str; 5] = [
    "pulse_client=info",
    "pulse_protocol=info",
    "hyper=warn",
    "reqwest=warn",
    "tungstenite=warn",
];

/// Install the global subscriber.
///
/// Returns `false` if a subscriber was already installed.
pub fn init() -> bool {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer)
        .try_init()
        .is_ok()
}

/// `RUST_LOG` merged with the crate defaults.
fn env_filter() -> EnvFilter {
    DEFAULT_DIRECTIVES
        .iter()
        .filter_map(|directive| directive.parse().ok())
        .fold(EnvFilter::from_default_env(), EnvFilter::add_directive)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directives_parse() {
        for directive in DEFAULT_DIRECTIVES {
            assert!(directive.parse::<tracing_subscriber::filter::Directive>().is_ok());
        }
    }

    #[test]
    fn second_init_reports_existing_subscriber() {
        init();
        assert!(!init());
    }
}

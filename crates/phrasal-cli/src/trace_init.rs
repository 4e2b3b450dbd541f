use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

const DEFAULT_FILTER: &str = "phrasal=info";

/// Install the global subscriber. Events go to stderr so stdout carries
/// only translations. `RUST_LOG` overrides the default filter.
pub fn init_tracing(json: bool) {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let builder = tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_env_filter(filter);
        if json {
            builder
                .json()
                .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
                .init();
        } else {
            builder.init();
        }
    });
}

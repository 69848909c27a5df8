// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod config;
pub mod ingest;
pub mod metrics;
pub mod notice;
pub mod notify;
pub mod poller;
pub mod sanitize;
pub mod scheduler;
pub mod seen;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::config::Config;
pub use crate::ingest::types::SourceAdapter;
pub use crate::notice::{IdKind, Notice};
pub use crate::notify::{DeliveryReport, Transport};
pub use crate::poller::{CycleReport, PollOutcome, Poller, PollerSettings};
pub use crate::seen::{SeenSet, SeenStore};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the tracing subscriber. `RUST_LOG` overrides the default
/// filter; `LOG_FORMAT=json` switches to JSON lines. A subscriber that is
/// already installed (e.g. by the hosting runtime) is left in place.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("notam_relay=info,pager=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

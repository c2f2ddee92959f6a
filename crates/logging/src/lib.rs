//! Structured logging init (§4.L): `tracing` + `tracing-subscriber`'s
//! `EnvFilter`, honoring `RUST_LOG` with a default that's quiet for
//! dependencies but verbose for this workspace's own crates.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global `tracing` subscriber. Call once, at process start.
///
/// Without `RUST_LOG` set, logs at `info` for everything and `debug` for
/// crates in this workspace (`duskmesh=debug`), matching the per-message
/// handling path staying at `trace` so it never fires by default.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,duskmesh=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

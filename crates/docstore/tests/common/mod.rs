//! Test infrastructure for the document store.
//!
//! Harness makers for every backend, plus logging setup shared by the
//! integration tests.

#![allow(dead_code)]

pub mod fixtures;
pub mod harness;

pub use fixtures::*;
pub use harness::*;

use std::sync::Once;

static TRACING: Once = Once::new();

/// Installs a test log subscriber once per test binary. `RUST_LOG`
/// overrides the default filter.
pub fn init_tracing() {
    TRACING.call_once(|| {
        use tracing_subscriber::{EnvFilter, fmt};

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("helios_docstore=debug"));
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

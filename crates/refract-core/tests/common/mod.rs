//! Shared helpers for the integration tests

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Route engine logs through the test writer
///
/// Enable with `RUST_LOG=refract_core=debug`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_test_writer().with_target(true))
                .with(EnvFilter::from_default_env())
                .try_init();
        }
    });
}

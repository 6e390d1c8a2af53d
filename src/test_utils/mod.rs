//! Test utilities for cbscan
//!
//! This module provides helpers shared by unit tests and the integration
//! suite:
//! - [`init_test_logging`] installs a once-guarded tracing subscriber
//! - [`FakeRunner`] stands in for `chef` / `berks` so strategies run without
//!   real binaries
//! - [`CookbookFixture`] writes cookbook trees into a temporary directory
//!
//! # Example
//!
//! ```rust,no_run
//! use cbscan_cli::test_utils::CookbookFixture;
//!
//! let fixture = CookbookFixture::new().unwrap();
//! fixture.cookbook("web").unwrap();
//! fixture.recipe("web", "default", "include_recipe 'cache::default'\n").unwrap();
//! ```

pub mod fake_runner;
pub mod fixtures;

pub use fake_runner::FakeRunner;
pub use fixtures::CookbookFixture;

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. With `level` set, that level is used;
/// otherwise `RUST_LOG` is honored, and without either nothing is installed.
///
/// ```bash
/// RUST_LOG=cbscan_cli=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

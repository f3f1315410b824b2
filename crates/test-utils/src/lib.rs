//! Fakes and builders shared by the integration tests.
//!
//! - [`FakeJobRunner`]: scripted job outcomes plus an invocation log.
//! - [`RecordingClusterProvider`]: remembers which clusters were stopped.
//! - [`FlakyMarkerStore`]: injects transient storage failures.
//! - [`builders`]: fluent construction of pipeline configs.

pub mod builders;
pub mod fake_cluster;
pub mod fake_runner;
pub mod flaky_store;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{fmt, EnvFilter};

use batchdag::logging::LOG_ENV;

pub use fake_cluster::RecordingClusterProvider;
pub use fake_runner::FakeJobRunner;
pub use flaky_store::FlakyMarkerStore;

/// How long [`with_timeout`] waits before failing a test.
pub const TEST_DEADLINE: Duration = Duration::from_secs(5);

static INIT: Once = Once::new();

/// Install a test-captured subscriber once per test binary.
///
/// The filter is read from `BATCHDAG_LOG`, then `RUST_LOG`, and defaults to
/// `info`. Output only shows for failing tests unless run with
/// `-- --nocapture`.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Await `f`, panicking if it takes longer than [`TEST_DEADLINE`].
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(TEST_DEADLINE, f).await {
        Ok(value) => value,
        Err(_) => panic!("test did not finish within {TEST_DEADLINE:?}"),
    }
}

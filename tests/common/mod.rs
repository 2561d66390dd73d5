//! Shared test infrastructure for e2e tests.
//!
//! Each test gets an isolated server instance on a random port with its own
//! temp directories for the event database and the plugin rendezvous files.

pub mod server;
pub mod upstream_stub;

/// Timeout for the server to start answering /health.
pub const SERVER_READY_TIMEOUT_MS: u64 = 5_000;

/// Poll interval while waiting for readiness.
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 25;

/// Watcher poll period used in tests (production default is 5s).
pub const TEST_WATCHER_POLL_MS: u64 = 100;

/// How long hot-reload assertions wait before giving up. A rendezvous write
/// must be visible within ten seconds.
pub const HOT_RELOAD_TIMEOUT_MS: u64 = 10_000;

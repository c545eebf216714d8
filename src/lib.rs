//! Building blocks for the `lb-probe` binary: scenario configuration,
//! the HTTP client wrapper, the virtual-user executor, and run metrics.
//! The binary is the user-facing surface; these modules exist so the
//! executor can be driven directly from integration tests.
pub mod client;
pub mod executor;
pub mod models;
pub mod utils;

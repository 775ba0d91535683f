//! Sideload server library.
//!
//! This library exposes the server components for use in integration tests.

pub mod middleware;
pub mod routes;
pub mod state;
pub mod worker;

pub use routes::router;
pub use state::{AppState, ServerConfig};
pub use worker::{SweeperHandle, start_retention_sweeper};

// Re-export sideload_core for convenience
pub use sideload_core;

// Test utilities are available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

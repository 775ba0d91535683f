//! Sideload Core Library
//!
//! Credential storage, signing pipeline, package inspection and retention
//! logic for the Sideload over-the-air re-signing service.

pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod manifest;
pub mod metadata;
pub mod pipeline;
pub mod retention;
pub mod vault;

// Test helpers are available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use error::{Result, SideloadError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

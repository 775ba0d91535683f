//! HTTP middleware.

pub mod identity;

pub use identity::{IDENTITY_COOKIE, assign_identity};

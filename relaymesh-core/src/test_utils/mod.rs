//! Test utilities and helpers for relaymesh
//!
//! Fixtures and async helpers shared by unit tests, integration tests and
//! benchmarks.

pub mod async_helpers;
pub mod fixtures;

pub use async_helpers::*;
pub use fixtures::*;

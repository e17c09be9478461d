//! Common utilities for usbtree
//!
//! This crate provides functionality shared by the host library and its
//! binary: application-level error handling, tracing setup, and a scriptable
//! mock USB transport for tests.

pub mod error;
pub mod logging;
pub mod test_utils;

pub use error::{Error, Result};
pub use logging::setup_logging;

//! Utility functions and types.
//!
//! This module provides various utility functions and types that are used
//! throughout the CTR tooling.

pub mod logging;

pub use logging::{init_test_tracing, init_tracing, LogLevel};

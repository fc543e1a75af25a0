//! The core module holds the error type and renderer configuration.

pub mod config;
pub mod error;

//! Shared utilities for stockpile.
//!
//! This crate provides common utilities used across the stockpile workspace:
//! - Logging setup with tracing
//! - Platform directories for configuration, data and logs

pub mod log;
pub mod path;

pub use log::{LogConfig, LogLevel};

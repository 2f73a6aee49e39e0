//! # Core Module
//!
//! Configuration and error handling shared by every feature.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Add DebateError taxonomy
//! - 1.0.0: Initial creation with config module

pub mod config;
pub mod error;

pub use config::{Config, Provider};
pub use error::DebateError;

//! ldmcompat Common - Shared types and utilities
//!
//! This crate provides the error type, configuration and constants
//! shared by the kernel emulation layer and the command line front end.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;

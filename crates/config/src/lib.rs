//! Configuration module for the H.265 batch transcoder
//!
//! Handles loading configuration from TOML files, environment variable overrides,
//! and validation of run parameters.

pub mod config;

pub use config::*;

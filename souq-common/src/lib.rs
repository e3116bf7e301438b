//! Souq Common - Shared configuration, errors, and logging for the Souq services.
//!
//! This crate provides:
//! - Configuration types and loading
//! - The unified error type used across Souq services
//! - Logging setup and structured logging helpers

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::{Config, ConfirmationConfig, GatewayConfig, LocaleConfig, ObservabilityConfig};
pub use error::{Error, Result};

//! Cairn Common - Shared types and utilities
//!
//! This crate provides the error taxonomy, configuration structures and
//! record types used across all Cairn components.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;

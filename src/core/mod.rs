//! Core types for the warden
//!
//! This module provides the fundamental types used throughout the crate:
//! - `WardenError` / `WardenResult` - Error types
//! - `ValidationError` / `SecurityError` - Input-rejection taxonomy

pub mod error;

pub use error::{SecurityError, ValidationError, WardenError, WardenResult};

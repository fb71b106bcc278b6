//! Error Types
//!
//! This module defines the error types used throughout the compiler.
//!
//! # Overview
//!
//! The main error type [`PrismError`] covers every failure mode of variant
//! compilation:
//! - Resource/memory exhaustion while uploading binaries
//! - Code-generation backend rejections (main parts, prologs, epilogs)
//! - Link-time violations of the part-composition rules
//! - Register usage that exceeds what the hardware can run
//! - Device or selector configuration that cannot be honoured
//!
//! # Usage
//!
//! All fallible APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, PrismError>`.
//!
//! ```rust,ignore
//! use prism_core::errors::{PrismError, Result};
//!
//! fn build() -> Result<()> {
//!     Err(PrismError::compile("fragment epilog", "unsupported export format"))
//! }
//! ```

use std::any::Any;

use thiserror::Error;

use crate::stage::ShaderStage;

/// The main error type for shader variant compilation.
///
/// Errors are `Clone` because a single build outcome is published through a
/// completion fence and observed by every waiter of that variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrismError {
    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// Device memory or another finite resource was exhausted.
    #[error("Allocation failed for {what} ({requested} bytes)")]
    Allocation {
        /// What was being allocated
        what: String,
        /// Requested size in bytes
        requested: usize,
    },

    // ========================================================================
    // Compilation Errors
    // ========================================================================
    /// The code-generation backend rejected the IR or a shader part.
    #[error("Failed to compile {part}: {message}")]
    Compile {
        /// Which part failed (`"main"`, `"vertex prolog"`, ...)
        part: String,
        /// Backend-provided message
        message: String,
    },

    /// Parts could not be composed into one binary.
    #[error("Link error: {0}")]
    Link(String),

    /// Final register usage exceeds the hardware per-invocation budget.
    ///
    /// This is an unrecoverable configuration error, see [`PrismError::is_fatal`].
    #[error("{stage:?} shader uses {used} {resource}, the hardware limit is {limit}")]
    ResourceLimit {
        stage: ShaderStage,
        resource: &'static str,
        used: u32,
        limit: u32,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Settings or shader info rejected at device or selector creation.
    #[error("Invalid configuration: {0}")]
    Config(String),

    // ========================================================================
    // Pipeline Errors
    // ========================================================================
    /// A job was submitted after the compile pipeline was shut down.
    #[error("Compile pipeline has been shut down")]
    Shutdown,
}

impl PrismError {
    /// Shorthand for [`PrismError::Compile`].
    pub fn compile(part: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Compile {
            part: part.into(),
            message: message.into(),
        }
    }

    /// [`PrismError::Compile`] for a part whose build panicked.
    pub fn from_panic(part: impl Into<String>, payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_owned());
        Self::compile(part, format!("panicked: {message}"))
    }

    /// Shorthand for [`PrismError::Allocation`].
    pub fn allocation(what: impl Into<String>, requested: usize) -> Self {
        Self::Allocation {
            what: what.into(),
            requested,
        }
    }

    /// Whether the error cannot be recovered by degrading a single draw.
    ///
    /// Only [`PrismError::ResourceLimit`] is fatal.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ResourceLimit { .. })
    }
}

/// Alias for `Result<T, PrismError>`.
pub type Result<T> = std::result::Result<T, PrismError>;

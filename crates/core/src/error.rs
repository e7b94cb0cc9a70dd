// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Structured error types for FrameBridge.
//!
//! Every failure in the bridge belongs to one of two classes: errors that abort
//! the construction of a graph node, and errors that abort a single frame
//! computation. [`BridgeError::class`] reports which one a given error is, so
//! the host can decide whether to fail node creation or just the frame request.

use thiserror::Error;

/// Which part of a node's lifecycle an error aborts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Aborts graph-node construction; reported to whoever requested the node.
    Construction,
    /// Aborts one frame computation; surfaced as a failed frame request.
    Runtime,
    /// A violated locking contract. Never recoverable.
    Fatal,
}

/// Main error type for FrameBridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Filter construction failed.
    ///
    /// Examples:
    /// - The legacy constructor called its fatal error hook
    /// - The constructor returned something that is not a clip
    /// - The requested interface version is newer than the bridge supports
    #[error("Construction error: {0}")]
    Construction(String),

    /// A legacy filter aborted a frame computation.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// A pixel format has no counterpart on the other side of the bridge.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A function name was registered twice with different descriptors.
    #[error("Function '{0}' is already registered")]
    DuplicateRegistration(String),

    /// Arguments did not match a function's argument specification.
    ///
    /// Examples:
    /// - A required argument is missing
    /// - Too many positional arguments
    /// - An argument has the wrong type
    #[error("Argument error: {0}")]
    Argument(String),

    /// More scopes were popped than pushed.
    #[error("Scope underflow: pop without a matching push")]
    ScopeUnderflow,

    /// A variable is not bound in any visible scope.
    #[error("Variable '{0}' not found")]
    VariableNotFound(String),

    /// A frame index outside `0..num_frames` was requested.
    #[error("Frame {n} is out of range (clip has {num_frames} frames)")]
    FrameOutOfRange { n: i32, num_frames: i32 },

    /// The single-flight contract was broken, e.g. a thread tried to re-enter
    /// an environment it already holds, or a clip was pulled outside a call.
    #[error("Lock violation: {0}")]
    LockViolation(String),

    /// Invalid configuration file or value.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// I/O error (configuration files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Classifies this error according to what it aborts.
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Construction(_)
            | Self::UnsupportedFormat(_)
            | Self::DuplicateRegistration(_)
            | Self::Argument(_)
            | Self::Configuration(_)
            | Self::Io(_) => ErrorClass::Construction,
            Self::Runtime(_)
            | Self::ScopeUnderflow
            | Self::VariableNotFound(_)
            | Self::FrameOutOfRange { .. } => ErrorClass::Runtime,
            Self::LockViolation(_) => ErrorClass::Fatal,
        }
    }

    pub const fn is_fatal(&self) -> bool {
        matches!(self.class(), ErrorClass::Fatal)
    }
}

/// Convenience type alias for Results using `BridgeError`.
pub type Result<T> = std::result::Result<T, BridgeError>;

impl From<BridgeError> for String {
    fn from(err: BridgeError) -> Self {
        err.to_string()
    }
}

// Plain strings coming out of legacy code are treated as runtime failures.
impl From<String> for BridgeError {
    fn from(s: String) -> Self {
        Self::Runtime(s)
    }
}

impl From<&str> for BridgeError {
    fn from(s: &str) -> Self {
        Self::Runtime(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BridgeError::Construction("bad clip".to_string());
        assert_eq!(err.to_string(), "Construction error: bad clip");

        let err = BridgeError::FrameOutOfRange { n: 100, num_frames: 100 };
        assert_eq!(err.to_string(), "Frame 100 is out of range (clip has 100 frames)");
    }

    #[test]
    fn test_error_classes() {
        assert_eq!(BridgeError::DuplicateRegistration("Blur".into()).class(), ErrorClass::Construction);
        assert_eq!(BridgeError::Argument("missing".into()).class(), ErrorClass::Construction);
        assert_eq!(BridgeError::UnsupportedFormat("RGBS".into()).class(), ErrorClass::Construction);
        assert_eq!(BridgeError::ScopeUnderflow.class(), ErrorClass::Runtime);
        assert_eq!(BridgeError::VariableNotFound("x".into()).class(), ErrorClass::Runtime);
        assert!(BridgeError::LockViolation("reentrant".into()).is_fatal());
    }

    #[test]
    fn test_string_to_error_conversion() {
        let err: BridgeError = "Something went wrong".into();
        assert_eq!(err.to_string(), "Runtime error: Something went wrong");
        let s: String = err.into();
        assert_eq!(s, "Runtime error: Something went wrong");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "config.yaml");
        let err: BridgeError = io_err.into();
        assert!(err.to_string().contains("I/O error"));
        assert_eq!(err.class(), ErrorClass::Construction);
    }
}

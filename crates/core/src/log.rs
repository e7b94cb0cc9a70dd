// SPDX-FileCopyrightText: © 2025 FrameBridge Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The host's message sink.
//!
//! Messages are routed to `tracing`. A [`MessageType::Fatal`] message does not
//! terminate the process: it is logged at error level and handed back as a
//! [`BridgeError`] so the caller can abort whatever it was evaluating.

use crate::error::BridgeError;

/// Severity of a message sent to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Debug,
    Information,
    Warning,
    Critical,
    Fatal,
}

/// Logs `message` and, for fatal messages, returns the error to propagate.
///
/// Fatal messages become `BridgeError::Construction` when `constructing` is true
/// and `BridgeError::Runtime` otherwise.
pub fn log_message(kind: MessageType, message: &str, constructing: bool) -> Option<BridgeError> {
    match kind {
        MessageType::Debug => {
            tracing::debug!(target: "framebridge", "{}", message);
            None
        },
        MessageType::Information => {
            tracing::info!(target: "framebridge", "{}", message);
            None
        },
        MessageType::Warning => {
            tracing::warn!(target: "framebridge", "{}", message);
            None
        },
        MessageType::Critical => {
            tracing::error!(target: "framebridge", "{}", message);
            None
        },
        MessageType::Fatal => {
            tracing::error!(target: "framebridge", fatal = true, "{}", message);
            Some(if constructing {
                BridgeError::Construction(message.to_string())
            } else {
                BridgeError::Runtime(message.to_string())
            })
        },
    }
}

/// Shorthand for a fatal message that always produces an error.
pub fn fatal(message: &str, constructing: bool) -> BridgeError {
    log_message(MessageType::Fatal, message, constructing)
        .unwrap_or_else(|| BridgeError::Runtime(message.to_string()))
}

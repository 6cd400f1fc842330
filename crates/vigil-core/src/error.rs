// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for vigil-core.
//!
//! Every variant carries a stable error code so the transport layer can map
//! it to a status without matching on message text.

use std::fmt;

/// Result type using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors surfaced by the instance registry and request validation.
///
/// None of these are fatal to the process: they are reported to the caller
/// and leave every live instance untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CoreError {
    /// No live instance has this ID.
    InstanceNotFound {
        /// The instance ID that was not found.
        instance_id: String,
    },

    /// A live instance already owns this ID.
    InstanceAlreadyExists {
        /// The instance ID that already exists.
        instance_id: String,
    },

    /// The instance was started without an early-termination gate.
    EarlyTerminationUnsupported {
        /// The instance ID.
        instance_id: String,
    },

    /// Input validation failed at the boundary.
    ValidationError {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// A payload could not be serialized.
    SerializationError {
        /// Error details.
        details: String,
    },
}

impl CoreError {
    /// Shorthand for a [`CoreError::InstanceNotFound`].
    pub fn not_found(instance_id: impl Into<String>) -> Self {
        Self::InstanceNotFound {
            instance_id: instance_id.into(),
        }
    }

    /// Shorthand for a [`CoreError::ValidationError`].
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InstanceNotFound { .. } => "INSTANCE_NOT_FOUND",
            Self::InstanceAlreadyExists { .. } => "INSTANCE_ALREADY_EXISTS",
            Self::EarlyTerminationUnsupported { .. } => "EARLY_TERMINATION_UNSUPPORTED",
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::SerializationError { .. } => "SERIALIZATION_ERROR",
        }
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InstanceNotFound { instance_id } => {
                write!(f, "Instance '{}' not found", instance_id)
            }
            Self::InstanceAlreadyExists { instance_id } => {
                write!(f, "Instance '{}' already exists", instance_id)
            }
            Self::EarlyTerminationUnsupported { instance_id } => {
                write!(
                    f,
                    "Instance '{}' does not accept early termination",
                    instance_id
                )
            }
            Self::ValidationError { field, message } => {
                write!(f, "Validation error for '{}': {}", field, message)
            }
            Self::SerializationError { details } => {
                write!(f, "Serialization error: {}", details)
            }
        }
    }
}

impl std::error::Error for CoreError {}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError {
            details: err.to_string(),
        }
    }
}

//! Error types for the VpnGw operator

use thiserror::Error;

/// Default context value when no specific gateway is known
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for VpnGw operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The declared VpnGw spec is invalid
    #[error("validation error for {gw}: {message}")]
    Validation {
        /// `namespace/name` of the offending VpnGw
        gw: String,
        /// Spec field that failed validation (e.g., "spec.ovpnCipher")
        field: Option<String>,
        /// Description of what's invalid
        message: String,
    },

    /// Convergence failed transiently and should be redelivered
    #[error("reconcile of {gw} failed, retry requested")]
    Retry {
        /// `namespace/name` of the VpnGw to retry
        gw: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Where the error occurred (e.g., "synthesizer", "store")
        context: String,
    },
}

impl Error {
    /// Create a validation error without gateway context
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            gw: UNKNOWN_CONTEXT.to_string(),
            field: None,
            message: msg.into(),
        }
    }

    /// Create a validation error naming the gateway and offending field
    pub fn validation_for_field(
        gw: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            gw: gw.into(),
            field: Some(field.into()),
            message: msg.into(),
        }
    }

    /// Create the retry signal for a gateway
    pub fn retry(gw: impl Into<String>) -> Self {
        Self::Retry { gw: gw.into() }
    }

    /// Create an internal error with context
    pub fn internal(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Returns true if the caller should redeliver the reconcile request
    ///
    /// Validation errors need a spec change and are never retried on a timer.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Kube(_) | Self::Retry { .. } => true,
            Self::Validation { .. } | Self::Serialization(_) | Self::Internal { .. } => false,
        }
    }

    /// The offending spec field, if this is a validation error that names one
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => field.as_deref(),
            _ => None,
        }
    }
}

//! Error types for pool construction and checkout
use std::time::Duration;

use thiserror::Error;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error carried as the `source` of pool errors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for every fallible pool operation
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration could not be read or failed validation
    #[error("Configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
        /// The underlying error (I/O, number parsing)
        #[source]
        source: Option<BoxError>,
    },

    /// The connector failed to open a connection
    #[error("Failed to connect to '{endpoint}': {reason}")]
    Connect {
        /// The endpoint that was dialed
        endpoint: String,
        /// The failure reason
        reason: String,
        /// The underlying error
        #[source]
        source: Option<BoxError>,
    },

    /// No connection became available within the acquire timeout
    #[error("Timed out after {}ms waiting for an idle connection", timeout.as_millis())]
    AcquireTimeout {
        /// The configured acquire timeout
        timeout: Duration,
    },

    /// Lazily initialized pool whose initialization failed
    #[error("Pool is not ready: {reason}")]
    NotReady {
        /// Why initialization failed
        reason: String,
    },

    /// The pool has been shut down
    #[error("Pool has been shut down")]
    ShutDown,

    /// Internal bookkeeping went out of sync
    #[error("Pool invariant violated: {message}")]
    InvariantViolation {
        /// What was observed
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error wrapping an underlying cause
    pub fn configuration_with<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: Into<BoxError>,
    {
        Self::Configuration {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a connect error
    pub fn connect<E, R>(endpoint: E, reason: R) -> Self
    where
        E: ToString,
        R: Into<String>,
    {
        Self::Connect {
            endpoint: endpoint.to_string(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a connect error wrapping the transport error
    pub fn connect_with<E, S>(endpoint: E, source: S) -> Self
    where
        E: ToString,
        S: Into<BoxError>,
    {
        let source = source.into();
        Self::Connect {
            endpoint: endpoint.to_string(),
            reason: source.to_string(),
            source: Some(source),
        }
    }

    pub(crate) fn invariant<S: Into<String>>(message: S) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Check if retrying the same operation later may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AcquireTimeout { .. } | Self::Connect { .. })
    }
}

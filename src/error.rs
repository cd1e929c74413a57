//! Error types and handling for the `badevand` core

use thiserror::Error;

use crate::clustering::ClusterError;
use crate::fetch::FetchError;
use crate::scrape::HostError;

/// Main error type for the acquisition and clustering core
#[derive(Error, Debug)]
pub enum BadevandError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Direct fetch against the data endpoint failed
    #[error("Fetch error: {source}")]
    Fetch {
        #[from]
        source: FetchError,
    },

    /// Embedded browser host errors
    #[error("Browser error: {source}")]
    Browser {
        #[from]
        source: HostError,
    },

    /// Cache operation errors
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// Spatial index errors
    #[error("Cluster error: {source}")]
    Cluster {
        #[from]
        source: ClusterError,
    },

    /// I/O operation errors
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl BadevandError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new cache error
    pub fn cache<S: Into<String>>(message: S) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Whether the UI should offer a retry for this error
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BadevandError::Fetch { .. } | BadevandError::Browser { .. } | BadevandError::Cache { .. }
        )
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            BadevandError::Config { .. } => {
                "Configuration error. Please check your config file.".to_string()
            }
            BadevandError::Fetch { .. } => {
                "Unable to reach badevand.dk. Please check your internet connection.".to_string()
            }
            BadevandError::Browser { source } => {
                format!("The beach data page failed to load: {source}")
            }
            BadevandError::Cache { .. } => {
                "Stored beach data could not be read. Pull to refresh.".to_string()
            }
            BadevandError::Cluster { .. } => "Map markers could not be computed.".to_string(),
            BadevandError::Io { .. } => {
                "File operation failed. Please check file permissions.".to_string()
            }
        }
    }
}

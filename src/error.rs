//! Error types for tagmesh

use thiserror::Error;

/// Result type for bootstrap operations
pub type BootstrapResult<T> = Result<T, BootstrapError>;

/// Main error type for bootstrap operations
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// The cloud inventory could not be queried
    #[error("Inventory query failed: {0}")]
    InventoryQueryFailed(#[from] InventoryError),

    /// A cluster name resolved but no instance carries it
    #[error("Unable to configure cluster '{cluster}': cluster membership is empty")]
    EmptyMembership { cluster: String },

    /// The clustering runtime reported a failed join
    #[error("{}", join_failure_message(.cause))]
    JoinFailed { cause: Option<String> },

    /// The clustering runtime is not running or has been shut down
    #[error("Cluster runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The report endpoint could not be served
    #[error("HTTP server error: {0}")]
    Serve(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn join_failure_message(cause: &Option<String>) -> String {
    match cause {
        Some(cause) => format!("Unable to initialize cluster: {}", cause),
        None => "Unable to initialize cluster for unknown reason".to_string(),
    }
}

impl BootstrapError {
    /// Join failure carrying the runtime's cause
    pub fn join_failed(cause: impl Into<String>) -> Self {
        BootstrapError::JoinFailed {
            cause: Some(cause.into()),
        }
    }
}

/// Inventory API errors
#[derive(Error, Debug)]
pub enum InventoryError {
    /// Transport-level failure talking to the inventory endpoint
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The inventory endpoint answered with a non-success status
    #[error("Inventory endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body could not be decoded
    #[error("Malformed inventory response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Local inventory file could not be read
    #[error("Inventory file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for the expected schema
    #[error("Cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range or inconsistent
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_failure_messages() {
        let unknown = BootstrapError::JoinFailed { cause: None };
        assert_eq!(
            unknown.to_string(),
            "Unable to initialize cluster for unknown reason"
        );

        let with_cause = BootstrapError::join_failed("Address already in use");
        assert!(with_cause.to_string().contains("Address already in use"));
    }

    #[test]
    fn test_inventory_error_is_distinct_from_empty_membership() {
        let failed: BootstrapError = InventoryError::Status {
            status: 503,
            body: "throttled".to_string(),
        }
        .into();
        assert!(matches!(failed, BootstrapError::InventoryQueryFailed(_)));

        let empty = BootstrapError::EmptyMembership {
            cluster: "prod".to_string(),
        };
        assert!(empty.to_string().contains("prod"));
    }
}

//! vCenter client errors

use thiserror::Error;

/// Errors that can occur when talking to the vCenter inventory
#[derive(Debug, Error)]
pub enum InventoryError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// vCenter returned an unexpected status or payload
    #[error("vCenter API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Login rejected or session could not be (re)established
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Endpoint URL could not be used
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

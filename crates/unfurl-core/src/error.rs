//! Error types for unfurl-core
//!
//! Errors are cloneable: a single in-flight request can fail for several
//! waiters at once, and each of them receives its own copy of the failure.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for unfurl operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    // ===================
    // Config Errors
    // ===================
    #[error("No tenant registered for domain: {domain}")]
    TenantNotFound { domain: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Failed to read config file: {path}: {message}")]
    ConfigRead { path: PathBuf, message: String },

    #[error("Failed to parse config file {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    // ===================
    // Transport Errors
    // ===================
    #[error("Request to {domain}{resource_path} failed: {message}")]
    Http {
        domain: String,
        resource_path: String,
        message: String,
    },

    #[error("Request to {domain}{resource_path} returned HTTP {status}")]
    Status {
        domain: String,
        resource_path: String,
        status: u16,
    },

    // ===================
    // Parse Errors
    // ===================
    #[error("Response from {domain}{resource_path} is not valid JSON: {message}")]
    JsonParse {
        domain: String,
        resource_path: String,
        message: String,
    },

    #[error("Payload for {key} does not match the {schema} schema: {message}")]
    Schema {
        key: String,
        schema: &'static str,
        message: String,
    },

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl CoreError {
    /// True for errors raised before any I/O because the link's domain is not configured
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            CoreError::TenantNotFound { .. }
                | CoreError::InvalidConfig { .. }
                | CoreError::ConfigRead { .. }
                | CoreError::ConfigParse { .. }
        )
    }

    /// True for network or response-decoding failures
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            CoreError::Http { .. } | CoreError::Status { .. } | CoreError::JsonParse { .. }
        )
    }
}

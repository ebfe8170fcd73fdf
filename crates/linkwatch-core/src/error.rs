//! Error types for the stability supervisor
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for supervisor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the stability supervisor
#[derive(Error, Debug)]
pub enum Error {
    /// The connectivity probe could not run at all
    #[error("Probe error: {0}")]
    Probe(String),

    /// Link record store errors
    #[error("Link store error: {0}")]
    LinkStore(String),

    /// Topology lookup errors
    #[error("Topology error: {0}")]
    Topology(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Record or interface not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// I/O errors (sysfs, sockets, files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The supervisor owning a channel has gone away
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

impl Error {
    /// Create a probe error
    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }

    /// Create a link store error
    pub fn link_store(msg: impl Into<String>) -> Self {
        Self::LinkStore(msg.into())
    }

    /// Create a topology error
    pub fn topology(msg: impl Into<String>) -> Self {
        Self::Topology(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a channel closed error
    pub fn channel_closed(msg: impl Into<String>) -> Self {
        Self::ChannelClosed(msg.into())
    }
}

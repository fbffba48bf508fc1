//! Error types for the publisher daemon.

use thiserror::Error;

/// Errors raised by the advertisement publisher.
#[derive(Debug, Error)]
pub enum PublisherError {
    /// The mDNS protocol engine could not be started.
    #[error("Failed to initialize mDNS daemon: {0}")]
    Init(String),

    /// The engine refused to announce a record.
    #[error("Failed to announce '{hostname}': {reason}")]
    Announce { hostname: String, reason: String },

    /// The engine refused to withdraw a record.
    #[error("Failed to withdraw '{hostname}': {reason}")]
    Withdraw { hostname: String, reason: String },

    /// The publisher has already been closed.
    #[error("mDNS publisher is closed")]
    Closed,
}

/// Errors raised while talking to the container runtime.
///
/// Every variant is a transport failure from the supervisor's point of view:
/// it tears the connection down and retries.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to connect to container runtime: {0}")]
    Connect(String),

    #[error("Container runtime transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Docker(#[from] bollard::errors::Error),
}

//! Error types for wgaccess

use crate::types::ProfileStatus;
use thiserror::Error;

/// Result type alias using wgaccess Error
pub type Result<T> = std::result::Result<T, Error>;

/// wgaccess error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("{0}")]
    Validation(String),

    #[error("VPN profile '{name}' not found")]
    ProfileNotFound { name: String },

    #[error("VPN profile '{name}' already exists")]
    DuplicateProfile { name: String },

    #[error("VPN profile '{name}' is already {status}")]
    AlreadyInState { name: String, status: ProfileStatus },

    #[error("Token {0} not found")]
    TokenNotFound(String),

    #[error("You already have a token: {0}")]
    AlreadyLinked(String),

    #[error("You don't have any token")]
    NoToken,

    #[error("A registered token with a positive balance is required")]
    TokenRequired,

    #[error("Artifact not found: {}", .0.display())]
    ArtifactMissing(std::path::PathBuf),

    #[error("Peer tool failed: {0}")]
    PeerCommand(String),

    #[error("Peer tool timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

//! Error types for the chat server
//!
//! Defines application-level errors and message send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

use crate::store::StoreError;

/// Application-level errors
///
/// Every variant can be reported to the acting user as an error envelope.
#[derive(Debug, Error)]
pub enum AppError {
    /// Transport upgrade failed, no session exists yet
    #[error("failed handshake, connection not established: {0}")]
    HandshakeFailed(String),

    /// Inbound frame could not be decoded
    #[error("invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// Reading a frame failed; the session ends after reporting it
    #[error("read error: {0}")]
    Read(String),

    /// Referenced user does not exist
    #[error("user not found")]
    UserNotFound,

    /// Referenced group does not exist
    #[error("group not found")]
    GroupNotFound,

    /// Acting user does not hold the admin role on the group
    #[error("user not group admin")]
    NotAdmin,

    /// Target user already belongs to the group
    #[error("user is already a group member")]
    AlreadyMember,

    /// Target user does not belong to the group
    #[error("user is not a group member")]
    NotMember,

    /// Creating the private chat and its first message failed
    #[error("error creating chat")]
    ChatCreationFailed,

    /// Storage collaborator failure
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl AppError {
    /// Status code carried in the error envelope for this error
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::HandshakeFailed(_)
            | AppError::InvalidMessageFormat(_)
            | AppError::Read(_) => 400,
            AppError::NotAdmin => 403,
            AppError::UserNotFound | AppError::GroupNotFound | AppError::NotMember => 404,
            AppError::AlreadyMember => 409,
            AppError::ChatCreationFailed | AppError::Storage(_) => 500,
        }
    }
}

/// Message send errors
///
/// Occurs when writing to a connection whose writer has shut down.
#[derive(Debug, Error)]
pub enum SendError {
    /// The connection has been closed
    #[error("connection closed")]
    ConnectionClosed,
}

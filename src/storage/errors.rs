use crate::models::Direction;
use thiserror::Error;
use uuid::Uuid;

/// Errors reported by storage providers
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Message unit not found: {internal_id}")]
    NotFound { internal_id: Uuid },

    #[error("Message unit already stored: {internal_id}")]
    AlreadyExists { internal_id: Uuid },

    #[error("Database error: {operation}: {message}")]
    Database { operation: String, message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Corrupt stored data for message unit {internal_id}: {reason}")]
    CorruptState { internal_id: Uuid, reason: String },
}

impl StorageError {
    pub fn not_found(internal_id: Uuid) -> Self {
        Self::NotFound { internal_id }
    }

    pub fn database(operation: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Database {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn serialization(message: impl std::fmt::Display) -> Self {
        Self::Serialization {
            message: message.to_string(),
        }
    }

    pub fn corrupt_state(internal_id: Uuid, reason: impl std::fmt::Display) -> Self {
        Self::CorruptState {
            internal_id,
            reason: reason.to_string(),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Errors of the message unit registry
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Storage failure: {0}")]
    StorageFailure(#[from] StorageError),

    #[error("Message unit {message_id} has direction {actual}, expected {expected}")]
    DirectionMismatch {
        message_id: String,
        expected: Direction,
        actual: Direction,
    },
}

pub type RegistryResult<T> = Result<T, RegistryError>;

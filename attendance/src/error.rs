//! Error types for check-in and attendance operations.

use crate::types::{EventId, UserId};
use thiserror::Error;

/// Result type alias for remote authority calls.
pub type Result<T> = std::result::Result<T, AuthorityError>;

/// Failures reported by the remote authority.
///
/// Every failure is scoped to one operation; none is fatal to a coordinator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthorityError {
    /// Network or server failure; the request may not have been processed.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// The caller's credential was missing, expired, or not accepted.
    #[error("Not authorized")]
    Unauthorized,

    /// The authority refused the request for a business reason.
    #[error("Rejected: {}", reason.as_deref().unwrap_or("no reason given"))]
    Rejected {
        /// Human-readable reason, shown verbatim when present
        reason: Option<String>,
    },

    /// The requested resource does not exist.
    #[error("Not found")]
    NotFound,
}

/// Failures of an optimistic RSVP mutation.
///
/// By the time one of these is returned, every optimistically patched
/// projection has already been restored.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RsvpError {
    /// The authoritative write failed.
    #[error("RSVP write failed: {0}")]
    Write(AuthorityError),

    /// The attendance lookup behind a toggle failed.
    #[error("Attendance lookup failed: {0}")]
    Lookup(AuthorityError),

    /// Another mutation for the same (event, user) is still in flight.
    #[error("An RSVP change for user {user_id} on event {event_id} is already in progress")]
    MutationInFlight {
        /// Event of the refused mutation
        event_id: EventId,
        /// User of the refused mutation
        user_id: UserId,
    },

    /// The coordinator's runtime rejected the request (torn down or timed out).
    #[error("RSVP coordinator unavailable: {0}")]
    Runtime(String),
}

impl From<rollcall_runtime::StoreError> for RsvpError {
    fn from(error: rollcall_runtime::StoreError) -> Self {
        Self::Runtime(error.to_string())
    }
}

/// Invalid configuration value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable could not be parsed.
    #[error("Invalid value for {var}: {value:?} ({reason})")]
    InvalidValue {
        /// Variable name
        var: &'static str,
        /// Raw value found
        value: String,
        /// Why it was refused
        reason: String,
    },
}

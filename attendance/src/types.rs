//! Domain types for check-in and attendance.
//!
//! Identifiers are opaque strings issued by the remote authority, wrapped in
//! newtypes so a token id can never be passed where an event id is expected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[doc = concat!("Create a `", stringify!($name), "` from any string")]
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The id as a string slice
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

string_id!(
    /// Unique identifier for a user
    UserId
);

string_id!(
    /// Unique identifier for an event
    EventId
);

string_id!(
    /// Identifier of one check-in token issuance (the `jti` claim)
    TokenId
);

string_id!(
    /// Identifier of an attendance record
    ///
    /// Records synthesized locally before the authority confirms them carry
    /// the [`RecordId::PROVISIONAL_PREFIX`].
    RecordId
);

impl RecordId {
    /// Prefix of locally synthesized record ids
    pub const PROVISIONAL_PREFIX: &'static str = "optimistic-";

    /// Create a provisional record id from a locally generated suffix
    #[must_use]
    pub fn provisional(suffix: &str) -> Self {
        Self(format!("{}{suffix}", Self::PROVISIONAL_PREFIX))
    }

    /// Whether this id was synthesized locally
    #[must_use]
    pub fn is_provisional(&self) -> bool {
        self.0.starts_with(Self::PROVISIONAL_PREFIX)
    }
}

/// Identifier of one optimistic RSVP mutation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MutationId(Uuid);

impl MutationId {
    /// Creates a new random `MutationId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `MutationId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque credential proving the current user hosts the event
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostCredential(String);

impl HostCredential {
    /// Wrap a credential string
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw credential, for the transport layer only
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for HostCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HostCredential(***)")
    }
}

// ============================================================================
// Check-in tokens
// ============================================================================

/// Raw result of a mint request: the opaque wire payload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintedToken {
    /// Compact token string as issued by the authority
    pub payload: String,
}

/// A decoded, displayable check-in token
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInToken {
    /// Issuance id, single-use from the host's perspective
    pub token_id: TokenId,
    /// Event the token is scoped to
    pub event_id: EventId,
    /// Opaque payload rendered into the optical code
    pub payload: String,
    /// Best-effort expiry; enforced by the authority, never locally
    pub expires_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Attendance and projections
// ============================================================================

/// One RSVP: the user intends to attend the event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    /// Record id (provisional until confirmed)
    pub id: RecordId,
    /// Event attended
    pub event_id: EventId,
    /// Attending user
    pub user_id: UserId,
    /// When the RSVP was created
    pub created_at: DateTime<Utc>,
}

/// Card shown in the user's event list
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    /// Event
    pub event_id: EventId,
    /// Display title
    pub title: String,
    /// Start time
    pub starts_at: DateTime<Utc>,
}

/// Full event view with rosters
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDetail {
    /// Event
    pub event_id: EventId,
    /// Display title
    pub title: String,
    /// Start time
    pub starts_at: DateTime<Utc>,
    /// Users hosting the event
    pub hosts: Vec<UserId>,
    /// Users attending the event
    pub attendees: Vec<UserId>,
}

impl EventDetail {
    /// The list card for this event
    #[must_use]
    pub fn summary(&self) -> EventSummary {
        EventSummary {
            event_id: self.event_id.clone(),
            title: self.title.clone(),
            starts_at: self.starts_at,
        }
    }
}

/// The next event the user can check in to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpcomingCheckIn {
    /// Event
    pub event_id: EventId,
    /// Display title
    pub title: String,
    /// Start time
    pub starts_at: DateTime<Utc>,
}

/// Aggregate "vibe" of an event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventVibe {
    /// Event
    pub event_id: EventId,
    /// Number of attendees
    pub attendee_count: usize,
    /// Free-form tags describing the crowd
    pub tags: Vec<String>,
}

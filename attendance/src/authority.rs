//! Collaborator traits: the remote authority and host-side plumbing.
//!
//! The remote authority owns every authoritative fact (token validity,
//! attendance records). The coordinators only reach it through
//! [`RemoteAuthority`].

use crate::error::Result;
use crate::types::{
    AttendanceRecord, EventDetail, EventId, EventSummary, EventVibe, HostCredential, MintedToken,
    TokenId, UpcomingCheckIn, UserId,
};
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Business result of a redemption request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Redemption {
    /// The token was valid; the subject is now checked in.
    Accepted {
        /// The attendee who presented the token
        subject_user_id: UserId,
    },
    /// The authority refused the token.
    Rejected {
        /// Reason to show the host verbatim, if any
        reason: Option<String>,
    },
}

/// Remote authority.
///
/// # Implementation Notes
///
/// - Signature and expiry checks happen on the authority side only
/// - Every method may fail with [`AuthorityError::Transport`](crate::error::AuthorityError::Transport)
/// - Mint requests arrive at most once per refresh period per presenting screen
pub trait RemoteAuthority: Send + Sync + 'static {
    /// Issue a fresh check-in token for `(user_id, event_id)`.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the user may not check in.
    fn mint_check_in_token(
        &self,
        user_id: &UserId,
        event_id: &EventId,
    ) -> impl Future<Output = Result<MintedToken>> + Send;

    /// Redeem a scanned token on behalf of a host.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure. Business refusals are
    /// `Ok(Redemption::Rejected { .. })`.
    fn redeem_check_in_token(
        &self,
        token_id: &TokenId,
        event_id: &EventId,
        credential: &HostCredential,
    ) -> impl Future<Output = Result<Redemption>> + Send;

    /// Fetch the RSVP list of an event.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    fn fetch_attendance(
        &self,
        event_id: &EventId,
    ) -> impl Future<Output = Result<Vec<AttendanceRecord>>> + Send;

    /// Create (or return the existing) attendance record for `(event_id, user_id)`.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    fn create_attendance(
        &self,
        event_id: &EventId,
        user_id: &UserId,
    ) -> impl Future<Output = Result<AttendanceRecord>> + Send;

    /// Delete the attendance record for `(event_id, user_id)`.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    fn delete_attendance(
        &self,
        event_id: &EventId,
        user_id: &UserId,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Fetch the user's event list.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    fn fetch_my_events(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Vec<EventSummary>>> + Send;

    /// Fetch one event with its rosters.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the event does not exist.
    fn fetch_event_detail(
        &self,
        event_id: &EventId,
    ) -> impl Future<Output = Result<EventDetail>> + Send;

    /// Fetch the user's "today or next" check-in view.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails.
    fn fetch_today_or_next(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Option<UpcomingCheckIn>>> + Send;

    /// Fetch the aggregate vibe of an event.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the event does not exist.
    fn fetch_event_vibe(&self, event_id: &EventId)
    -> impl Future<Output = Result<EventVibe>> + Send;
}

/// Source of the host's credential for redemption calls.
pub trait HostSession: Send + Sync + 'static {
    /// The current credential, or `None` when signed out.
    fn credential(&self) -> Option<HostCredential>;
}

/// Receiver of "attendance changed" notifications.
///
/// After a successful redemption every cached projection keyed by the
/// checked-in user or the event must be refreshed.
pub trait AttendanceInvalidator: Send + Sync + 'static {
    /// Invalidate projections for `user_id` and `event_id`.
    fn invalidate_attendance(
        &self,
        user_id: &UserId,
        event_id: &EventId,
    ) -> impl Future<Output = ()> + Send;
}

/// Invalidator for hosts without a local attendance cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl AttendanceInvalidator for NoCache {
    async fn invalidate_attendance(&self, _user_id: &UserId, _event_id: &EventId) {}
}

//! In-memory remote authority.

use crate::authority::{Redemption, RemoteAuthority};
use crate::error::{AuthorityError, Result};
use crate::types::{
    AttendanceRecord, EventDetail, EventId, EventSummary, EventVibe, HostCredential, MintedToken,
    RecordId, TokenId, UpcomingCheckIn, UserId,
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Header segment of every mock-issued token (`{"alg":"none"}`)
const TOKEN_HEADER: &str = "eyJhbGciOiJub25lIn0";
/// Signature segment of every mock-issued token
const TOKEN_SIGNATURE: &str = "bW9jaw";
/// Lifetime written into the `exp` claim
const TOKEN_LIFETIME_SECS: i64 = 30;

/// Rejection reasons returned by [`MockAuthority::redeem_check_in_token`]
pub const UNKNOWN_TOKEN_REASON: &str = "Unknown check-in code";
/// The token was already redeemed
pub const USED_TOKEN_REASON: &str = "Check-in code already used";
/// The token belongs to another event
pub const WRONG_EVENT_REASON: &str = "Check-in code is for a different event";

/// Operations of [`RemoteAuthority`], for call counting and failure injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MockOperation {
    /// `mint_check_in_token`
    Mint,
    /// `redeem_check_in_token`
    Redeem,
    /// `fetch_attendance`
    FetchAttendance,
    /// `create_attendance`
    CreateAttendance,
    /// `delete_attendance`
    DeleteAttendance,
    /// `fetch_my_events`
    FetchMyEvents,
    /// `fetch_event_detail`
    FetchEventDetail,
    /// `fetch_today_or_next`
    FetchTodayOrNext,
    /// `fetch_event_vibe`
    FetchEventVibe,
}

#[derive(Debug)]
struct IssuedToken {
    event_id: EventId,
    user_id: UserId,
    redeemed: bool,
}

#[derive(Debug, Default)]
struct Inner {
    events: HashMap<EventId, EventDetail>,
    tags: HashMap<EventId, Vec<String>>,
    attendance: Vec<AttendanceRecord>,
    tokens: HashMap<TokenId, IssuedToken>,
    failures: HashMap<MockOperation, VecDeque<AuthorityError>>,
    calls: HashMap<MockOperation, usize>,
    latency: Duration,
    issued: u64,
    records: u64,
}

impl Inner {
    fn issue(&mut self, user_id: &UserId, event_id: &EventId) -> String {
        self.issued += 1;
        let token_id = TokenId::new(format!("tok-{}", self.issued));
        let claims = serde_json::json!({
            "jti": token_id.as_str(),
            "eventId": event_id.as_str(),
            "exp": Utc::now().timestamp() + TOKEN_LIFETIME_SECS,
        });
        self.tokens.insert(
            token_id,
            IssuedToken {
                event_id: event_id.clone(),
                user_id: user_id.clone(),
                redeemed: false,
            },
        );
        format!(
            "{TOKEN_HEADER}.{}.{TOKEN_SIGNATURE}",
            URL_SAFE_NO_PAD.encode(claims.to_string())
        )
    }

    fn event(&self, event_id: &EventId) -> Result<&EventDetail> {
        self.events.get(event_id).ok_or(AuthorityError::NotFound)
    }

    fn attendees(&self, event_id: &EventId) -> impl Iterator<Item = &AttendanceRecord> {
        self.attendance.iter().filter(move |r| &r.event_id == event_id)
    }

    fn attend(&mut self, event_id: &EventId, user_id: &UserId) -> AttendanceRecord {
        if let Some(existing) = self
            .attendance
            .iter()
            .find(|r| &r.event_id == event_id && &r.user_id == user_id)
        {
            return existing.clone();
        }
        self.records += 1;
        let record = AttendanceRecord {
            id: RecordId::new(format!("rec-{}", self.records)),
            event_id: event_id.clone(),
            user_id: user_id.clone(),
            created_at: Utc::now(),
        };
        self.attendance.push(record.clone());
        record
    }

    fn attending(&self, user_id: &UserId) -> Vec<&EventDetail> {
        let mut events: Vec<_> = self
            .attendance
            .iter()
            .filter(|r| &r.user_id == user_id)
            .filter_map(|r| self.events.get(&r.event_id))
            .collect();
        events.sort_by_key(|e| e.starts_at);
        events
    }
}

/// In-memory [`RemoteAuthority`].
///
/// Tokens are compact three-segment strings carrying `jti`, `eventId` and
/// `exp` claims. Each token redeems once, for its own event. A successful
/// redemption also RSVPs the attendee.
#[derive(Debug, Clone, Default)]
pub struct MockAuthority {
    inner: Arc<Mutex<Inner>>,
}

impl MockAuthority {
    /// Create an empty authority
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Register an event. Its `attendees` are recorded as RSVPs.
    #[must_use]
    pub fn with_event(self, detail: EventDetail) -> Self {
        {
            let mut inner = self.lock();
            for user_id in &detail.attendees {
                inner.attend(&detail.event_id, user_id);
            }
            inner.events.insert(detail.event_id.clone(), detail);
        }
        self
    }

    /// Set the vibe tags of an event
    #[must_use]
    pub fn with_tags(self, event_id: EventId, tags: Vec<String>) -> Self {
        self.lock().tags.insert(event_id, tags);
        self
    }

    /// Delay every operation by `latency` (tokio time)
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Fail the next call of `operation` with `error`. Queued errors are consumed in order.
    pub fn fail_next(&self, operation: MockOperation, error: AuthorityError) {
        self.lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Issue a token directly, bypassing call counting and failure injection
    #[must_use]
    pub fn issue_token(&self, user_id: &UserId, event_id: &EventId) -> String {
        self.lock().issue(user_id, event_id)
    }

    /// Number of calls made to `operation`
    #[must_use]
    pub fn calls(&self, operation: MockOperation) -> usize {
        self.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Current RSVPs of an event
    #[must_use]
    pub fn attendance(&self, event_id: &EventId) -> Vec<AttendanceRecord> {
        self.lock().attendees(event_id).cloned().collect()
    }

    /// Count the call, wait out the latency, then pop an injected failure.
    fn enter(&self, operation: MockOperation) -> impl Future<Output = Result<()>> + Send + use<> {
        let inner = Arc::clone(&self.inner);
        let latency = {
            let mut guard = self.lock();
            *guard.calls.entry(operation).or_default() += 1;
            guard.latency
        };

        async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            let failure = inner
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .failures
                .get_mut(&operation)
                .and_then(VecDeque::pop_front);
            failure.map_or(Ok(()), Err)
        }
    }

    /// Run `f` against the state once the call has been admitted.
    fn call<T, F>(&self, operation: MockOperation, f: F) -> impl Future<Output = Result<T>> + Send + use<T, F>
    where
        T: Send,
        F: FnOnce(&mut Inner) -> Result<T> + Send,
    {
        let inner = Arc::clone(&self.inner);
        let admitted = self.enter(operation);

        async move {
            admitted.await?;
            let mut guard = inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            f(&mut *guard)
        }
    }
}

impl RemoteAuthority for MockAuthority {
    fn mint_check_in_token(
        &self,
        user_id: &UserId,
        event_id: &EventId,
    ) -> impl Future<Output = Result<MintedToken>> + Send {
        let (user_id, event_id) = (user_id.clone(), event_id.clone());
        self.call(MockOperation::Mint, move |inner| {
            inner.event(&event_id)?;
            Ok(MintedToken {
                payload: inner.issue(&user_id, &event_id),
            })
        })
    }

    fn redeem_check_in_token(
        &self,
        token_id: &TokenId,
        event_id: &EventId,
        credential: &HostCredential,
    ) -> impl Future<Output = Result<Redemption>> + Send {
        let (token_id, event_id) = (token_id.clone(), event_id.clone());
        let signed_in = !credential.expose().is_empty();

        self.call(MockOperation::Redeem, move |inner| {
            if !signed_in {
                return Err(AuthorityError::Unauthorized);
            }
            let rejected = |reason: &str| {
                Ok(Redemption::Rejected {
                    reason: Some(reason.to_string()),
                })
            };

            let Some(token) = inner.tokens.get_mut(&token_id) else {
                return rejected(UNKNOWN_TOKEN_REASON);
            };
            if token.event_id != event_id {
                return rejected(WRONG_EVENT_REASON);
            }
            if token.redeemed {
                return rejected(USED_TOKEN_REASON);
            }

            token.redeemed = true;
            let subject_user_id = token.user_id.clone();
            inner.attend(&event_id, &subject_user_id);
            Ok(Redemption::Accepted { subject_user_id })
        })
    }

    fn fetch_attendance(
        &self,
        event_id: &EventId,
    ) -> impl Future<Output = Result<Vec<AttendanceRecord>>> + Send {
        let event_id = event_id.clone();
        self.call(MockOperation::FetchAttendance, move |inner| {
            Ok(inner.attendees(&event_id).cloned().collect::<Vec<_>>())
        })
    }

    fn create_attendance(
        &self,
        event_id: &EventId,
        user_id: &UserId,
    ) -> impl Future<Output = Result<AttendanceRecord>> + Send {
        let (event_id, user_id) = (event_id.clone(), user_id.clone());
        self.call(MockOperation::CreateAttendance, move |inner| {
            inner.event(&event_id)?;
            Ok(inner.attend(&event_id, &user_id))
        })
    }

    fn delete_attendance(
        &self,
        event_id: &EventId,
        user_id: &UserId,
    ) -> impl Future<Output = Result<()>> + Send {
        let (event_id, user_id) = (event_id.clone(), user_id.clone());
        self.call(MockOperation::DeleteAttendance, move |inner| {
            inner
                .attendance
                .retain(|r| !(r.event_id == event_id && r.user_id == user_id));
            Ok(())
        })
    }

    fn fetch_my_events(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Vec<EventSummary>>> + Send {
        let user_id = user_id.clone();
        self.call(MockOperation::FetchMyEvents, move |inner| {
            Ok(inner
                .attending(&user_id)
                .into_iter()
                .map(EventDetail::summary)
                .collect::<Vec<_>>())
        })
    }

    fn fetch_event_detail(
        &self,
        event_id: &EventId,
    ) -> impl Future<Output = Result<EventDetail>> + Send {
        let event_id = event_id.clone();
        self.call(MockOperation::FetchEventDetail, move |inner| {
            let mut detail = inner.event(&event_id)?.clone();
            detail.attendees = inner.attendees(&event_id).map(|r| r.user_id.clone()).collect();
            Ok(detail)
        })
    }

    fn fetch_today_or_next(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Option<UpcomingCheckIn>>> + Send {
        let user_id = user_id.clone();
        self.call(MockOperation::FetchTodayOrNext, move |inner| {
            Ok(inner.attending(&user_id).first().map(|e| UpcomingCheckIn {
                event_id: e.event_id.clone(),
                title: e.title.clone(),
                starts_at: e.starts_at,
            }))
        })
    }

    fn fetch_event_vibe(
        &self,
        event_id: &EventId,
    ) -> impl Future<Output = Result<EventVibe>> + Send {
        let event_id = event_id.clone();
        self.call(MockOperation::FetchEventVibe, move |inner| {
            inner.event(&event_id)?;
            Ok(EventVibe {
                attendee_count: inner.attendees(&event_id).count(),
                tags: inner.tags.get(&event_id).cloned().unwrap_or_default(),
                event_id,
            })
        })
    }
}

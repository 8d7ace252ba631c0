//! Optimistic RSVP mutations against the projection cache.
//!
//! Each add or remove snapshots every affected projection, patches the
//! cache synchronously, then issues the authoritative write. On success the
//! affected projections are invalidated and refetched; on failure the
//! snapshots are restored. Either way, once a mutation settles each affected
//! projection is exactly reverted or scheduled for refetch.
//!
//! Refetch results carry the entry version observed at invalidation and are
//! dropped if the entry has been evicted or written since.

use crate::authority::{AttendanceInvalidator, RemoteAuthority};
use crate::cache::{
    CacheEntry, OptimisticTransaction, Projection, ProjectionCache, ProjectionKey, RefetchApply,
};
use crate::config::CheckInConfig;
use crate::error::{AuthorityError, RsvpError};
use crate::types::{AttendanceRecord, EventId, EventSummary, MutationId, RecordId, UserId};
use chrono::{DateTime, Utc};
use rollcall_core::effect::Effect;
use rollcall_core::environment::{Clock, IdGenerator};
use rollcall_core::reducer::Reducer;
use rollcall_core::{smallvec, SmallVec};
use rollcall_runtime::metrics::RsvpMetrics;
use rollcall_runtime::{Store, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Direction of an RSVP mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RsvpIntent {
    /// Create the attendance record
    Add,
    /// Delete the attendance record
    Remove,
}

impl RsvpIntent {
    /// Metric label
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
        }
    }

    /// The intent a toggle resolves to, given whether the user is attending
    #[must_use]
    pub const fn toggled(attending: bool) -> Self {
        if attending { Self::Remove } else { Self::Add }
    }
}

/// A mutation whose write has not resolved yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingMutation {
    /// Event written to
    pub event_id: EventId,
    /// User written for
    pub user_id: UserId,
    /// Direction
    pub intent: RsvpIntent,
    /// Snapshots and patched versions
    pub transaction: OptimisticTransaction,
    /// When the optimistic patch was applied
    pub started_at: DateTime<Utc>,
}

impl PendingMutation {
    fn targets(&self, event_id: &EventId, user_id: &UserId) -> bool {
        &self.event_id == event_id && &self.user_id == user_id
    }
}

/// State of the RSVP coordinator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RsvpState {
    /// Mounted projections
    pub cache: ProjectionCache,
    /// Mutations awaiting their write
    pub pending: HashMap<MutationId, PendingMutation>,
    /// Toggles awaiting their attendance lookup
    pub resolving: HashMap<MutationId, (EventId, UserId)>,
}

impl RsvpState {
    /// Whether any mutation or toggle for `(event_id, user_id)` is in flight
    #[must_use]
    pub fn in_flight(&self, event_id: &EventId, user_id: &UserId) -> bool {
        self.pending.values().any(|m| m.targets(event_id, user_id))
            || self
                .resolving
                .values()
                .any(|(e, u)| e == event_id && u == user_id)
    }
}

/// Inputs to the RSVP reducer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RsvpAction {
    /// Optimistically add an attendance record
    Add {
        /// Caller-chosen id used to match the settle
        mutation_id: MutationId,
        /// Event
        event_id: EventId,
        /// User
        user_id: UserId,
    },
    /// Optimistically remove an attendance record
    Remove {
        /// Caller-chosen id used to match the settle
        mutation_id: MutationId,
        /// Event
        event_id: EventId,
        /// User
        user_id: UserId,
    },
    /// Look up current attendance, then add or remove
    Toggle {
        /// Caller-chosen id used to match the settle
        mutation_id: MutationId,
        /// Event
        event_id: EventId,
        /// User
        user_id: UserId,
    },
    /// The lookup behind a toggle completed
    ToggleResolved {
        /// Toggle being resolved
        mutation_id: MutationId,
        /// Whether the user currently attends
        result: Result<bool, AuthorityError>,
    },
    /// The authoritative write completed
    WriteCompleted {
        /// Mutation being written
        mutation_id: MutationId,
        /// Confirmed record for adds, `None` for removes
        result: Result<Option<AttendanceRecord>, AuthorityError>,
    },
    /// Terminal result of a mutation; the cache is already reconciled
    Settled {
        /// Settled mutation
        mutation_id: MutationId,
        /// Applied intent or the error surfaced to the caller
        outcome: Result<RsvpIntent, RsvpError>,
    },
    /// An authoritative refetch completed
    ProjectionRefetched {
        /// Refetched key
        key: ProjectionKey,
        /// Entry version observed when the refetch was scheduled
        version: u64,
        /// Authority result
        result: Result<Projection, AuthorityError>,
    },
    /// A screen mounted a projection
    Hydrate {
        /// Key
        key: ProjectionKey,
        /// Initial value
        projection: Projection,
    },
    /// A screen unmounted a projection
    Evict {
        /// Key
        key: ProjectionKey,
    },
    /// Attendance changed elsewhere; refetch everything keyed by the pair
    InvalidateAttendance {
        /// Checked-in user
        user_id: UserId,
        /// Event
        event_id: EventId,
    },
}

/// Dependencies of the RSVP reducer.
pub struct RsvpEnvironment<A> {
    /// Authoritative store of attendance
    pub authority: Arc<A>,
    /// Timestamps for provisional records and metrics
    pub clock: Arc<dyn Clock>,
    /// Suffixes for provisional record ids
    pub ids: Arc<dyn IdGenerator>,
    /// Timing configuration
    pub config: CheckInConfig,
}

impl<A> Clone for RsvpEnvironment<A> {
    fn clone(&self) -> Self {
        Self {
            authority: Arc::clone(&self.authority),
            clock: Arc::clone(&self.clock),
            ids: Arc::clone(&self.ids),
            config: self.config.clone(),
        }
    }
}

/// [`IdGenerator`] backed by random UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for optimistic RSVP mutations.
#[derive(Debug, Clone, Copy)]
pub struct RsvpReducer<A> {
    _authority: PhantomData<fn() -> A>,
}

impl<A> RsvpReducer<A> {
    /// Create a new RSVP reducer
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _authority: PhantomData,
        }
    }
}

impl<A> Default for RsvpReducer<A> {
    fn default() -> Self {
        Self::new()
    }
}

fn settle(mutation_id: MutationId, outcome: Result<RsvpIntent, RsvpError>) -> Effect<RsvpAction> {
    Effect::Future(Box::pin(async move {
        Some(RsvpAction::Settled {
            mutation_id,
            outcome,
        })
    }))
}

fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or_default()
}

/// Insert the user's provisional record unless they already have one.
fn add_record(record: AttendanceRecord) -> impl FnOnce(&mut Projection) {
    move |projection| {
        if let Projection::Rsvps(records) = projection {
            if !records.iter().any(|r| r.user_id == record.user_id) {
                records.push(record);
            }
        }
    }
}

/// Insert an event card, keeping the list ordered by start time.
fn add_card(card: EventSummary) -> impl FnOnce(&mut Projection) {
    move |projection| {
        if let Projection::MyEvents(events) = projection {
            if events.iter().any(|e| e.event_id == card.event_id) {
                return;
            }
            let at = events.partition_point(|e| e.starts_at <= card.starts_at);
            events.insert(at, card);
        }
    }
}

impl<A: RemoteAuthority> RsvpReducer<A> {
    /// Snapshot, patch, and dispatch the write.
    fn begin(
        state: &mut RsvpState,
        mutation_id: MutationId,
        intent: RsvpIntent,
        event_id: EventId,
        user_id: UserId,
        env: &RsvpEnvironment<A>,
    ) -> SmallVec<[Effect<RsvpAction>; 4]> {
        if state.pending.contains_key(&mutation_id)
            || state.pending.values().any(|m| m.targets(&event_id, &user_id))
        {
            RsvpMetrics::record_refused();
            tracing::debug!(%event_id, %user_id, "Refusing overlapping RSVP mutation");
            return smallvec![settle(
                mutation_id,
                Err(RsvpError::MutationInFlight { event_id, user_id })
            )];
        }

        RsvpMetrics::record_started(intent.label());
        let now = env.clock.now();
        let cache = &mut state.cache;
        let mut transaction =
            OptimisticTransaction::begin(cache, ProjectionKey::affected_by(&event_id, &user_id));

        let rsvps = ProjectionKey::Rsvps(event_id.clone());
        let my_events = ProjectionKey::MyEvents(user_id.clone());
        match intent {
            RsvpIntent::Add => {
                let provisional = AttendanceRecord {
                    id: RecordId::provisional(&env.ids.next_id()),
                    event_id: event_id.clone(),
                    user_id: user_id.clone(),
                    created_at: now,
                };
                transaction.patch(cache, &rsvps, now, add_record(provisional));

                let card = match cache.get(&ProjectionKey::EventDetail(event_id.clone())) {
                    Some(CacheEntry {
                        projection: Projection::EventDetail(detail),
                        ..
                    }) => Some(detail.summary()),
                    _ => None,
                };
                if let Some(card) = card {
                    transaction.patch(cache, &my_events, now, add_card(card));
                }
            },
            RsvpIntent::Remove => {
                transaction.patch(cache, &my_events, now, |projection| {
                    if let Projection::MyEvents(events) = projection {
                        events.retain(|e| e.event_id != event_id);
                    }
                });
                transaction.patch(cache, &rsvps, now, |projection| {
                    if let Projection::Rsvps(records) = projection {
                        records.retain(|r| r.user_id != user_id);
                    }
                });
            },
        }

        tracing::debug!(
            %mutation_id,
            %event_id,
            %user_id,
            intent = intent.label(),
            patched = transaction.patched_keys().count(),
            "Optimistic RSVP applied"
        );

        let authority = Arc::clone(&env.authority);
        let (write_event, write_user) = (event_id.clone(), user_id.clone());
        state.pending.insert(
            mutation_id,
            PendingMutation {
                event_id,
                user_id,
                intent,
                transaction,
                started_at: now,
            },
        );

        smallvec![Effect::Future(Box::pin(async move {
            let result = match intent {
                RsvpIntent::Add => authority
                    .create_attendance(&write_event, &write_user)
                    .await
                    .map(Some),
                RsvpIntent::Remove => authority
                    .delete_attendance(&write_event, &write_user)
                    .await
                    .map(|()| None),
            };
            Some(RsvpAction::WriteCompleted {
                mutation_id,
                result,
            })
        }))]
    }

    fn refetch(key: ProjectionKey, version: u64, env: &RsvpEnvironment<A>) -> Effect<RsvpAction> {
        let authority = Arc::clone(&env.authority);
        Effect::Future(Box::pin(async move {
            let result = match &key {
                ProjectionKey::MyEvents(user_id) => {
                    authority.fetch_my_events(user_id).await.map(Projection::MyEvents)
                },
                ProjectionKey::EventDetail(event_id) => authority
                    .fetch_event_detail(event_id)
                    .await
                    .map(Projection::EventDetail),
                ProjectionKey::Rsvps(event_id) => {
                    authority.fetch_attendance(event_id).await.map(Projection::Rsvps)
                },
                ProjectionKey::TodayOrNext(user_id) => authority
                    .fetch_today_or_next(user_id)
                    .await
                    .map(Projection::TodayOrNext),
                ProjectionKey::EventVibe(event_id) => authority
                    .fetch_event_vibe(event_id)
                    .await
                    .map(Projection::EventVibe),
            };
            Some(RsvpAction::ProjectionRefetched {
                key,
                version,
                result,
            })
        }))
    }

    fn refetch_all(
        keys: Vec<(ProjectionKey, u64)>,
        env: &RsvpEnvironment<A>,
    ) -> impl Iterator<Item = Effect<RsvpAction>> + '_ {
        keys.into_iter()
            .map(move |(key, version)| Self::refetch(key, version, env))
    }

    fn confirm(
        state: &mut RsvpState,
        mutation_id: MutationId,
        mutation: PendingMutation,
        confirmed: Option<AttendanceRecord>,
        env: &RsvpEnvironment<A>,
    ) -> SmallVec<[Effect<RsvpAction>; 4]> {
        let now = env.clock.now();

        // Swap the provisional record for the confirmed one until the refetch lands
        if let Some(record) = confirmed {
            let rsvps = ProjectionKey::Rsvps(mutation.event_id.clone());
            state.cache.update(&rsvps, now, |projection| {
                if let Projection::Rsvps(records) = projection {
                    records.retain(|r| !(r.user_id == record.user_id && r.id.is_provisional()));
                    if !records.iter().any(|r| r.user_id == record.user_id) {
                        records.push(record);
                    }
                }
            });
        }

        let refetch = mutation.transaction.commit(&mut state.cache);
        RsvpMetrics::record_succeeded(elapsed(mutation.started_at, now));
        tracing::info!(
            %mutation_id,
            event_id = %mutation.event_id,
            user_id = %mutation.user_id,
            intent = mutation.intent.label(),
            refetching = refetch.len(),
            "RSVP confirmed"
        );

        let mut effects: SmallVec<[Effect<RsvpAction>; 4]> =
            smallvec![settle(mutation_id, Ok(mutation.intent))];
        effects.extend(Self::refetch_all(refetch, env));
        effects
    }

    fn revert(
        state: &mut RsvpState,
        mutation_id: MutationId,
        mutation: PendingMutation,
        error: AuthorityError,
        env: &RsvpEnvironment<A>,
    ) -> SmallVec<[Effect<RsvpAction>; 4]> {
        let now = env.clock.now();
        let restored = mutation.transaction.rollback(&mut state.cache, now);

        // Restored keys that are stale or carry someone else's writes get refetched.
        // A stale snapshot's own refetch was discarded against this patch.
        let refetch: Vec<(ProjectionKey, u64)> = restored
            .into_iter()
            .filter(|r| {
                r.overwritten
                    || r.was_stale
                    || state
                        .pending
                        .values()
                        .any(|other| other.transaction.patched_keys().any(|k| k == &r.key))
            })
            .filter_map(|r| state.cache.invalidate(&r.key).map(|version| (r.key, version)))
            .collect();

        RsvpMetrics::record_rollback(elapsed(mutation.started_at, now));
        tracing::warn!(
            %mutation_id,
            event_id = %mutation.event_id,
            user_id = %mutation.user_id,
            intent = mutation.intent.label(),
            %error,
            "RSVP write failed, optimistic changes reverted"
        );

        let mut effects: SmallVec<[Effect<RsvpAction>; 4]> =
            smallvec![settle(mutation_id, Err(RsvpError::Write(error)))];
        effects.extend(Self::refetch_all(refetch, env));
        effects
    }
}

impl<A: RemoteAuthority> Reducer for RsvpReducer<A> {
    type State = RsvpState;
    type Action = RsvpAction;
    type Environment = RsvpEnvironment<A>;

    #[allow(clippy::too_many_lines)] // One arm per action
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            RsvpAction::Add {
                mutation_id,
                event_id,
                user_id,
            } => Self::begin(state, mutation_id, RsvpIntent::Add, event_id, user_id, env),

            RsvpAction::Remove {
                mutation_id,
                event_id,
                user_id,
            } => Self::begin(state, mutation_id, RsvpIntent::Remove, event_id, user_id, env),

            RsvpAction::Toggle {
                mutation_id,
                event_id,
                user_id,
            } => {
                if state.in_flight(&event_id, &user_id) {
                    RsvpMetrics::record_refused();
                    return smallvec![settle(
                        mutation_id,
                        Err(RsvpError::MutationInFlight { event_id, user_id })
                    )];
                }

                state
                    .resolving
                    .insert(mutation_id, (event_id.clone(), user_id.clone()));
                let authority = Arc::clone(&env.authority);

                smallvec![Effect::Future(Box::pin(async move {
                    let result = authority
                        .fetch_attendance(&event_id)
                        .await
                        .map(|records| records.iter().any(|r| r.user_id == user_id));
                    Some(RsvpAction::ToggleResolved {
                        mutation_id,
                        result,
                    })
                }))]
            },

            RsvpAction::ToggleResolved {
                mutation_id,
                result,
            } => {
                let Some((event_id, user_id)) = state.resolving.remove(&mutation_id) else {
                    return smallvec![];
                };

                match result {
                    Ok(attending) => Self::begin(
                        state,
                        mutation_id,
                        RsvpIntent::toggled(attending),
                        event_id,
                        user_id,
                        env,
                    ),
                    Err(error) => {
                        tracing::warn!(%event_id, %user_id, %error, "Attendance lookup for toggle failed");
                        smallvec![settle(mutation_id, Err(RsvpError::Lookup(error)))]
                    },
                }
            },

            RsvpAction::WriteCompleted {
                mutation_id,
                result,
            } => {
                let Some(mutation) = state.pending.remove(&mutation_id) else {
                    tracing::trace!(%mutation_id, "Ignoring write result for unknown mutation");
                    return smallvec![];
                };

                match result {
                    Ok(confirmed) => Self::confirm(state, mutation_id, mutation, confirmed, env),
                    Err(error) => Self::revert(state, mutation_id, mutation, error, env),
                }
            },

            // Observed by callers through the action broadcast
            RsvpAction::Settled { .. } => smallvec![],

            RsvpAction::ProjectionRefetched {
                key,
                version,
                result,
            } => {
                match result {
                    Ok(projection) => {
                        match state.cache.apply_refetch(&key, version, projection, env.clock.now()) {
                            RefetchApply::Applied => {
                                RsvpMetrics::record_refetch_applied();
                                tracing::debug!(kind = key.kind(), version, "Projection refreshed");
                            },
                            RefetchApply::Discarded => {
                                RsvpMetrics::record_refetch_discarded();
                                tracing::debug!(kind = key.kind(), version, "Discarding outdated refetch");
                            },
                        }
                    },
                    Err(error) => {
                        // Entry stays stale until the next invalidation
                        RsvpMetrics::record_refetch_failed();
                        tracing::warn!(kind = key.kind(), %error, "Projection refetch failed");
                    },
                }
                smallvec![]
            },

            RsvpAction::Hydrate { key, projection } => {
                state.cache.hydrate(key, projection, env.clock.now());
                smallvec![]
            },

            RsvpAction::Evict { key } => {
                state.cache.evict(&key);
                smallvec![]
            },

            RsvpAction::InvalidateAttendance { user_id, event_id } => {
                let refetch: Vec<_> = ProjectionKey::affected_by(&event_id, &user_id)
                    .into_iter()
                    .filter_map(|key| state.cache.invalidate(&key).map(|version| (key, version)))
                    .collect();

                tracing::debug!(%event_id, %user_id, refetching = refetch.len(), "Attendance invalidated");
                Self::refetch_all(refetch, env).collect()
            },
        }
    }
}

// ============================================================================
// Coordinator handle
// ============================================================================

type RsvpStore<A> = Store<RsvpState, RsvpAction, RsvpEnvironment<A>, RsvpReducer<A>>;

/// Optimistic RSVP coordinator shared by every screen of one client.
///
/// # Example
///
/// ```ignore
/// let rsvp = RsvpCoordinator::new(env);
/// rsvp.hydrate(ProjectionKey::Rsvps(event.clone()), Projection::Rsvps(records)).await?;
///
/// // The RSVP list already shows the provisional record while this awaits
/// rsvp.add(event, user).await?;
/// ```
pub struct RsvpCoordinator<A: RemoteAuthority> {
    store: RsvpStore<A>,
    settle_timeout: Duration,
}

impl<A: RemoteAuthority> Clone for RsvpCoordinator<A> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            settle_timeout: self.settle_timeout,
        }
    }
}

impl<A: RemoteAuthority> RsvpCoordinator<A> {
    /// Create a coordinator with an empty cache
    #[must_use]
    pub fn new(env: RsvpEnvironment<A>) -> Self {
        let settle_timeout = env.config.settle_timeout;
        Self {
            store: Store::new(RsvpState::default(), RsvpReducer::new(), env),
            settle_timeout,
        }
    }

    async fn mutate(
        &self,
        action: impl FnOnce(MutationId) -> RsvpAction,
    ) -> Result<RsvpIntent, RsvpError> {
        let mutation_id = MutationId::new();
        let settled = self
            .store
            .send_and_wait_for(
                action(mutation_id),
                |a| matches!(a, RsvpAction::Settled { mutation_id: id, .. } if *id == mutation_id),
                self.settle_timeout,
            )
            .await?;

        match settled {
            RsvpAction::Settled { outcome, .. } => outcome,
            other => Err(RsvpError::Runtime(format!("unexpected settle action {other:?}"))),
        }
    }

    /// RSVP `user_id` to `event_id`.
    ///
    /// Affected projections are patched before this future first yields.
    ///
    /// # Errors
    ///
    /// - [`RsvpError::MutationInFlight`]: another change for the pair is pending
    /// - [`RsvpError::Write`]: the authority refused; projections are restored
    /// - [`RsvpError::Runtime`]: torn down, or no settle within the timeout
    pub async fn add(&self, event_id: EventId, user_id: UserId) -> Result<(), RsvpError> {
        self.mutate(|mutation_id| RsvpAction::Add {
            mutation_id,
            event_id,
            user_id,
        })
        .await
        .map(|_| ())
    }

    /// Withdraw the RSVP of `user_id` from `event_id`.
    ///
    /// # Errors
    ///
    /// Same as [`add`](Self::add).
    pub async fn remove(&self, event_id: EventId, user_id: UserId) -> Result<(), RsvpError> {
        self.mutate(|mutation_id| RsvpAction::Remove {
            mutation_id,
            event_id,
            user_id,
        })
        .await
        .map(|_| ())
    }

    /// Add if not attending, remove if attending. Returns the applied intent.
    ///
    /// Attendance is looked up once; a concurrent change on another device
    /// is arbitrated by the authority.
    ///
    /// # Errors
    ///
    /// As [`add`](Self::add), plus [`RsvpError::Lookup`] if the lookup fails.
    pub async fn toggle(&self, event_id: EventId, user_id: UserId) -> Result<RsvpIntent, RsvpError> {
        self.mutate(|mutation_id| RsvpAction::Toggle {
            mutation_id,
            event_id,
            user_id,
        })
        .await
    }

    /// Mount a projection
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after `teardown()`.
    pub async fn hydrate(&self, key: ProjectionKey, projection: Projection) -> Result<(), StoreError> {
        self.store
            .send(RsvpAction::Hydrate { key, projection })
            .await
            .map(|_| ())
    }

    /// Unmount a projection
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after `teardown()`.
    pub async fn evict(&self, key: ProjectionKey) -> Result<(), StoreError> {
        self.store.send(RsvpAction::Evict { key }).await.map(|_| ())
    }

    /// Current entry for `key`, if mounted
    pub async fn projection(&self, key: &ProjectionKey) -> Option<CacheEntry> {
        self.store.state(|s| s.cache.get(key).cloned()).await
    }

    /// Number of mutations awaiting their write
    pub async fn pending(&self) -> usize {
        self.store.state(|s| s.pending.len()).await
    }

    /// Observe settles and refetches as they are applied
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RsvpAction> {
        self.store.subscribe_actions()
    }

    /// Cancel in-flight work and refuse further transitions
    pub fn teardown(&self) {
        self.store.teardown();
    }
}

impl<A: RemoteAuthority> AttendanceInvalidator for RsvpCoordinator<A> {
    async fn invalidate_attendance(&self, user_id: &UserId, event_id: &EventId) {
        let action = RsvpAction::InvalidateAttendance {
            user_id: user_id.clone(),
            event_id: event_id.clone(),
        };
        if let Err(error) = self.store.send(action).await {
            tracing::debug!(%error, "Attendance invalidation after teardown");
        }
    }
}

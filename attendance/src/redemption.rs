//! Host-side scan and redemption state machine.
//!
//! ```text
//! Idle ──scan──▶ Locked ──result──▶ CoolingDown(outcome) ──1.2s──▶ Idle
//!                  │                        ▲
//!                  └──invalid / duplicate───┘   (no remote call)
//! ```
//!
//! Scans arriving while Locked or CoolingDown, or within the throttle window
//! of the previous cycle's start, are dropped silently. Each scan cycle has a
//! number; redemption results and cooldown timers carry it and are ignored
//! once the cycle is over.

use crate::authority::{AttendanceInvalidator, HostSession, Redemption, RemoteAuthority};
use crate::config::CheckInConfig;
use crate::error::AuthorityError;
use crate::scan::{ScanDecoder, ScanResult};
use crate::types::{EventId, HostCredential, TokenId, UserId};
use chrono::{DateTime, Utc};
use rollcall_core::effect::{Effect, EffectId};
use rollcall_core::environment::Clock;
use rollcall_core::reducer::Reducer;
use rollcall_core::{cancellable, delay, smallvec, SmallVec};
use rollcall_runtime::metrics::CheckInMetrics;
use rollcall_runtime::{Store, StoreError};
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Effect id of the cooldown timer
pub const COOLDOWN_TIMER: &str = "checkin-redemption-cooldown";

/// Shown for transport failures and reason-less rejections
pub const GENERIC_REJECTION: &str = "Check-in could not be completed. Try again";

/// Shown when the host has no usable credential
pub const SESSION_REJECTION: &str = "Your host session has expired. Sign in again to check guests in";

// ============================================================================
// Outcomes
// ============================================================================

/// Operator feedback level for an outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Feedback {
    /// Positive confirmation
    Success,
    /// Mild warning (already checked in)
    Soft,
    /// Error
    Failure,
}

/// Terminal result of one scan cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum ScanOutcome {
    /// The authority checked the attendee in
    Accepted {
        /// Redeemed token
        token_id: TokenId,
        /// Event checked in to
        event_id: EventId,
        /// Attendee checked in
        subject_user_id: UserId,
    },
    /// The token was already redeemed on this device
    Duplicate {
        /// Repeated token
        token_id: TokenId,
    },
    /// The code is not a check-in token, or names no event
    Invalid,
    /// The authority refused, or could not be reached
    Rejected {
        /// Message for the host
        message: String,
    },
}

impl ScanOutcome {
    /// Feedback level to signal to the operator
    #[must_use]
    pub const fn feedback(&self) -> Feedback {
        match self {
            Self::Accepted { .. } => Feedback::Success,
            Self::Duplicate { .. } => Feedback::Soft,
            Self::Invalid | Self::Rejected { .. } => Feedback::Failure,
        }
    }

    /// Short label for logs and metrics
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Accepted { .. } => "accepted",
            Self::Duplicate { .. } => "duplicate",
            Self::Invalid => "invalid",
            Self::Rejected { .. } => "rejected",
        }
    }
}

// ============================================================================
// State and actions
// ============================================================================

/// A redemption request in flight.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedemptionAttempt {
    /// Token being redeemed
    pub token_id: TokenId,
    /// Event it is redeemed for
    pub event_id: EventId,
    /// When the scan cycle started
    pub started_at: DateTime<Utc>,
}

/// Where the scanner is in its cycle.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum RedemptionPhase {
    /// Ready for a scan
    #[default]
    Idle,
    /// Waiting on the authority
    Locked(RedemptionAttempt),
    /// Showing an outcome; scans are dropped until the cooldown elapses
    CoolingDown(ScanOutcome),
}

/// Session state of one host scanner screen.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RedemptionState {
    /// Event of the host screen, used when a payload names none
    pub host_event_id: Option<EventId>,
    /// Current phase
    pub phase: RedemptionPhase,
    /// Start of the previous scan cycle, for throttling
    pub last_scan_started_at: Option<DateTime<Utc>>,
    /// Most recently accepted token
    pub last_redeemed: Option<TokenId>,
    /// Number of the current (or last) scan cycle
    pub cycle: u64,
    /// Most recent terminal outcome
    pub last_outcome: Option<ScanOutcome>,
}

impl RedemptionState {
    /// Idle scanner for a host screen showing `event_id`
    #[must_use]
    pub fn for_event(event_id: EventId) -> Self {
        Self {
            host_event_id: Some(event_id),
            ..Self::default()
        }
    }

    /// Whether a redemption request is in flight
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        matches!(self.phase, RedemptionPhase::Locked(_))
    }

    /// Whether an outcome is being shown
    #[must_use]
    pub const fn is_cooling_down(&self) -> bool {
        matches!(self.phase, RedemptionPhase::CoolingDown(_))
    }
}

/// Inputs to the redemption reducer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RedemptionAction {
    /// The camera decoded an optical code
    Scanned {
        /// Raw scanned text
        raw: String,
    },
    /// The authority answered
    RedeemCompleted {
        /// Cycle the request belongs to
        cycle: u64,
        /// Authority result
        result: Result<Redemption, AuthorityError>,
    },
    /// The cooldown timer fired
    CooldownElapsed {
        /// Cycle the timer belongs to
        cycle: u64,
    },
    /// The host screen switched events
    SetHostEvent {
        /// New host event
        event_id: Option<EventId>,
    },
}

/// Dependencies of the redemption reducer.
pub struct RedemptionEnvironment<A, I, H> {
    /// Token redeemer
    pub authority: Arc<A>,
    /// Notified after every accepted redemption
    pub invalidator: Arc<I>,
    /// Source of the host credential
    pub session: Arc<H>,
    /// Clock for the throttle window
    pub clock: Arc<dyn Clock>,
    /// Timing configuration
    pub config: CheckInConfig,
}

impl<A, I, H> Clone for RedemptionEnvironment<A, I, H> {
    fn clone(&self) -> Self {
        Self {
            authority: Arc::clone(&self.authority),
            invalidator: Arc::clone(&self.invalidator),
            session: Arc::clone(&self.session),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
        }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the host scanner.
#[derive(Debug, Clone, Copy)]
pub struct RedemptionReducer<A, I, H> {
    _deps: PhantomData<fn() -> (A, I, H)>,
}

impl<A, I, H> RedemptionReducer<A, I, H> {
    /// Create a new redemption reducer
    #[must_use]
    pub const fn new() -> Self {
        Self { _deps: PhantomData }
    }
}

impl<A, I, H> Default for RedemptionReducer<A, I, H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, I, H> RedemptionReducer<A, I, H>
where
    A: RemoteAuthority,
    I: AttendanceInvalidator,
    H: HostSession,
{
    /// Enter CoolingDown with `outcome` and arm the cooldown timer.
    fn finish(
        state: &mut RedemptionState,
        outcome: ScanOutcome,
        env: &RedemptionEnvironment<A, I, H>,
    ) -> SmallVec<[Effect<RedemptionAction>; 4]> {
        tracing::debug!(cycle = state.cycle, outcome = outcome.label(), "Scan cycle finished");
        CheckInMetrics::record_scan_outcome(outcome.label());

        state.phase = RedemptionPhase::CoolingDown(outcome.clone());
        state.last_outcome = Some(outcome);

        smallvec![cancellable! {
            id: EffectId::new(COOLDOWN_TIMER),
            effect: delay! {
                duration: env.config.cooldown,
                action: RedemptionAction::CooldownElapsed { cycle: state.cycle }
            }
        }]
    }

    fn throttled(state: &RedemptionState, now: DateTime<Utc>, window: Duration) -> bool {
        state.last_scan_started_at.is_some_and(|previous| {
            (now - previous)
                .to_std()
                .is_ok_and(|elapsed| elapsed < window)
        })
    }

    fn redeem(
        attempt: &RedemptionAttempt,
        credential: HostCredential,
        cycle: u64,
        env: &RedemptionEnvironment<A, I, H>,
    ) -> Effect<RedemptionAction> {
        let authority = Arc::clone(&env.authority);
        let invalidator = Arc::clone(&env.invalidator);
        let token_id = attempt.token_id.clone();
        let event_id = attempt.event_id.clone();

        Effect::Future(Box::pin(async move {
            let result = authority
                .redeem_check_in_token(&token_id, &event_id, &credential)
                .await;

            // Runs even if the scanner is torn down before the result lands
            if let Ok(Redemption::Accepted { subject_user_id }) = &result {
                invalidator
                    .invalidate_attendance(subject_user_id, &event_id)
                    .await;
            }

            Some(RedemptionAction::RedeemCompleted { cycle, result })
        }))
    }

    fn classify(attempt: RedemptionAttempt, result: Result<Redemption, AuthorityError>) -> ScanOutcome {
        match result {
            Ok(Redemption::Accepted { subject_user_id }) => ScanOutcome::Accepted {
                token_id: attempt.token_id,
                event_id: attempt.event_id,
                subject_user_id,
            },
            Ok(Redemption::Rejected { reason }) | Err(AuthorityError::Rejected { reason }) => {
                ScanOutcome::Rejected {
                    message: reason
                        .filter(|r| !r.trim().is_empty())
                        .unwrap_or_else(|| GENERIC_REJECTION.to_string()),
                }
            },
            Err(AuthorityError::Unauthorized) => ScanOutcome::Rejected {
                message: SESSION_REJECTION.to_string(),
            },
            Err(error @ (AuthorityError::Transport(_) | AuthorityError::NotFound)) => {
                tracing::warn!(%error, token_id = %attempt.token_id, "Redemption failed");
                ScanOutcome::Rejected {
                    message: GENERIC_REJECTION.to_string(),
                }
            },
        }
    }
}

impl<A, I, H> Reducer for RedemptionReducer<A, I, H>
where
    A: RemoteAuthority,
    I: AttendanceInvalidator,
    H: HostSession,
{
    type State = RedemptionState;
    type Action = RedemptionAction;
    type Environment = RedemptionEnvironment<A, I, H>;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            // ═══════════════════════════════════════════════════════════════
            // Scanned: guard, decode, dispatch
            // ═══════════════════════════════════════════════════════════════
            RedemptionAction::Scanned { raw } => {
                if !matches!(state.phase, RedemptionPhase::Idle) {
                    CheckInMetrics::record_scan_dropped("busy");
                    tracing::trace!("Scan dropped: cycle in progress");
                    return smallvec![];
                }

                let now = env.clock.now();
                if Self::throttled(state, now, env.config.scan_throttle) {
                    CheckInMetrics::record_scan_dropped("throttled");
                    tracing::trace!("Scan dropped: inside throttle window");
                    return smallvec![];
                }

                state.cycle += 1;
                state.last_scan_started_at = Some(now);

                let ScanResult::Parsed(payload) = ScanDecoder::decode(&raw) else {
                    return Self::finish(state, ScanOutcome::Invalid, env);
                };

                if state.last_redeemed.as_ref() == Some(&payload.token_id) {
                    let outcome = ScanOutcome::Duplicate {
                        token_id: payload.token_id,
                    };
                    return Self::finish(state, outcome, env);
                }

                let Some(event_id) = payload.event_id.or_else(|| state.host_event_id.clone())
                else {
                    return Self::finish(state, ScanOutcome::Invalid, env);
                };

                let Some(credential) = env.session.credential() else {
                    let outcome = ScanOutcome::Rejected {
                        message: SESSION_REJECTION.to_string(),
                    };
                    return Self::finish(state, outcome, env);
                };

                let attempt = RedemptionAttempt {
                    token_id: payload.token_id,
                    event_id,
                    started_at: now,
                };
                tracing::debug!(
                    cycle = state.cycle,
                    token_id = %attempt.token_id,
                    event_id = %attempt.event_id,
                    "Redeeming scanned token"
                );

                let effect = Self::redeem(&attempt, credential, state.cycle, env);
                state.phase = RedemptionPhase::Locked(attempt);
                smallvec![effect]
            },

            // ═══════════════════════════════════════════════════════════════
            // RedeemCompleted: classify and cool down
            // ═══════════════════════════════════════════════════════════════
            RedemptionAction::RedeemCompleted { cycle, result } => {
                if cycle != state.cycle || !state.is_locked() {
                    return smallvec![];
                }
                let RedemptionPhase::Locked(attempt) = std::mem::take(&mut state.phase) else {
                    return smallvec![];
                };

                let outcome = Self::classify(attempt, result);
                if let ScanOutcome::Accepted { token_id, .. } = &outcome {
                    state.last_redeemed = Some(token_id.clone());
                }
                Self::finish(state, outcome, env)
            },

            // ═══════════════════════════════════════════════════════════════
            // CooldownElapsed: re-arm the scanner
            // ═══════════════════════════════════════════════════════════════
            RedemptionAction::CooldownElapsed { cycle } => {
                if cycle == state.cycle && state.is_cooling_down() {
                    state.phase = RedemptionPhase::Idle;
                    state.last_scan_started_at = None;
                    tracing::trace!(cycle, "Scanner re-armed");
                }
                smallvec![]
            },

            RedemptionAction::SetHostEvent { event_id } => {
                state.host_event_id = event_id;
                smallvec![]
            },
        }
    }
}

// ============================================================================
// Coordinator handle
// ============================================================================

type RedemptionStore<A, I, H> = Store<
    RedemptionState,
    RedemptionAction,
    RedemptionEnvironment<A, I, H>,
    RedemptionReducer<A, I, H>,
>;

/// Host scanner screen.
///
/// Scans are expected from a single camera task; concurrent callers are
/// serialized by the store but each sees only its own cycle's outcome.
pub struct RedemptionCoordinator<A, I, H>
where
    A: RemoteAuthority,
    I: AttendanceInvalidator,
    H: HostSession,
{
    store: RedemptionStore<A, I, H>,
    result_timeout: Duration,
}

impl<A, I, H> Clone for RedemptionCoordinator<A, I, H>
where
    A: RemoteAuthority,
    I: AttendanceInvalidator,
    H: HostSession,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            result_timeout: self.result_timeout,
        }
    }
}

impl<A, I, H> RedemptionCoordinator<A, I, H>
where
    A: RemoteAuthority,
    I: AttendanceInvalidator,
    H: HostSession,
{
    /// Create an idle scanner for a host screen
    #[must_use]
    pub fn new(host_event_id: Option<EventId>, env: RedemptionEnvironment<A, I, H>) -> Self {
        let result_timeout = env.config.settle_timeout;
        let state = RedemptionState {
            host_event_id,
            ..RedemptionState::default()
        };
        Self {
            store: Store::new(state, RedemptionReducer::new(), env),
            result_timeout,
        }
    }

    /// Handle one scanned code.
    ///
    /// Returns `None` if the scan was dropped by the lock or throttle,
    /// otherwise the terminal outcome of the cycle it started.
    ///
    /// # Errors
    ///
    /// - [`StoreError::ShutdownInProgress`]: the scanner was torn down
    /// - [`StoreError::Timeout`]: the authority did not answer in time
    pub async fn scan(&self, raw: impl Into<String>) -> Result<Option<ScanOutcome>, StoreError> {
        let mut results = self.store.subscribe_actions();
        let before = self.store.state(|s| s.cycle).await;

        self.store
            .send(RedemptionAction::Scanned { raw: raw.into() })
            .await?;

        let (cycle, phase) = self.store.state(|s| (s.cycle, s.phase.clone())).await;
        match phase {
            _ if cycle == before => return Ok(None),
            RedemptionPhase::CoolingDown(outcome) => return Ok(Some(outcome)),
            RedemptionPhase::Locked(_) | RedemptionPhase::Idle => {},
        }

        tokio::time::timeout(self.result_timeout, async {
            loop {
                match results.recv().await {
                    Ok(RedemptionAction::RedeemCompleted { cycle: done, .. }) if done == cycle => {
                        return Ok(());
                    },
                    Ok(_) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {},
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        return Err(StoreError::ChannelClosed);
                    },
                }
            }
        })
        .await
        .map_err(|_| StoreError::Timeout)??;

        Ok(self
            .store
            .state(|s| (s.cycle == cycle).then(|| s.last_outcome.clone()).flatten())
            .await)
    }

    /// Switch the host screen's event
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after `teardown()`.
    pub async fn set_host_event(&self, event_id: Option<EventId>) -> Result<(), StoreError> {
        self.store
            .send(RedemptionAction::SetHostEvent { event_id })
            .await
            .map(|_| ())
    }

    /// Most recent terminal outcome, for the presenter
    pub async fn last_outcome(&self) -> Option<ScanOutcome> {
        self.store.state(|s| s.last_outcome.clone()).await
    }

    /// Snapshot of the full state
    pub async fn snapshot(&self) -> RedemptionState {
        self.store.state(Clone::clone).await
    }

    /// Cancel the cooldown and refuse further transitions
    pub fn teardown(&self) {
        self.store.teardown();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)] // Test code

    use super::*;
    use crate::mocks::{MockAuthority, MockOperation, RecordingInvalidator, StaticSession};
    use rollcall_testing::{assertions, test_clock, ManualClock, ReducerTest};

    type TestReducer = RedemptionReducer<MockAuthority, RecordingInvalidator, StaticSession>;
    type TestEnv = RedemptionEnvironment<MockAuthority, RecordingInvalidator, StaticSession>;

    fn env_with(authority: MockAuthority, session: StaticSession, clock: Arc<ManualClock>) -> TestEnv {
        RedemptionEnvironment {
            authority: Arc::new(authority),
            invalidator: Arc::new(RecordingInvalidator::new()),
            session: Arc::new(session),
            clock,
            config: CheckInConfig::default(),
        }
    }

    fn env() -> TestEnv {
        env_with(
            MockAuthority::new(),
            StaticSession::signed_in(HostCredential::new("host-secret")),
            Arc::new(ManualClock::new(test_clock().now())),
        )
    }

    fn scanned(raw: &str) -> RedemptionAction {
        RedemptionAction::Scanned { raw: raw.to_string() }
    }

    #[test]
    fn invalid_payload_cools_down_without_remote_call() {
        let env = env();
        let authority = Arc::clone(&env.authority);

        ReducerTest::new(TestReducer::new())
            .with_env(env)
            .given_state(RedemptionState::for_event("evt-1".into()))
            .when_action(scanned("definitely not a token"))
            .then_state(|s| {
                assert_eq!(s.phase, RedemptionPhase::CoolingDown(ScanOutcome::Invalid));
                assert_eq!(s.cycle, 1);
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 1);
                assertions::assert_has_cancellable(effects, COOLDOWN_TIMER);
            })
            .run();

        assert_eq!(authority.calls(MockOperation::Redeem), 0);
    }

    #[test]
    fn repeated_token_is_duplicate() {
        let state = RedemptionState {
            last_redeemed: Some("abc123".into()),
            ..RedemptionState::for_event("evt-9".into())
        };

        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(scanned(r#"{"jti":"abc123","event_id":"evt-9"}"#))
            .then_state(|s| {
                assert_eq!(
                    s.last_outcome,
                    Some(ScanOutcome::Duplicate { token_id: "abc123".into() })
                );
                assert_eq!(s.last_outcome.as_ref().map(ScanOutcome::feedback), Some(Feedback::Soft));
            })
            .run();
    }

    #[test]
    fn missing_event_is_invalid() {
        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(RedemptionState::default())
            .when_action(scanned(r#"{"tokenId":"t-1"}"#))
            .then_state(|s| assert_eq!(s.last_outcome, Some(ScanOutcome::Invalid)))
            .run();
    }

    #[test]
    fn host_event_is_the_fallback_target() {
        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(RedemptionState::for_event("evt-host".into()))
            .when_action(scanned(r#"{"tokenId":"t-1"}"#))
            .then_state(|s| match &s.phase {
                RedemptionPhase::Locked(attempt) => {
                    assert_eq!(attempt.event_id.as_str(), "evt-host");
                    assert_eq!(attempt.token_id.as_str(), "t-1");
                },
                other => panic!("expected Locked, got {other:?}"),
            })
            .then_effects(assertions::assert_has_future_effect)
            .run();
    }

    #[test]
    fn missing_credential_is_rejected_locally() {
        let env = env_with(
            MockAuthority::new(),
            StaticSession::signed_out(),
            Arc::new(ManualClock::new(test_clock().now())),
        );

        ReducerTest::new(TestReducer::new())
            .with_env(env)
            .given_state(RedemptionState::for_event("evt-1".into()))
            .when_action(scanned(r#"{"tokenId":"t-1"}"#))
            .then_state(|s| {
                assert_eq!(
                    s.last_outcome,
                    Some(ScanOutcome::Rejected { message: SESSION_REJECTION.to_string() })
                );
            })
            .then_effects(|effects| assertions::assert_has_cancellable(effects, COOLDOWN_TIMER))
            .run();
    }

    #[test]
    fn scans_are_dropped_while_busy() {
        let attempt = RedemptionAttempt {
            token_id: "t-1".into(),
            event_id: "evt-1".into(),
            started_at: test_clock().now(),
        };
        for phase in [
            RedemptionPhase::Locked(attempt),
            RedemptionPhase::CoolingDown(ScanOutcome::Invalid),
        ] {
            let state = RedemptionState {
                phase: phase.clone(),
                cycle: 7,
                ..RedemptionState::for_event("evt-1".into())
            };
            ReducerTest::new(TestReducer::new())
                .with_env(env())
                .given_state(state)
                .when_action(scanned(r#"{"tokenId":"t-2"}"#))
                .then_state(move |s| {
                    assert_eq!(s.phase, phase);
                    assert_eq!(s.cycle, 7);
                })
                .then_effects(|effects| assert!(effects.is_empty()))
                .run();
        }
    }

    #[test]
    fn throttle_window_is_measured_from_cycle_start() {
        let clock = Arc::new(ManualClock::new(test_clock().now()));
        let env = env_with(
            MockAuthority::new(),
            StaticSession::signed_in(HostCredential::new("host-secret")),
            Arc::clone(&clock),
        );
        let reducer = TestReducer::new();
        let mut state = RedemptionState {
            last_scan_started_at: Some(clock.now()),
            ..RedemptionState::for_event("evt-1".into())
        };

        clock.advance(Duration::from_millis(899));
        assert!(reducer.reduce(&mut state, scanned("x"), &env).is_empty());
        assert_eq!(state.cycle, 0);

        clock.advance(Duration::from_millis(1));
        assert!(!reducer.reduce(&mut state, scanned("x"), &env).is_empty());
        assert_eq!(state.cycle, 1);
    }

    #[test]
    fn stale_results_and_timers_are_ignored() {
        let attempt = RedemptionAttempt {
            token_id: "t-1".into(),
            event_id: "evt-1".into(),
            started_at: test_clock().now(),
        };
        let state = RedemptionState {
            phase: RedemptionPhase::Locked(attempt.clone()),
            cycle: 2,
            ..RedemptionState::default()
        };

        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(state.clone())
            .when_action(RedemptionAction::RedeemCompleted {
                cycle: 1,
                result: Ok(Redemption::Accepted { subject_user_id: "u".into() }),
            })
            .then_state(move |s| assert_eq!(s.phase, RedemptionPhase::Locked(attempt)))
            .run();

        let cooling = RedemptionState {
            phase: RedemptionPhase::CoolingDown(ScanOutcome::Invalid),
            ..state
        };
        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(cooling)
            .when_action(RedemptionAction::CooldownElapsed { cycle: 1 })
            .then_state(|s| assert!(s.is_cooling_down()))
            .run();
    }

    #[test]
    fn accepted_result_remembers_token() {
        let state = RedemptionState {
            phase: RedemptionPhase::Locked(RedemptionAttempt {
                token_id: "t-1".into(),
                event_id: "evt-1".into(),
                started_at: test_clock().now(),
            }),
            cycle: 1,
            last_scan_started_at: Some(test_clock().now()),
            ..RedemptionState::default()
        };

        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(RedemptionAction::RedeemCompleted {
                cycle: 1,
                result: Ok(Redemption::Accepted { subject_user_id: "attendee".into() }),
            })
            .then_state(|s| {
                assert_eq!(s.last_redeemed, Some("t-1".into()));
                assert_eq!(
                    s.last_outcome.as_ref().map(ScanOutcome::feedback),
                    Some(Feedback::Success)
                );
            })
            .run();
    }

    #[test]
    fn cooldown_clears_lock_and_throttle() {
        let state = RedemptionState {
            phase: RedemptionPhase::CoolingDown(ScanOutcome::Invalid),
            cycle: 3,
            last_scan_started_at: Some(test_clock().now()),
            ..RedemptionState::default()
        };

        ReducerTest::new(TestReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(RedemptionAction::CooldownElapsed { cycle: 3 })
            .then_state(|s| {
                assert_eq!(s.phase, RedemptionPhase::Idle);
                assert_eq!(s.last_scan_started_at, None);
            })
            .run();
    }

    #[test]
    fn rejection_messages() {
        let attempt = || RedemptionAttempt {
            token_id: "t".into(),
            event_id: "e".into(),
            started_at: test_clock().now(),
        };
        let message = |result| match TestReducer::classify(attempt(), result) {
            ScanOutcome::Rejected { message } => message,
            other => panic!("expected rejection, got {other:?}"),
        };

        assert_eq!(
            message(Ok(Redemption::Rejected { reason: Some("Token expired".into()) })),
            "Token expired"
        );
        assert_eq!(message(Ok(Redemption::Rejected { reason: None })), GENERIC_REJECTION);
        assert_eq!(
            message(Err(AuthorityError::Rejected { reason: Some("Not your event".into()) })),
            "Not your event"
        );
        assert_eq!(message(Err(AuthorityError::Transport("timeout".into()))), GENERIC_REJECTION);
        assert_eq!(message(Err(AuthorityError::Unauthorized)), SESSION_REJECTION);
    }
}

//! Attendee-side check-in token minting.
//!
//! Keeps exactly one fresh token for the current event. A mint request is
//! issued on start and then once per refresh period; every request, timer
//! tick, and result carries the generation it was issued under, so anything
//! from before the latest `start`/`stop` is discarded.
//!
//! # Flow
//!
//! 1. `Start { event_id }`: clear the token, bump the generation, cancel the
//!    old timer, mint, and arm a new timer
//! 2. `RefreshTick`: mint again and re-arm
//! 3. `MintFinished`: store the decoded token, or no token on any failure
//! 4. `Stop`: clear the token, bump the generation, cancel the timer

use crate::authority::RemoteAuthority;
use crate::config::CheckInConfig;
use crate::error::AuthorityError;
use crate::presenter::{PresentedCode, TokenPresenter};
use crate::scan::{ScanDecoder, ScanResult};
use crate::types::{CheckInToken, EventId, MintedToken, UserId};
use rollcall_core::effect::{Effect, EffectId};
use rollcall_core::reducer::Reducer;
use rollcall_core::{cancellable, delay, smallvec, SmallVec};
use rollcall_runtime::metrics::CheckInMetrics;
use rollcall_runtime::{Store, StoreError};
use std::marker::PhantomData;
use std::sync::Arc;

/// Effect id of the refresh timer
pub const MINT_REFRESH_TIMER: &str = "checkin-mint-refresh";

fn refresh_timer() -> EffectId {
    EffectId::new(MINT_REFRESH_TIMER)
}

// ============================================================================
// State and actions
// ============================================================================

/// State of one presenting screen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenMintState {
    /// The attendee
    pub user_id: UserId,
    /// Event currently presented, if started
    pub event_id: Option<EventId>,
    /// Current displayable token
    pub token: Option<CheckInToken>,
    /// Incremented by every start and stop
    pub generation: u64,
    /// Whether the refresh cycle is running
    pub active: bool,
    /// Last failure, cleared by the next success
    pub last_error: Option<AuthorityError>,
}

impl TokenMintState {
    /// Fresh, stopped state for `user_id`
    #[must_use]
    pub const fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            event_id: None,
            token: None,
            generation: 0,
            active: false,
            last_error: None,
        }
    }
}

/// Inputs to the mint reducer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenMintAction {
    /// Start (or restart) presenting a token for `event_id`
    Start {
        /// Event to mint for
        event_id: EventId,
    },
    /// Stop refreshing
    Stop {
        /// Only stop if this generation is still current; `None` stops unconditionally
        generation: Option<u64>,
    },
    /// Refresh timer fired
    RefreshTick {
        /// Generation the timer was armed under
        generation: u64,
    },
    /// A mint request completed
    MintFinished {
        /// Generation the request was issued under
        generation: u64,
        /// Authority result
        result: Result<MintedToken, AuthorityError>,
    },
}

/// Dependencies of the mint reducer.
pub struct TokenMintEnvironment<A> {
    /// Token issuer
    pub authority: Arc<A>,
    /// Timing configuration
    pub config: CheckInConfig,
}

impl<A> Clone for TokenMintEnvironment<A> {
    fn clone(&self) -> Self {
        Self {
            authority: Arc::clone(&self.authority),
            config: self.config.clone(),
        }
    }
}

// ============================================================================
// Reducer
// ============================================================================

/// Reducer for the token mint lifecycle.
#[derive(Debug, Clone, Copy)]
pub struct TokenMintReducer<A> {
    _authority: PhantomData<fn() -> A>,
}

impl<A> TokenMintReducer<A> {
    /// Create a new mint reducer
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _authority: PhantomData,
        }
    }
}

impl<A> Default for TokenMintReducer<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: RemoteAuthority> TokenMintReducer<A> {
    fn mint(
        state: &TokenMintState,
        event_id: EventId,
        env: &TokenMintEnvironment<A>,
    ) -> Effect<TokenMintAction> {
        CheckInMetrics::record_mint_requested();
        let authority = Arc::clone(&env.authority);
        let user_id = state.user_id.clone();
        let generation = state.generation;

        Effect::Future(Box::pin(async move {
            let result = authority.mint_check_in_token(&user_id, &event_id).await;
            Some(TokenMintAction::MintFinished { generation, result })
        }))
    }

    fn arm(generation: u64, env: &TokenMintEnvironment<A>) -> Effect<TokenMintAction> {
        cancellable! {
            id: refresh_timer(),
            effect: delay! {
                duration: env.config.mint_interval,
                action: TokenMintAction::RefreshTick { generation }
            }
        }
    }

    /// Decode a minted payload into a displayable token for `event_id`.
    fn decode(minted: MintedToken, event_id: &EventId) -> Result<CheckInToken, AuthorityError> {
        let ScanResult::Parsed(claims) = ScanDecoder::decode(&minted.payload) else {
            return Err(AuthorityError::Transport(
                "minted token payload could not be decoded".to_string(),
            ));
        };

        match claims.event_id {
            Some(ref claimed) if claimed != event_id => Err(AuthorityError::Transport(format!(
                "minted token is scoped to {claimed}, expected {event_id}"
            ))),
            _ => Ok(CheckInToken {
                token_id: claims.token_id,
                event_id: event_id.clone(),
                payload: minted.payload,
                expires_at: claims.expires_at,
            }),
        }
    }
}

impl<A: RemoteAuthority> Reducer for TokenMintReducer<A> {
    type State = TokenMintState;
    type Action = TokenMintAction;
    type Environment = TokenMintEnvironment<A>;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            TokenMintAction::Start { event_id } => {
                // The previous event's token must disappear before the new one arrives
                state.token = None;
                state.last_error = None;
                state.generation += 1;
                state.active = true;
                state.event_id = Some(event_id.clone());

                tracing::debug!(
                    event_id = %event_id,
                    generation = state.generation,
                    "Token refresh started"
                );

                smallvec![
                    Effect::Cancel(refresh_timer()),
                    Self::mint(state, event_id, env),
                    Self::arm(state.generation, env),
                ]
            },

            TokenMintAction::Stop { generation } => {
                if generation.is_some_and(|g| g != state.generation) || !state.active {
                    return smallvec![];
                }

                state.token = None;
                state.generation += 1;
                state.active = false;
                tracing::debug!(generation = state.generation, "Token refresh stopped");

                smallvec![Effect::Cancel(refresh_timer())]
            },

            TokenMintAction::RefreshTick { generation } => {
                let (true, Some(event_id)) = (
                    state.active && generation == state.generation,
                    state.event_id.clone(),
                ) else {
                    return smallvec![];
                };

                smallvec![Self::mint(state, event_id, env), Self::arm(generation, env)]
            },

            TokenMintAction::MintFinished { generation, result } => {
                if !state.active || generation != state.generation {
                    CheckInMetrics::record_mint_stale();
                    tracing::trace!(generation, "Discarding stale mint result");
                    return smallvec![];
                }
                let Some(event_id) = state.event_id.clone() else {
                    return smallvec![];
                };

                match result.and_then(|minted| Self::decode(minted, &event_id)) {
                    Ok(token) => {
                        tracing::debug!(token_id = %token.token_id, "Check-in token refreshed");
                        state.token = Some(token);
                        state.last_error = None;
                    },
                    Err(error) => {
                        // Swallowed: the next tick retries at the normal cadence
                        tracing::warn!(%error, event_id = %event_id, "Check-in token mint failed");
                        CheckInMetrics::record_mint_failed();
                        state.token = None;
                        state.last_error = Some(error);
                    },
                }

                smallvec![]
            },
        }
    }
}

// ============================================================================
// Client handle
// ============================================================================

type MintStore<A> =
    Store<TokenMintState, TokenMintAction, TokenMintEnvironment<A>, TokenMintReducer<A>>;

/// Rotating check-in token source for one presenting screen.
///
/// # Example
///
/// ```ignore
/// let client = TokenMintClient::new(user_id, authority, CheckInConfig::from_env());
/// let task = client.start(event_id).await?;
///
/// // Render `client.presented().await` on every state change
///
/// task.cancel().await;
/// client.teardown();
/// ```
pub struct TokenMintClient<A: RemoteAuthority> {
    store: MintStore<A>,
}

impl<A: RemoteAuthority> Clone for TokenMintClient<A> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<A: RemoteAuthority> TokenMintClient<A> {
    /// Create a stopped client for `user_id`
    #[must_use]
    pub fn new(user_id: UserId, authority: Arc<A>, config: CheckInConfig) -> Self {
        Self {
            store: Store::new(
                TokenMintState::new(user_id),
                TokenMintReducer::new(),
                TokenMintEnvironment { authority, config },
            ),
        }
    }

    /// Start presenting tokens for `event_id`, replacing any running cycle.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after `teardown()`.
    pub async fn start(&self, event_id: EventId) -> Result<RefreshTask<A>, StoreError> {
        self.store.send(TokenMintAction::Start { event_id }).await?;
        let generation = self.store.state(|s| s.generation).await;
        Ok(RefreshTask {
            generation,
            store: self.store.clone(),
        })
    }

    /// Stop whichever refresh cycle is running.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ShutdownInProgress`] after `teardown()`.
    pub async fn stop(&self) -> Result<(), StoreError> {
        self.store
            .send(TokenMintAction::Stop { generation: None })
            .await
            .map(|_| ())
    }

    /// The current token, if any
    pub async fn current_token(&self) -> Option<CheckInToken> {
        self.store.state(|s| s.token.clone()).await
    }

    /// What the presenter should render right now
    pub async fn presented(&self) -> PresentedCode {
        self.store.state(TokenPresenter::present).await
    }

    /// Snapshot of the full state
    pub async fn snapshot(&self) -> TokenMintState {
        self.store.state(Clone::clone).await
    }

    /// Observe mint results as they are applied
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<TokenMintAction> {
        self.store.subscribe_actions()
    }

    /// Cancel all timers and refuse further transitions
    pub fn teardown(&self) {
        self.store.teardown();
    }
}

/// Handle to one refresh cycle returned by [`TokenMintClient::start`].
pub struct RefreshTask<A: RemoteAuthority> {
    generation: u64,
    store: MintStore<A>,
}

impl<A: RemoteAuthority> RefreshTask<A> {
    /// Generation this task was started under
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Stop this cycle. Idempotent; a no-op once a newer cycle has started.
    pub async fn cancel(&self) {
        let stop = TokenMintAction::Stop {
            generation: Some(self.generation),
        };
        if let Err(error) = self.store.send(stop).await {
            tracing::trace!(%error, "Refresh task cancelled after teardown");
        }
    }
}

impl<A: RemoteAuthority> std::fmt::Debug for RefreshTask<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshTask")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;
    use crate::mocks::MockAuthority;
    use rollcall_testing::{assertions, ReducerTest};

    fn env() -> TokenMintEnvironment<MockAuthority> {
        TokenMintEnvironment {
            authority: Arc::new(MockAuthority::new()),
            config: CheckInConfig::default(),
        }
    }

    fn started(event: &str, generation: u64) -> TokenMintState {
        TokenMintState {
            event_id: Some(EventId::new(event)),
            generation,
            active: true,
            ..TokenMintState::new(UserId::new("attendee"))
        }
    }

    fn token(id: &str, event: &str) -> CheckInToken {
        CheckInToken {
            token_id: id.into(),
            event_id: event.into(),
            payload: format!("payload-{id}"),
            expires_at: None,
        }
    }

    #[test]
    fn start_clears_token_and_restarts_timer() {
        let mut state = started("evt-1", 3);
        state.token = Some(token("old", "evt-1"));

        ReducerTest::new(TokenMintReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(TokenMintAction::Start {
                event_id: "evt-2".into(),
            })
            .then_state(|s| {
                assert_eq!(s.token, None);
                assert_eq!(s.generation, 4);
                assert_eq!(s.event_id, Some(EventId::new("evt-2")));
            })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 3);
                assert!(matches!(&effects[0], Effect::Cancel(id) if id.as_str() == MINT_REFRESH_TIMER));
                assertions::assert_has_future_effect(effects);
                assertions::assert_has_cancellable(effects, MINT_REFRESH_TIMER);
                assertions::assert_has_delay(effects);
            })
            .run();
    }

    #[test]
    fn stale_mint_result_is_discarded() {
        ReducerTest::new(TokenMintReducer::new())
            .with_env(env())
            .given_state(started("evt-2", 4))
            .when_action(TokenMintAction::MintFinished {
                generation: 3,
                result: Ok(MintedToken {
                    payload: r#"{"jti":"old","eventId":"evt-1"}"#.to_string(),
                }),
            })
            .then_state(|s| assert_eq!(s.token, None))
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn current_mint_result_is_decoded() {
        ReducerTest::new(TokenMintReducer::new())
            .with_env(env())
            .given_state(started("evt-2", 4))
            .when_action(TokenMintAction::MintFinished {
                generation: 4,
                result: Ok(MintedToken {
                    payload: r#"{"jti":"fresh","eventId":"evt-2"}"#.to_string(),
                }),
            })
            .then_state(|s| {
                let token = s.token.clone().unwrap();
                assert_eq!(token.token_id.as_str(), "fresh");
                assert_eq!(token.event_id.as_str(), "evt-2");
            })
            .run();
    }

    #[test]
    fn failures_store_no_token() {
        let mut state = started("evt-2", 4);
        state.token = Some(token("previous", "evt-2"));

        ReducerTest::new(TokenMintReducer::new())
            .with_env(env())
            .given_state(state)
            .when_action(TokenMintAction::MintFinished {
                generation: 4,
                result: Err(AuthorityError::Transport("offline".into())),
            })
            .then_state(|s| {
                assert_eq!(s.token, None);
                assert!(s.last_error.is_some());
            })
            .then_effects(assertions::assert_no_effects)
            .run();
    }

    #[test]
    fn undecodable_or_foreign_payload_is_a_failed_mint() {
        for payload in ["garbage", r#"{"jti":"t","eventId":"evt-other"}"#] {
            ReducerTest::new(TokenMintReducer::new())
                .with_env(env())
                .given_state(started("evt-2", 1))
                .when_action(TokenMintAction::MintFinished {
                    generation: 1,
                    result: Ok(MintedToken {
                        payload: payload.to_string(),
                    }),
                })
                .then_state(|s| {
                    assert_eq!(s.token, None);
                    assert!(matches!(s.last_error, Some(AuthorityError::Transport(_))));
                })
                .run();
        }
    }

    #[test]
    fn stop_for_superseded_generation_is_ignored() {
        ReducerTest::new(TokenMintReducer::new())
            .with_env(env())
            .given_state(started("evt-2", 4))
            .when_action(TokenMintAction::Stop {
                generation: Some(2),
            })
            .then_state(|s| {
                assert!(s.active);
                assert_eq!(s.generation, 4);
            })
            .then_effects(|effects| assert!(effects.is_empty()))
            .run();
    }

    #[test]
    fn stop_cancels_timer() {
        ReducerTest::new(TokenMintReducer::new())
            .with_env(env())
            .given_state(started("evt-2", 4))
            .when_action(TokenMintAction::Stop {
                generation: Some(4),
            })
            .then_state(|s| {
                assert!(!s.active);
                assert_eq!(s.generation, 5);
            })
            .then_effects(|effects| assertions::assert_has_cancel(effects, MINT_REFRESH_TIMER))
            .run();
    }

    #[test]
    fn tick_from_old_generation_does_nothing() {
        ReducerTest::new(TokenMintReducer::new())
            .with_env(env())
            .given_state(started("evt-2", 4))
            .when_action(TokenMintAction::RefreshTick { generation: 3 })
            .then_effects(|effects| assert!(effects.is_empty()))
            .run();
    }

    #[test]
    fn current_tick_mints_and_rearms() {
        ReducerTest::new(TokenMintReducer::new())
            .with_env(env())
            .given_state(started("evt-2", 4))
            .when_action(TokenMintAction::RefreshTick { generation: 4 })
            .then_effects(|effects| {
                assertions::assert_effects_count(effects, 2);
                assertions::assert_has_future_effect(effects);
                assertions::assert_has_cancellable(effects, MINT_REFRESH_TIMER);
            })
            .run();
    }
}

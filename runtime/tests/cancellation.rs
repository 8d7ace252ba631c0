//! Integration tests for cancellable effects, teardown and action broadcasting
//!
//! Uses a small polling reducer that mirrors how the coordinators arm a
//! repeating timer: every tick re-arms itself under one `EffectId`, and a
//! restart cancels before re-arming.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use rollcall_core::effect::{Effect, EffectId};
use rollcall_core::{reducer::Reducer, smallvec, SmallVec};
use rollcall_runtime::{Store, StoreError};
use std::time::Duration;

// ============================================================================
// Test Fixtures
// ============================================================================

const POLL_TIMER: &str = "poll-timer";
const PERIOD: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
enum PollAction {
    Start,
    Stop,
    Tick { generation: u64 },
    Fetched { generation: u64, value: u32 },
}

#[derive(Debug, Clone, Default)]
struct PollState {
    generation: u64,
    fetches: u32,
    ticks: u32,
    last_value: Option<u32>,
}

struct PollEnvironment {
    fetch_latency: Duration,
}

struct PollReducer;

fn arm(generation: u64) -> Effect<PollAction> {
    Effect::Delay {
        duration: PERIOD,
        action: Box::new(PollAction::Tick { generation }),
    }
    .cancellable(EffectId::new(POLL_TIMER))
}

fn fetch(generation: u64, value: u32, latency: Duration) -> Effect<PollAction> {
    Effect::Future(Box::pin(async move {
        tokio::time::sleep(latency).await;
        Some(PollAction::Fetched { generation, value })
    }))
}

impl Reducer for PollReducer {
    type State = PollState;
    type Action = PollAction;
    type Environment = PollEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            PollAction::Start => {
                state.generation += 1;
                state.last_value = None;
                state.fetches += 1;
                smallvec![
                    Effect::Cancel(EffectId::new(POLL_TIMER)),
                    fetch(state.generation, state.fetches, env.fetch_latency),
                    arm(state.generation),
                ]
            },
            PollAction::Stop => {
                state.generation += 1;
                state.last_value = None;
                smallvec![Effect::Cancel(EffectId::new(POLL_TIMER))]
            },
            PollAction::Tick { generation } if generation == state.generation => {
                state.ticks += 1;
                state.fetches += 1;
                smallvec![
                    fetch(generation, state.fetches, env.fetch_latency),
                    arm(generation),
                ]
            },
            PollAction::Fetched { generation, value } if generation == state.generation => {
                state.last_value = Some(value);
                smallvec![Effect::None]
            },
            PollAction::Tick { .. } | PollAction::Fetched { .. } => smallvec![Effect::None],
        }
    }
}

fn store(latency: Duration) -> Store<PollState, PollAction, PollEnvironment, PollReducer> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Store::new(
        PollState::default(),
        PollReducer,
        PollEnvironment {
            fetch_latency: latency,
        },
    )
}

/// Let spawned effect tasks run to their next await point.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn repeating_timer_fires_once_per_period() {
    let store = store(Duration::from_millis(50));
    store.send(PollAction::Start).await.unwrap();

    tokio::time::sleep(PERIOD * 3 + Duration::from_secs(1)).await;

    assert_eq!(store.state(|s| s.ticks).await, 3);
    assert_eq!(store.state(|s| s.fetches).await, 4);
    assert_eq!(store.state(|s| s.last_value).await, Some(4));
}

#[tokio::test(start_paused = true)]
async fn restart_cancels_previous_timer() {
    let store = store(Duration::from_millis(50));
    store.send(PollAction::Start).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    store.send(PollAction::Start).await.unwrap();

    // Only the second timer is alive: it fires at 15s, not 10s
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(store.state(|s| s.ticks).await, 0);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(store.state(|s| s.ticks).await, 1);
}

#[tokio::test(start_paused = true)]
async fn stop_discards_in_flight_result() {
    let store = store(Duration::from_secs(2));
    store.send(PollAction::Start).await.unwrap();
    settle().await;

    store.send(PollAction::Stop).await.unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(store.state(|s| s.last_value).await, None);
    assert_eq!(store.state(|s| s.ticks).await, 0);
}

#[tokio::test(start_paused = true)]
async fn teardown_blocks_late_results() {
    let store = store(Duration::from_secs(2));
    store.send(PollAction::Start).await.unwrap();
    settle().await;

    store.teardown();
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(store.state(|s| s.last_value).await, None);
    assert_eq!(store.state(|s| s.ticks).await, 0);
    assert_eq!(
        store.send(PollAction::Start).await.unwrap_err(),
        StoreError::ShutdownInProgress
    );
}

#[tokio::test(start_paused = true)]
async fn observers_see_fed_back_actions() {
    let store = store(Duration::from_millis(10));
    let mut rx = store.subscribe_actions();

    store.send(PollAction::Start).await.unwrap();
    let observed = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        observed,
        PollAction::Fetched {
            generation: 1,
            value: 1
        }
    );
}

#[tokio::test(start_paused = true)]
async fn send_and_wait_for_returns_matching_action() {
    let store = store(Duration::from_millis(10));
    let action = store
        .send_and_wait_for(
            PollAction::Start,
            |a| matches!(a, PollAction::Fetched { .. }),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    assert!(matches!(action, PollAction::Fetched { generation: 1, .. }));
    assert_eq!(store.state(|s| s.last_value).await, Some(1));
}

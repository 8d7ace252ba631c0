//! Check-in flow: attendee token rotation and host-side redemption.

#![allow(clippy::unwrap_used, clippy::panic)] // Test code

use chrono::Utc;
use rollcall_attendance::mint::TokenMintAction;
use rollcall_attendance::mocks::{MockAuthority, MockOperation, RecordingInvalidator, StaticSession};
use rollcall_attendance::presenter::PREPARING_MESSAGE;
use rollcall_attendance::redemption::GENERIC_REJECTION;
use rollcall_attendance::rsvp::RsvpAction;
use rollcall_attendance::{
    AuthorityError, CheckInConfig, EventDetail, EventId, Feedback, HostCredential, PresentedCode,
    Projection, ProjectionKey, RedemptionCoordinator, RedemptionEnvironment, RemoteAuthority,
    RsvpCoordinator, RsvpEnvironment, ScanOutcome, TokenMintClient, UserId,
};
use rollcall_core::environment::Clock;
use rollcall_runtime::StoreError;
use rollcall_testing::{test_clock, ManualClock, SequentialIdGenerator};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

fn event(id: &str) -> EventDetail {
    EventDetail {
        event_id: EventId::new(id),
        title: format!("Event {id}"),
        starts_at: Utc::now(),
        hosts: vec![UserId::new("host")],
        attendees: vec![],
    }
}

fn authority() -> Arc<MockAuthority> {
    Arc::new(
        MockAuthority::new()
            .with_event(event("evt-1"))
            .with_event(event("evt-2")),
    )
}

fn ana() -> UserId {
    UserId::new("ana")
}

async fn next_mint(updates: &mut broadcast::Receiver<TokenMintAction>) {
    loop {
        if let TokenMintAction::MintFinished { .. } = updates.recv().await.unwrap() {
            return;
        }
    }
}

// ============================================================================
// Attendee side
// ============================================================================

#[tokio::test(start_paused = true)]
async fn changing_event_clears_token_before_next_mint() {
    let authority = authority();
    authority.set_latency(Duration::from_millis(100));
    let client = TokenMintClient::new(ana(), Arc::clone(&authority), CheckInConfig::default());
    let mut updates = client.subscribe();

    let _first = client.start(EventId::new("evt-1")).await.unwrap();
    next_mint(&mut updates).await;
    assert_eq!(client.current_token().await.unwrap().event_id.as_str(), "evt-1");

    let _second = client.start(EventId::new("evt-2")).await.unwrap();
    assert_eq!(client.current_token().await, None);
    assert_eq!(
        client.presented().await,
        PresentedCode::Unavailable {
            message: PREPARING_MESSAGE
        }
    );

    next_mint(&mut updates).await;
    let token = client.current_token().await.unwrap();
    assert_eq!(token.event_id.as_str(), "evt-2");
    assert!(matches!(client.presented().await, PresentedCode::Scannable { .. }));

    client.teardown();
}

#[tokio::test(start_paused = true)]
async fn token_rotates_every_interval() {
    let authority = authority();
    let client = TokenMintClient::new(ana(), Arc::clone(&authority), CheckInConfig::default());
    let mut updates = client.subscribe();

    let _task = client.start(EventId::new("evt-1")).await.unwrap();
    next_mint(&mut updates).await;
    let first = client.current_token().await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    next_mint(&mut updates).await;
    let second = client.current_token().await.unwrap();

    assert_ne!(first.token_id, second.token_id);
    assert_eq!(authority.calls(MockOperation::Mint), 2);

    client.teardown();
}

#[tokio::test(start_paused = true)]
async fn mint_completing_after_stop_is_discarded() {
    let authority = authority();
    authority.set_latency(Duration::from_millis(100));
    let client = TokenMintClient::new(ana(), Arc::clone(&authority), CheckInConfig::default());

    let task = client.start(EventId::new("evt-1")).await.unwrap();
    task.cancel().await;
    task.cancel().await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(client.current_token().await, None);
    assert!(!client.snapshot().await.active);
    // The timer was cancelled with the cycle
    assert_eq!(authority.calls(MockOperation::Mint), 1);
}

#[tokio::test(start_paused = true)]
async fn superseded_task_cannot_stop_newer_cycle() {
    let client = TokenMintClient::new(ana(), authority(), CheckInConfig::default());

    let old = client.start(EventId::new("evt-1")).await.unwrap();
    let new = client.start(EventId::new("evt-2")).await.unwrap();
    assert!(new.generation() > old.generation());

    old.cancel().await;
    let state = client.snapshot().await;
    assert!(state.active);
    assert_eq!(state.event_id, Some(EventId::new("evt-2")));

    client.teardown();
    assert!(matches!(
        client.start(EventId::new("evt-1")).await,
        Err(StoreError::ShutdownInProgress)
    ));
}

#[tokio::test(start_paused = true)]
async fn failed_mint_presents_no_token_until_next_tick() {
    let authority = authority();
    authority.fail_next(MockOperation::Mint, AuthorityError::Transport("offline".into()));
    let client = TokenMintClient::new(ana(), Arc::clone(&authority), CheckInConfig::default());
    let mut updates = client.subscribe();

    let _task = client.start(EventId::new("evt-1")).await.unwrap();
    next_mint(&mut updates).await;
    assert_eq!(client.current_token().await, None);
    assert!(client.snapshot().await.last_error.is_some());

    // No faster retry than the refresh cadence
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(authority.calls(MockOperation::Mint), 1);

    next_mint(&mut updates).await;
    assert!(client.current_token().await.is_some());

    client.teardown();
}

// ============================================================================
// Host side
// ============================================================================

type Scanner = RedemptionCoordinator<MockAuthority, RecordingInvalidator, StaticSession>;

fn scanner(authority: &Arc<MockAuthority>, clock: &Arc<ManualClock>) -> (Scanner, RecordingInvalidator) {
    let invalidator = RecordingInvalidator::new();
    let scanner = RedemptionCoordinator::new(
        Some(EventId::new("evt-1")),
        RedemptionEnvironment {
            authority: Arc::clone(authority),
            invalidator: Arc::new(invalidator.clone()),
            session: Arc::new(StaticSession::signed_in(HostCredential::new("host-secret"))),
            clock: Arc::clone(clock) as Arc<dyn Clock>,
            config: CheckInConfig::default(),
        },
    );
    (scanner, invalidator)
}

fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(test_clock().now()))
}

/// Let the cooldown elapse on both the timer and the throttle clock.
async fn cool_down(clock: &ManualClock) {
    clock.advance(Duration::from_millis(1_300));
    tokio::time::sleep(Duration::from_millis(1_300)).await;
}

#[tokio::test(start_paused = true)]
async fn same_token_is_accepted_then_duplicate() {
    let authority = authority();
    let clock = manual_clock();
    let (scanner, invalidator) = scanner(&authority, &clock);
    let payload = authority.issue_token(&ana(), &EventId::new("evt-1"));

    let first = scanner.scan(payload.clone()).await.unwrap().unwrap();
    assert!(matches!(
        &first,
        ScanOutcome::Accepted { subject_user_id, .. } if subject_user_id == &ana()
    ));
    assert_eq!(first.feedback(), Feedback::Success);
    assert_eq!(invalidator.calls(), vec![(ana(), EventId::new("evt-1"))]);

    cool_down(&clock).await;
    let second = scanner.scan(payload).await.unwrap().unwrap();
    assert!(matches!(second, ScanOutcome::Duplicate { .. }));
    assert_eq!(second.feedback(), Feedback::Soft);

    assert_eq!(authority.calls(MockOperation::Redeem), 1);
    assert_eq!(invalidator.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn invalid_payloads_never_reach_authority() {
    let authority = authority();
    let clock = manual_clock();
    let (scanner, _) = scanner(&authority, &clock);

    for raw in ["", "hello", "{}", r#"{"eventId":"evt-1"}"#, "a.!!!.c", "https://example.com"] {
        let outcome = scanner.scan(raw).await.unwrap().unwrap();
        assert_eq!(outcome, ScanOutcome::Invalid, "{raw:?}");
        cool_down(&clock).await;
    }

    assert_eq!(authority.calls(MockOperation::Redeem), 0);
}

#[tokio::test(start_paused = true)]
async fn scans_while_locked_or_cooling_down_are_dropped() {
    let authority = authority();
    authority.set_latency(Duration::from_millis(100));
    let clock = manual_clock();
    let (scanner, _) = scanner(&authority, &clock);
    let payload = authority.issue_token(&ana(), &EventId::new("evt-1"));

    let in_flight = tokio::spawn({
        let scanner = scanner.clone();
        let payload = payload.clone();
        async move { scanner.scan(payload).await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    clock.advance(Duration::from_secs(5));
    assert!(scanner.snapshot().await.is_locked());
    assert_eq!(scanner.scan(payload.clone()).await.unwrap(), None);

    let outcome = in_flight.await.unwrap().unwrap().unwrap();
    assert!(matches!(outcome, ScanOutcome::Accepted { .. }));

    // Cooling down: still dropped even though the throttle window has passed
    clock.advance(Duration::from_secs(5));
    assert_eq!(scanner.scan("garbage").await.unwrap(), None);

    tokio::time::sleep(Duration::from_millis(1_250)).await;
    assert_eq!(scanner.scan("garbage").await.unwrap(), Some(ScanOutcome::Invalid));
    assert_eq!(authority.calls(MockOperation::Redeem), 1);
}

#[tokio::test(start_paused = true)]
async fn cooldown_returns_to_idle() {
    let authority = authority();
    let clock = manual_clock();
    let (scanner, _) = scanner(&authority, &clock);

    scanner.scan("garbage").await.unwrap();
    let state = scanner.snapshot().await;
    assert!(state.is_cooling_down());
    assert!(state.last_scan_started_at.is_some());

    tokio::time::sleep(Duration::from_millis(1_199)).await;
    assert!(scanner.snapshot().await.is_cooling_down());

    tokio::time::sleep(Duration::from_millis(2)).await;
    let state = scanner.snapshot().await;
    assert!(!state.is_cooling_down() && !state.is_locked());
    assert_eq!(state.last_scan_started_at, None);
    // The outcome stays visible after re-arming
    assert_eq!(state.last_outcome, Some(ScanOutcome::Invalid));
}

#[tokio::test(start_paused = true)]
async fn transport_failure_is_a_generic_rejection() {
    let authority = authority();
    authority.fail_next(MockOperation::Redeem, AuthorityError::Transport("timeout".into()));
    let clock = manual_clock();
    let (scanner, invalidator) = scanner(&authority, &clock);
    let payload = authority.issue_token(&ana(), &EventId::new("evt-1"));

    let outcome = scanner.scan(payload.clone()).await.unwrap().unwrap();
    assert_eq!(
        outcome,
        ScanOutcome::Rejected {
            message: GENERIC_REJECTION.to_string()
        }
    );
    assert!(invalidator.calls().is_empty());

    // Not retried automatically; a fresh scan of the same code goes through
    assert_eq!(authority.calls(MockOperation::Redeem), 1);
    cool_down(&clock).await;
    let retry = scanner.scan(payload).await.unwrap().unwrap();
    assert!(matches!(retry, ScanOutcome::Accepted { .. }));
}

#[tokio::test(start_paused = true)]
async fn token_for_another_event_is_rejected_verbatim() {
    let authority = authority();
    let clock = manual_clock();
    let (scanner, _) = scanner(&authority, &clock);
    let payload = authority.issue_token(&ana(), &EventId::new("evt-2"));
    let token_id = rollcall_attendance::ScanDecoder::decode(&payload)
        .parsed()
        .unwrap()
        .token_id;

    // Claims evt-1, but the authority issued it for evt-2
    let raw = format!(r#"{{"tokenId":"{token_id}","eventId":"evt-1"}}"#);
    let outcome = scanner.scan(raw).await.unwrap().unwrap();
    assert_eq!(
        outcome,
        ScanOutcome::Rejected {
            message: rollcall_attendance::mocks::authority::WRONG_EVENT_REASON.to_string()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn teardown_while_locked_stops_all_transitions() {
    let authority = authority();
    authority.set_latency(Duration::from_secs(1));
    let clock = manual_clock();
    let (scanner, invalidator) = scanner(&authority, &clock);
    let payload = authority.issue_token(&ana(), &EventId::new("evt-1"));
    let pending = {
        let scanner = scanner.clone();
        tokio::spawn(async move { scanner.scan(payload).await })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(scanner.snapshot().await.is_locked());
    scanner.teardown();

    tokio::time::sleep(Duration::from_secs(5)).await;
    let state = scanner.snapshot().await;
    assert!(state.is_locked());
    assert_eq!(state.last_outcome, None);
    assert!(matches!(
        scanner.scan("garbage").await,
        Err(StoreError::ShutdownInProgress)
    ));

    // The pending caller gives up instead of hanging
    assert!(pending.await.unwrap().is_err());
    // The authority did check the attendee in, so projections are still invalidated
    assert_eq!(invalidator.calls(), vec![(ana(), EventId::new("evt-1"))]);
}

// ============================================================================
// Check-in to RSVP
// ============================================================================

#[tokio::test(start_paused = true)]
async fn accepted_redemption_refreshes_attendee_projections() {
    let authority = authority();
    let event_id = EventId::new("evt-1");
    let rsvp = Arc::new(RsvpCoordinator::new(RsvpEnvironment {
        authority: Arc::clone(&authority),
        clock: Arc::new(test_clock()),
        ids: Arc::new(SequentialIdGenerator::new("p-")),
        config: CheckInConfig::default(),
    }));
    let rsvps = ProjectionKey::Rsvps(event_id.clone());
    rsvp.hydrate(
        rsvps.clone(),
        Projection::Rsvps(authority.fetch_attendance(&event_id).await.unwrap()),
    )
    .await
    .unwrap();
    let mut refetched = rsvp.subscribe();

    let clock = manual_clock();
    let scanner = RedemptionCoordinator::new(
        Some(event_id.clone()),
        RedemptionEnvironment {
            authority: Arc::clone(&authority),
            invalidator: Arc::clone(&rsvp),
            session: Arc::new(StaticSession::signed_in(HostCredential::new("host-secret"))),
            clock: clock as Arc<dyn Clock>,
            config: CheckInConfig::default(),
        },
    );

    let payload = authority.issue_token(&ana(), &event_id);
    let outcome = scanner.scan(payload).await.unwrap().unwrap();
    assert!(matches!(outcome, ScanOutcome::Accepted { .. }));

    loop {
        if let RsvpAction::ProjectionRefetched { key, .. } = refetched.recv().await.unwrap() {
            if key == rsvps {
                break;
            }
        }
    }

    let entry = rsvp.projection(&rsvps).await.unwrap();
    assert!(!entry.stale);
    let Projection::Rsvps(records) = entry.projection else {
        panic!("unexpected projection");
    };
    assert!(records.iter().any(|r| r.user_id == ana()));

    let last = scanner.snapshot().await;
    assert!(matches!(last.last_outcome, Some(ScanOutcome::Accepted { .. })));
}

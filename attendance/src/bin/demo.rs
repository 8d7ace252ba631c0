//! End-to-end walk through check-in and RSVP against the in-memory authority.
//!
//! ```bash
//! RUST_LOG=debug cargo run -p rollcall-attendance --bin rollcall-demo
//! ```

use anyhow::Context;
use chrono::Utc;
use rollcall_attendance::mint::TokenMintAction;
use rollcall_attendance::mocks::{MockAuthority, StaticSession};
use rollcall_attendance::{
    CheckInConfig, EventDetail, EventId, HostCredential, PresentedCode, Projection, ProjectionKey,
    RedemptionCoordinator, RedemptionEnvironment, RemoteAuthority, RsvpCoordinator,
    RsvpEnvironment, TokenMintClient, UserId, UuidGenerator,
};
use rollcall_core::environment::SystemClock;
use rollcall_runtime::metrics::MetricsExporter;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,rollcall_attendance=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut exporter = MetricsExporter::new();
    exporter.install()?;

    let config = CheckInConfig::from_env();
    tracing::info!(?config, "Starting Rollcall demo");

    let event_id = EventId::new("evt-rooftop");
    let attendee = UserId::new("ana");
    let authority = Arc::new(
        MockAuthority::new()
            .with_event(EventDetail {
                event_id: event_id.clone(),
                title: "Rooftop Social".to_string(),
                starts_at: Utc::now() + chrono::Duration::hours(2),
                hosts: vec![UserId::new("host")],
                attendees: vec![UserId::new("ben")],
            })
            .with_tags(event_id.clone(), vec!["chill".to_string(), "music".to_string()]),
    );

    // Attendee screens mount their projections
    let rsvp = Arc::new(RsvpCoordinator::new(RsvpEnvironment {
        authority: Arc::clone(&authority),
        clock: Arc::new(SystemClock),
        ids: Arc::new(UuidGenerator),
        config: config.clone(),
    }));
    rsvp.hydrate(
        ProjectionKey::MyEvents(attendee.clone()),
        Projection::MyEvents(authority.fetch_my_events(&attendee).await?),
    )
    .await?;
    rsvp.hydrate(
        ProjectionKey::EventDetail(event_id.clone()),
        Projection::EventDetail(authority.fetch_event_detail(&event_id).await?),
    )
    .await?;
    rsvp.hydrate(
        ProjectionKey::Rsvps(event_id.clone()),
        Projection::Rsvps(authority.fetch_attendance(&event_id).await?),
    )
    .await?;

    rsvp.add(event_id.clone(), attendee.clone()).await?;
    tracing::info!(
        rsvps = authority.attendance(&event_id).len(),
        "Attendee RSVP confirmed"
    );

    // Attendee presents a rotating token
    let client = TokenMintClient::new(attendee.clone(), Arc::clone(&authority), config.clone());
    let mut minted = client.subscribe();
    let task = client.start(event_id.clone()).await?;
    while !matches!(minted.recv().await?, TokenMintAction::MintFinished { .. }) {}

    let PresentedCode::Scannable { payload, token_id } = client.presented().await else {
        anyhow::bail!("no check-in code after the first mint");
    };
    tracing::info!(%token_id, "Presenting check-in code");

    // Host scans it
    let scanner = RedemptionCoordinator::new(
        Some(event_id.clone()),
        RedemptionEnvironment {
            authority: Arc::clone(&authority),
            invalidator: Arc::clone(&rsvp),
            session: Arc::new(StaticSession::signed_in(HostCredential::new("host-demo"))),
            clock: Arc::new(SystemClock),
            config: config.clone(),
        },
    );

    for raw in [payload.as_str(), payload.as_str(), "not a check-in code"] {
        let outcome = scanner
            .scan(raw)
            .await?
            .context("scan dropped by the throttle")?;
        tracing::info!(outcome = outcome.label(), feedback = ?outcome.feedback(), "Scan handled");
        tokio::time::sleep(config.cooldown + Duration::from_millis(100)).await;
    }

    let stale = rsvp
        .projection(&ProjectionKey::Rsvps(event_id.clone()))
        .await
        .map(|entry| entry.stale);
    tracing::info!(?stale, "RSVP list after check-in");

    task.cancel().await;
    client.teardown();
    scanner.teardown();
    rsvp.teardown();

    println!("{}", exporter.render());
    Ok(())
}

//! # Rollcall Attendance
//!
//! Event check-in and RSVP synchronization for the Rollcall client.
//!
//! ## Components
//!
//! - [`mint::TokenMintClient`]: keeps one fresh check-in token per presenting screen
//! - [`presenter::TokenPresenter`]: renders the current token or a fallback
//! - [`scan::ScanDecoder`]: normalizes scanned payloads in either wire shape
//! - [`redemption::RedemptionCoordinator`]: host-side throttled, deduplicated redemption
//! - [`rsvp::RsvpCoordinator`]: optimistic add/remove/toggle over cached projections
//!
//! ## Architecture
//!
//! Every coordinator is a reducer run by a [`rollcall_runtime::Store`]:
//!
//! ```text
//! Action → Reducer → (State, Effects) → Effect Execution → More Actions
//! ```
//!
//! The remote authority is reached only through [`authority::RemoteAuthority`].
//!
//! ## Example: scan and redeem
//!
//! ```rust,ignore
//! use rollcall_attendance::*;
//!
//! let rsvp = Arc::new(RsvpCoordinator::new(rsvp_env));
//! let scanner = RedemptionCoordinator::new(
//!     Some(event_id),
//!     RedemptionEnvironment { authority, invalidator: rsvp, session, clock, config },
//! );
//!
//! if let Some(outcome) = scanner.scan(raw).await? {
//!     println!("{} ({:?})", outcome.label(), outcome.feedback());
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod authority;
pub mod cache;
pub mod config;
pub mod error;
pub mod mint;
pub mod presenter;
pub mod redemption;
pub mod rsvp;
pub mod scan;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

// Re-export main types for convenience
pub use authority::{AttendanceInvalidator, HostSession, NoCache, Redemption, RemoteAuthority};
pub use cache::{CacheEntry, Projection, ProjectionCache, ProjectionKey};
pub use config::CheckInConfig;
pub use error::{AuthorityError, ConfigError, Result, RsvpError};
pub use mint::{RefreshTask, TokenMintClient};
pub use presenter::{PresentedCode, TokenPresenter};
pub use redemption::{Feedback, RedemptionCoordinator, RedemptionEnvironment, ScanOutcome};
pub use rsvp::{RsvpCoordinator, RsvpEnvironment, RsvpIntent, UuidGenerator};
pub use scan::{ScanDecoder, ScanResult, ScannedPayload};
pub use types::{
    AttendanceRecord, CheckInToken, EventDetail, EventId, EventSummary, EventVibe,
    HostCredential, MutationId, RecordId, TokenId, UpcomingCheckIn, UserId,
};

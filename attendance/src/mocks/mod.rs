//! In-memory collaborators for tests and the demo binary.
//!
//! Enabled by the `test-utils` feature (on by default).

pub mod authority;
pub mod invalidator;
pub mod session;

pub use authority::{MockAuthority, MockOperation};
pub use invalidator::RecordingInvalidator;
pub use session::StaticSession;

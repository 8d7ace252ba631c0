//! Fixed host session.

use crate::authority::HostSession;
use crate::types::HostCredential;

/// [`HostSession`] whose credential never changes.
#[derive(Debug, Clone)]
pub struct StaticSession {
    credential: Option<HostCredential>,
}

impl StaticSession {
    /// A host signed in with `credential`
    #[must_use]
    pub const fn signed_in(credential: HostCredential) -> Self {
        Self {
            credential: Some(credential),
        }
    }

    /// A host without a session
    #[must_use]
    pub const fn signed_out() -> Self {
        Self { credential: None }
    }
}

impl HostSession for StaticSession {
    fn credential(&self) -> Option<HostCredential> {
        self.credential.clone()
    }
}

//! Rendering of the current check-in token.
//!
//! Pure and O(1): the presenter only looks at the mint state it is given.

use crate::mint::TokenMintState;
use crate::types::TokenId;
use serde::Serialize;

/// Shown while the first token of a cycle is in flight
pub const PREPARING_MESSAGE: &str = "Preparing your check-in code";
/// Shown after a failed mint, until the next one succeeds
pub const RETRYING_MESSAGE: &str = "Check-in code unavailable. Retrying shortly";
/// Shown when no refresh cycle is running
pub const INACTIVE_MESSAGE: &str = "Check-in is not active";

/// What the attendee's screen shows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum PresentedCode {
    /// Render `payload` as an optical code
    Scannable {
        /// Opaque payload to encode
        payload: String,
        /// Token the payload carries
        token_id: TokenId,
    },
    /// Render a fallback message instead
    Unavailable {
        /// Message for the attendee
        message: &'static str,
    },
}

/// Maps mint state to a [`PresentedCode`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenPresenter;

impl TokenPresenter {
    /// Current token, or the matching fallback message
    #[must_use]
    pub fn present(state: &TokenMintState) -> PresentedCode {
        if let Some(token) = &state.token {
            return PresentedCode::Scannable {
                payload: token.payload.clone(),
                token_id: token.token_id.clone(),
            };
        }

        let message = match (state.active, &state.last_error) {
            (false, _) => INACTIVE_MESSAGE,
            (true, Some(_)) => RETRYING_MESSAGE,
            (true, None) => PREPARING_MESSAGE,
        };
        PresentedCode::Unavailable { message }
    }
}

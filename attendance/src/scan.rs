//! Decoding of scanned check-in payloads.
//!
//! Two wire shapes are accepted:
//!
//! 1. A flat JSON object: `{"tokenId" | "jti": string, "eventId" | "event_id": string}`
//! 2. A compact three-segment token `header.claims.signature` whose middle
//!    segment is base64url-encoded JSON of the same shape
//!
//! Strategies are tried in that order; the first one that yields a token id
//! wins. Malformed input never panics or errors, it decodes to
//! [`ScanResult::Invalid`].
//!
//! # Example
//!
//! ```
//! use rollcall_attendance::scan::{ScanDecoder, ScanResult};
//!
//! let result = ScanDecoder::decode(r#"{"jti":"abc123","event_id":"evt-9"}"#);
//! let ScanResult::Parsed(payload) = result else { unreachable!() };
//! assert_eq!(payload.token_id.as_str(), "abc123");
//! assert_eq!(payload.event_id.map(|e| e.to_string()).as_deref(), Some("evt-9"));
//! ```

use crate::types::{EventId, TokenId};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

const TOKEN_ID_FIELDS: [&str; 2] = ["tokenId", "jti"];
const EVENT_ID_FIELDS: [&str; 2] = ["eventId", "event_id"];
const EXPIRY_FIELD: &str = "exp";

/// Normalized content of a scanned code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScannedPayload {
    /// Token issuance id
    pub token_id: TokenId,
    /// Event the token names, if any
    pub event_id: Option<EventId>,
    /// Expiry claim, if present; informational only
    pub expires_at: Option<DateTime<Utc>>,
}

/// Outcome of decoding raw scanned text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScanResult {
    /// A token id was found
    Parsed(ScannedPayload),
    /// Neither wire shape matched
    Invalid,
}

impl ScanResult {
    /// The parsed payload, if any
    #[must_use]
    pub fn parsed(self) -> Option<ScannedPayload> {
        match self {
            Self::Parsed(payload) => Some(payload),
            Self::Invalid => None,
        }
    }
}

/// One wire shape.
trait DecodeStrategy {
    fn decode(&self, raw: &str) -> Option<ScannedPayload>;
}

/// Whole-string JSON object.
struct FlatJson;

impl DecodeStrategy for FlatJson {
    fn decode(&self, raw: &str) -> Option<ScannedPayload> {
        let value: Value = serde_json::from_str(raw).ok()?;
        extract(value.as_object()?)
    }
}

/// `header.claims.signature` with base64url claims.
struct CompactToken;

impl DecodeStrategy for CompactToken {
    fn decode(&self, raw: &str) -> Option<ScannedPayload> {
        let claims = raw.split('.').nth(1)?;
        let bytes = STANDARD.decode(to_standard_base64(claims)).ok()?;
        let value: Value = serde_json::from_slice(&bytes).ok()?;
        extract(value.as_object()?)
    }
}

/// Translate base64url to padded standard base64.
fn to_standard_base64(segment: &str) -> String {
    let mut standard: String = segment
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    let padding = (4 - standard.len() % 4) % 4;
    standard.extend(std::iter::repeat_n('=', padding));
    standard
}

fn first_string(claims: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields
        .iter()
        .filter_map(|field| claims.get(*field)?.as_str())
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

fn expiry(claims: &Map<String, Value>) -> Option<DateTime<Utc>> {
    let exp = claims.get(EXPIRY_FIELD)?;
    #[allow(clippy::cast_possible_truncation)] // Fractional seconds are dropped
    let seconds = exp.as_i64().or_else(|| exp.as_f64().map(|f| f as i64))?;
    DateTime::from_timestamp(seconds, 0)
}

fn extract(claims: &Map<String, Value>) -> Option<ScannedPayload> {
    let token_id = first_string(claims, &TOKEN_ID_FIELDS)?;
    Some(ScannedPayload {
        token_id: TokenId::new(token_id),
        event_id: first_string(claims, &EVENT_ID_FIELDS).map(EventId::new),
        expires_at: expiry(claims),
    })
}

/// Stateless decoder for scanned payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanDecoder;

impl ScanDecoder {
    /// Decode raw scanned text. Surrounding whitespace is ignored.
    #[must_use]
    pub fn decode(raw: &str) -> ScanResult {
        let raw = raw.trim();
        let strategies: [&dyn DecodeStrategy; 2] = [&FlatJson, &CompactToken];

        strategies
            .iter()
            .find_map(|strategy| strategy.decode(raw))
            .map_or(ScanResult::Invalid, ScanResult::Parsed)
    }
}

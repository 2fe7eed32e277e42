use std::fmt;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::error::AuthError;

/// Claims decoded from a token's payload segment.
///
/// All timestamps are seconds since the Unix epoch, as issued by the server.
/// Unknown claims are ignored; missing claims default to zero/empty so that a
/// sparse payload still decodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    /// Issuer
    #[serde(default)]
    pub iss: String,
    /// Subject
    #[serde(default)]
    pub sub: String,
    /// Audience
    #[serde(default)]
    pub aud: String,
    /// Expiration time
    #[serde(default)]
    pub exp: i64,
    /// Issued at
    #[serde(default)]
    pub iat: i64,
    /// Not valid before
    #[serde(default)]
    pub nbf: i64,
    /// Subject identity in `Domain\LoginName` form
    #[serde(default)]
    pub name: String,
}

/// One JSON Web Token, decoded client-side.
///
/// The signature segment is carried in the raw string but never verified;
/// this client only reads claims, trust is the server's problem. A `Token`
/// is immutable once constructed and is replaced wholesale when a new one
/// arrives from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    raw: String,
    payload: TokenPayload,
}

impl Token {
    /// Decode a token from its compact encoded form (`header.payload[.sig]`).
    ///
    /// Callers on state-affecting paths should treat a decode failure as "no
    /// token" and substitute [`Token::empty`] rather than propagating.
    pub fn from_head_and_payload(encoded: &str) -> Result<Self, AuthError> {
        let mut segments = encoded.split('.');
        segments
            .next()
            .filter(|head| !head.is_empty())
            .ok_or_else(|| AuthError::MalformedToken("missing header segment".to_string()))?;
        let payload_segment = segments
            .next()
            .ok_or_else(|| AuthError::MalformedToken("missing payload segment".to_string()))?;

        let bytes = URL_SAFE_NO_PAD
            .decode(payload_segment)
            .map_err(|e| AuthError::MalformedToken(format!("payload is not base64url: {}", e)))?;
        let payload: TokenPayload = serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::MalformedToken(format!("payload is not valid JSON: {}", e)))?;

        Ok(Self {
            raw: encoded.to_string(),
            payload,
        })
    }

    /// The sentinel for "no token": no claims, never valid, empty username.
    pub fn empty() -> Self {
        Self {
            raw: String::new(),
            payload: TokenPayload::default(),
        }
    }

    /// Whether this is the empty sentinel.
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// A token is valid iff `nbf <= now < exp`.
    pub fn is_valid(&self) -> bool {
        let now = Utc::now().timestamp();
        self.payload.nbf <= now && now < self.payload.exp
    }

    /// Suspend until the token's not-before instant has passed.
    ///
    /// Resolves immediately when `nbf` is already in the past. Expiration is
    /// not re-checked here.
    pub async fn await_not_before(&self) {
        let remaining = self.payload.nbf - Utc::now().timestamp();
        if remaining > 0 {
            sleep(Duration::from_secs(remaining as u64)).await;
        }
    }

    /// Subject identity as `Domain\LoginName`, empty for the sentinel.
    pub fn username(&self) -> &str {
        &self.payload.name
    }

    /// The decoded claims.
    pub fn payload(&self) -> &TokenPayload {
        &self.payload
    }

    /// When the token was issued.
    pub fn issued_date(&self) -> DateTime<Utc> {
        epoch_seconds(self.payload.iat)
    }

    /// When the token expires.
    pub fn expiration_date(&self) -> DateTime<Utc> {
        epoch_seconds(self.payload.exp)
    }

    /// Earliest instant at which the token is usable.
    pub fn not_before_date(&self) -> DateTime<Utc> {
        epoch_seconds(self.payload.nbf)
    }

    /// Signed seconds until expiration; negative once expired.
    pub fn expires_in_secs(&self) -> i64 {
        self.payload.exp - Utc::now().timestamp()
    }
}

/// `Display` returns the original encoded string unchanged, so a decoded
/// token round-trips back onto the wire byte for byte.
impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn epoch_seconds(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

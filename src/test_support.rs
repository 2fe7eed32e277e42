//! Helpers shared by the unit tests.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use serde_json::json;

/// Install a test subscriber once so failing runs show the crate's logs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build an encoded token whose claim timestamps are offsets in seconds from
/// now. The header and signature segments are opaque filler; only the payload
/// matters client-side.
pub fn encode_token(name: &str, iat_offset: i64, nbf_offset: i64, exp_offset: i64) -> String {
    let now = Utc::now().timestamp();
    let payload = json!({
        "iss": "sensenet-token-service",
        "sub": "auth",
        "aud": "client",
        "exp": now + exp_offset,
        "iat": now + iat_offset,
        "nbf": now + nbf_offset,
        "name": name,
    });
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());
    format!("{}.{}.fakesignature", header, body)
}

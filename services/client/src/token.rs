//! services/client/src/token.rs
//!
//! Unverified inspection of the auth token's claims, used only for the
//! session-ownership sanity check. Signature validation stays with the
//! backend; a token that doesn't decode simply yields no claim.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tracing::debug;

/// Extracts the user id claim (`user_id`, falling back to `sub`) from a JWT
/// payload. Any malformation (wrong segment count, bad base64, bad JSON,
/// missing claim) yields `None` with a debug log, never an error.
pub fn user_id_from_token(token: &str) -> Option<String> {
    let payload = match token.split('.').nth(1) {
        Some(segment) if !segment.is_empty() => segment,
        _ => {
            debug!("Token has no payload segment; skipping ownership check.");
            return None;
        }
    };

    let bytes = match URL_SAFE_NO_PAD.decode(payload) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "Token payload is not valid base64url; skipping ownership check.");
            return None;
        }
    };

    let claims: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "Token payload is not valid JSON; skipping ownership check.");
            return None;
        }
    };

    claims
        .get("user_id")
        .or_else(|| claims.get("sub"))
        .and_then(|v| v.as_str())
        .map(str::to_owned)
}

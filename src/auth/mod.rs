use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// How long an issued session token stays valid.
pub const SESSION_TTL_MS: i64 = 8 * 60 * 60 * 1000;

const NONCE_LEN: usize = 16;
const LENGTH_PREFIX_LEN: usize = 4;
const SIGNATURE_LEN: usize = 32;

/// Signed portion of a session token. Serialization order is fixed by the
/// struct declaration, so encode and verify see identical payload bytes.
#[derive(Debug, Serialize, Deserialize)]
struct SessionPayload {
    rand: String,
    exp: i64,
}

/// Issues a new opaque session token signed with `secret`, valid for
/// [`SESSION_TTL_MS`] from now.
///
/// The token is framed as a 4-byte big-endian payload length, the JSON
/// payload bytes, then the raw HMAC-SHA256 signature, and the whole frame is
/// base64url-encoded without padding. The embedded nonce makes every issued
/// token distinct; the server keeps no per-token state.
pub fn generate_session_token(secret: &str) -> String {
    generate_session_token_at(secret, Utc::now().timestamp_millis() + SESSION_TTL_MS)
}

fn generate_session_token_at(secret: &str, expires_at_ms: i64) -> String {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let payload = SessionPayload {
        rand: hex::encode(nonce),
        exp: expires_at_ms,
    };
    // Serialization of a two-field struct cannot fail.
    let payload_bytes = serde_json::to_vec(&payload).expect("session payload serializes");

    let signature = sign_payload(secret, &payload_bytes);

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_LEN + payload_bytes.len() + SIGNATURE_LEN);
    frame.extend_from_slice(&(payload_bytes.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload_bytes);
    frame.extend_from_slice(&signature);

    URL_SAFE_NO_PAD.encode(frame)
}

/// Verifies a session token against `secret`.
///
/// Returns `true` only when the embedded signature matches the payload bytes
/// and the token has not expired. Malformed input of any kind (bad base64,
/// truncated frame, a declared payload length that overruns the buffer,
/// unparseable payload) fails closed: the result is `false`, never a panic,
/// and the caller cannot distinguish the failure reasons.
pub fn verify_session_token(secret: &str, token: &str) -> bool {
    verify_session_token_at(secret, token, Utc::now().timestamp_millis())
}

fn verify_session_token_at(secret: &str, token: &str, now_ms: i64) -> bool {
    let frame = match URL_SAFE_NO_PAD.decode(token) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    if frame.len() < LENGTH_PREFIX_LEN {
        return false;
    }
    let payload_len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;

    // The declared length is attacker-controlled; slicing without this check
    // would panic on a crafted short token.
    let Some(total_payload_end) = LENGTH_PREFIX_LEN.checked_add(payload_len) else {
        return false;
    };
    if total_payload_end > frame.len() {
        return false;
    }

    let payload_bytes = &frame[LENGTH_PREFIX_LEN..total_payload_end];
    let signature = &frame[total_payload_end..];

    let payload: SessionPayload = match serde_json::from_slice(payload_bytes) {
        Ok(payload) => payload,
        Err(_) => return false,
    };

    let expected = sign_payload(secret, payload_bytes);

    // Signature length is not secret; only the content comparison needs to be
    // constant-time.
    if signature.len() != expected.len() {
        return false;
    }
    if signature.ct_eq(expected.as_slice()).unwrap_u8() != 1 {
        return false;
    }

    now_ms <= payload.exp
}

fn sign_payload(secret: &str, payload_bytes: &[u8]) -> [u8; SIGNATURE_LEN] {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any size");
    mac.update(payload_bytes);
    mac.finalize().into_bytes().into()
}

/// Extracts the bearer token from an `Authorization` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value.strip_prefix("Bearer ")
}

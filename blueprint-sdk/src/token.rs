//! Bearer token decoding.
//!
//! Access tokens are JWTs issued by the member service. The client never
//! verifies the signature; it only reads the payload to learn who is logged
//! in. The server remains the authority on whether a token is valid.

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("no token held")]
    Missing,
    #[error("malformed token: expected 3 dot-separated segments, got {0}")]
    Segments(usize),
    #[error("malformed token payload encoding: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("malformed token claims: {0}")]
    Claims(#[from] serde_json::Error),
}

/// Claims carried in a member access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub member_id: String,
    pub member_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Expiry, seconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl Claims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }

    /// Tokens without an `exp` claim never expire on the client side.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|at| at <= now)
    }
}

/// Decode the payload segment of a JWT into [`Claims`].
pub fn decode(token: &str) -> Result<Claims, TokenError> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(TokenError::Segments(segments.len()));
    }
    // Some issuers pad their segments even though RFC 7515 forbids it.
    let payload = segments[1].trim_end_matches('=');
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(payload)?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
pub(crate) fn encode_unsigned(claims: &serde_json::Value) -> String {
    let b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = b64.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = b64.encode(claims.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_member_claims() {
        let token = encode_unsigned(&json!({
            "memberId": "hong123",
            "memberName": "홍길동",
            "sub": "hong123",
            "exp": 4102444800i64,
        }));
        let claims = decode(&token).unwrap();
        assert_eq!(claims.member_id, "hong123");
        assert_eq!(claims.member_name, "홍길동");
        assert_eq!(claims.exp, Some(4102444800));
        assert!(claims.iat.is_none());
    }

    #[test]
    fn test_decode_rejects_wrong_segment_count() {
        assert!(matches!(decode("abc.def"), Err(TokenError::Segments(2))));
        assert!(matches!(decode(""), Err(TokenError::Segments(1))));
    }

    #[test]
    fn test_decode_rejects_bad_base64() {
        assert!(matches!(decode("a.!!!.c"), Err(TokenError::Base64(_))));
    }

    #[test]
    fn test_decode_rejects_missing_member_claims() {
        let token = encode_unsigned(&json!({ "sub": "someone" }));
        assert!(matches!(decode(&token), Err(TokenError::Claims(_))));
    }

    #[test]
    fn test_expiry() {
        let token = encode_unsigned(&json!({
            "memberId": "a",
            "memberName": "b",
            "exp": 1_000,
        }));
        let claims = decode(&token).unwrap();
        assert!(claims.is_expired_at(Utc::now()));

        let no_exp = Claims { exp: None, ..claims };
        assert!(!no_exp.is_expired_at(Utc::now()));
    }
}

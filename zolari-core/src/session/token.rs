//! Token endpoint responses and the persisted session record.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::types::UserProfile;

/// Tokens issued by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionToken {
    pub access_token: String,
    /// Used for silent renewal.
    pub refresh_token: Option<String>,
    /// OpenID Connect ID token; carries the profile claims.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub token_type: String,
    pub scopes: Vec<String>,
}

impl SessionToken {
    /// Whether the access token has expired, with a 5-minute safety buffer.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at - chrono::Duration::minutes(5),
            // No expiration info, assume it's still valid.
            None => false,
        }
    }

    /// Decode the profile claims carried by the ID token, if any.
    ///
    /// The token was received directly from the token endpoint over TLS, so the
    /// signature is not checked here.
    pub fn id_token_profile(&self) -> Option<UserProfile> {
        let payload = self.id_token.as_deref()?.split('.').nth(1)?;
        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

/// What is persisted in the credential store between runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredSession {
    pub token: SessionToken,
    pub profile: Option<UserProfile>,
}

/// Login started but not yet completed: kept between the initiate and resume phases.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingLogin {
    pub state: String,
    pub code_verifier: String,
    pub redirect_uri: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    id_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<u64>,
    scope: Option<String>,
}

/// Parse a token endpoint response into a `SessionToken`.
pub(crate) fn parse_token_response(body: &str) -> Result<SessionToken, AuthError> {
    let response: TokenResponse =
        serde_json::from_str(body).map_err(|e| AuthError::TokenExchange {
            message: format!("Invalid JSON in token response: {}", e),
        })?;

    let access_token = response
        .access_token
        .ok_or_else(|| AuthError::TokenExchange {
            message: "Token response missing 'access_token'".to_string(),
        })?;

    Ok(SessionToken {
        access_token,
        refresh_token: response.refresh_token,
        id_token: response.id_token,
        // An expiry too far out to represent counts as no expiry.
        expires_at: response
            .expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(chrono::Duration::try_seconds)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl)),
        token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
        scopes: response
            .scope
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default(),
    })
}

/// Provider error body, e.g. `{"error":"invalid_grant","error_description":"..."}`.
pub(crate) fn describe_error_body(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: String,
        error_description: Option<String>,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(err) => match err.error_description {
            Some(description) => format!("{}: {}", err.error, description),
            None => err.error,
        },
        Err(_) => body.to_string(),
    }
}

#[cfg(test)]
pub(crate) fn fake_id_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.sig", header, payload)
}

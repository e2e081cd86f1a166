//! Identity session: OAuth 2.0 authorization code flow with PKCE against the
//! hosted login pages of the identity provider.
//!
//! Login is a two-phase protocol. [`SessionManager::login`] persists a pending
//! redirect (PKCE verifier and state) and returns the URL to navigate to. When
//! the browser comes back to the application origin,
//! [`SessionManager::complete_redirect_if_present`] consumes the pending
//! redirect and exchanges the authorization code for tokens. Tokens live in a
//! [`CredentialStore`] so the session survives restarts, and an expired access
//! token is renewed silently with its refresh token.

mod callback;
mod pkce;
mod token;

pub use callback::{REDIRECT_TIMEOUT, RedirectListener};
pub use token::{PendingLogin, SessionToken, StoredSession};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::IdentityConfig;
use crate::credentials::{CredentialError, CredentialStore};
use crate::error::AuthError;
use crate::types::UserProfile;

use token::{describe_error_body, parse_token_response};

impl From<CredentialError> for AuthError {
    fn from(err: CredentialError) -> Self {
        AuthError::Storage {
            message: err.to_string(),
        }
    }
}

/// The session operations the application controller depends on.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Resume phase: if `location` carries an authorization response, complete
    /// the login and return `location` stripped of its query. `None` when there
    /// is nothing to complete.
    async fn complete_redirect_if_present(&self, location: &Url)
    -> Result<Option<Url>, AuthError>;

    /// Whether a valid session exists, renewing it silently if needed.
    async fn is_authenticated(&self) -> Result<bool, AuthError>;

    /// Profile of the current session.
    async fn profile(&self) -> Result<Option<UserProfile>, AuthError>;

    /// Initiate phase: returns the hosted login page to navigate to.
    async fn login(&self) -> Result<Url, AuthError>;

    /// Ends the local session; returns the provider's logout page to navigate to.
    async fn logout(&self) -> Result<Url, AuthError>;
}

/// Session manager backed by the identity provider and a credential store.
pub struct SessionManager {
    identity: IdentityConfig,
    store: Arc<dyn CredentialStore>,
    http: reqwest::Client,
}

impl SessionManager {
    pub fn new(identity: IdentityConfig, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            identity,
            store,
            http: reqwest::Client::new(),
        }
    }

    fn session_key(&self) -> String {
        format!("session:{}", self.identity.client_id)
    }

    fn pending_key(&self) -> String {
        format!("pending:{}", self.identity.client_id)
    }

    /// The stored session as-is, without renewal.
    pub fn stored_session(&self) -> Result<Option<StoredSession>, AuthError> {
        match self.store.get(&self.session_key()) {
            Ok(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| AuthError::Storage {
                    message: format!("Failed to deserialize session: {}", e),
                }),
            Err(CredentialError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save_session(&self, session: &StoredSession) -> Result<(), AuthError> {
        let json = serde_json::to_string(session).map_err(|e| AuthError::Storage {
            message: format!("Failed to serialize session: {}", e),
        })?;
        self.store.store(&self.session_key(), &json)?;
        Ok(())
    }

    fn clear_session(&self) -> Result<(), AuthError> {
        self.store.delete(&self.session_key())?;
        Ok(())
    }

    fn take_pending(&self) -> Result<Option<PendingLogin>, AuthError> {
        let key = self.pending_key();
        let json = match self.store.get(&key) {
            Ok(json) => json,
            Err(CredentialError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        self.store.delete(&key)?;
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| AuthError::Storage {
                message: format!("Failed to deserialize pending login: {}", e),
            })
    }

    /// The active session, renewing an expired access token first.
    ///
    /// A failed renewal ends the session.
    pub async fn active_session(&self) -> Result<Option<StoredSession>, AuthError> {
        let Some(session) = self.stored_session()? else {
            return Ok(None);
        };
        if !session.token.is_expired() {
            return Ok(Some(session));
        }

        if session.token.refresh_token.is_none() {
            info!("Session expired and cannot be renewed");
            self.clear_session()?;
            return Ok(None);
        }

        match self.refresh().await {
            Ok(renewed) => Ok(Some(renewed)),
            Err(e) => {
                warn!(error = %e, "Silent session renewal failed");
                self.clear_session()?;
                Ok(None)
            }
        }
    }

    /// Renew the session with its refresh token.
    pub async fn refresh(&self) -> Result<StoredSession, AuthError> {
        let session = self.stored_session()?.ok_or_else(|| AuthError::Refresh {
            message: "No session to refresh".to_string(),
        })?;
        let refresh_token = session
            .token
            .refresh_token
            .clone()
            .ok_or_else(|| AuthError::Refresh {
                message: "Session has no refresh token".to_string(),
            })?;

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
            ("client_id", self.identity.client_id.as_str()),
        ];

        debug!(domain = %self.identity.domain, "Refreshing session token");

        let response = self
            .http
            .post(self.identity.token_url())
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Refresh {
                message: format!("Token refresh request failed: {}", e),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| AuthError::Refresh {
            message: format!("Failed to read token refresh response: {}", e),
        })?;
        if !status.is_success() {
            return Err(AuthError::Refresh {
                message: format!("HTTP {}: {}", status, describe_error_body(&body)),
            });
        }

        let mut token = parse_token_response(&body).map_err(|e| AuthError::Refresh {
            message: e.to_string(),
        })?;
        // Rotation is optional; keep the old refresh token if none came back.
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token);
        }

        let profile = token.id_token_profile().or(session.profile);
        let renewed = StoredSession { token, profile };
        self.save_session(&renewed)?;
        info!("Session renewed");
        Ok(renewed)
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<SessionToken, AuthError> {
        let body = format!(
            "grant_type={}&code={}&redirect_uri={}&client_id={}&code_verifier={}",
            urlencoding::encode("authorization_code"),
            urlencoding::encode(code),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&self.identity.client_id),
            urlencoding::encode(code_verifier),
        );

        debug!(domain = %self.identity.domain, "Exchanging authorization code for token");

        let response = self
            .http
            .post(self.identity.token_url())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| AuthError::TokenExchange {
                message: format!("Token exchange request failed: {}", e),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| AuthError::TokenExchange {
            message: format!("Failed to read token response: {}", e),
        })?;
        if !status.is_success() {
            return Err(AuthError::TokenExchange {
                message: format!("HTTP {}: {}", status, describe_error_body(&body)),
            });
        }

        parse_token_response(&body)
    }

    async fn fetch_userinfo(&self, token: &SessionToken) -> Result<UserProfile, AuthError> {
        let response = self
            .http
            .get(self.identity.userinfo_url())
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(|e| AuthError::Profile {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Profile {
                message: format!("userinfo returned HTTP {}", status),
            });
        }
        response.json().await.map_err(|e| AuthError::Profile {
            message: e.to_string(),
        })
    }

    async fn resolve_profile(&self, token: &SessionToken) -> Option<UserProfile> {
        if let Some(profile) = token.id_token_profile() {
            return Some(profile);
        }
        match self.fetch_userinfo(token).await {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!(error = %e, "No profile available for session");
                None
            }
        }
    }
}

/// Strip the authorization response from a location.
fn normalize_location(location: &Url) -> Url {
    let mut clean = location.clone();
    clean.set_query(None);
    clean.set_fragment(None);
    clean
}

#[async_trait]
impl Authenticator for SessionManager {
    async fn complete_redirect_if_present(
        &self,
        location: &Url,
    ) -> Result<Option<Url>, AuthError> {
        let params: HashMap<String, String> = location.query_pairs().into_owned().collect();
        let state = params.get("state");

        if let (Some(error), Some(_)) = (params.get("error"), state) {
            let _ = self.take_pending()?;
            return Err(AuthError::Provider {
                error: error.clone(),
                description: params
                    .get("error_description")
                    .cloned()
                    .unwrap_or_default(),
            });
        }

        let (Some(code), Some(state)) = (params.get("code"), state) else {
            return Ok(None);
        };

        let pending = self.take_pending()?.ok_or(AuthError::NoPendingLogin)?;
        if pending.state != *state {
            return Err(AuthError::StateMismatch);
        }
        if code.is_empty() {
            return Err(AuthError::TokenExchange {
                message: "Redirect did not contain an authorization code".to_string(),
            });
        }

        let token = self
            .exchange_code(code, &pending.code_verifier, &pending.redirect_uri)
            .await?;
        let profile = self.resolve_profile(&token).await;
        self.save_session(&StoredSession { token, profile })?;
        info!("Login completed");

        Ok(Some(normalize_location(location)))
    }

    async fn is_authenticated(&self) -> Result<bool, AuthError> {
        Ok(self.active_session().await?.is_some())
    }

    async fn profile(&self) -> Result<Option<UserProfile>, AuthError> {
        Ok(self.active_session().await?.and_then(|s| s.profile))
    }

    async fn login(&self) -> Result<Url, AuthError> {
        let pkce = pkce::generate_pkce_pair();
        let state = pkce::generate_state();

        let mut url =
            Url::parse(&self.identity.authorize_url()).map_err(|e| AuthError::InvalidUrl {
                message: format!("Invalid authorization URL: {}", e),
            })?;
        {
            let mut params = url.query_pairs_mut();
            params.append_pair("response_type", "code");
            params.append_pair("client_id", &self.identity.client_id);
            params.append_pair("redirect_uri", &self.identity.redirect_uri);
            params.append_pair("code_challenge", &pkce.challenge);
            params.append_pair("code_challenge_method", "S256");
            params.append_pair("state", &state);
            if !self.identity.scopes.is_empty() {
                params.append_pair("scope", &self.identity.scopes.join(" "));
            }
            if let Some(ref audience) = self.identity.audience {
                params.append_pair("audience", audience);
            }
        }

        let pending = PendingLogin {
            state,
            code_verifier: pkce.verifier,
            redirect_uri: self.identity.redirect_uri.clone(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&pending).map_err(|e| AuthError::Storage {
            message: format!("Failed to serialize pending login: {}", e),
        })?;
        self.store.store(&self.pending_key(), &json)?;

        debug!(url = %url, "Login initiated");
        Ok(url)
    }

    async fn logout(&self) -> Result<Url, AuthError> {
        self.clear_session()?;
        self.store.delete(&self.pending_key())?;

        let mut url =
            Url::parse(&self.identity.logout_url()).map_err(|e| AuthError::InvalidUrl {
                message: format!("Invalid logout URL: {}", e),
            })?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.identity.client_id)
            .append_pair("returnTo", &self.identity.redirect_uri);

        info!("Logged out");
        Ok(url)
    }
}

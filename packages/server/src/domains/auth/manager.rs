use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tracing::{error, info, warn};

use super::types::{OAuthErrorBody, TokenResponse};
use crate::domains::notify::{Notice, Notifier};
use crate::error::AuthError;
use crate::kernel::http::HttpRequest;
use crate::kernel::secret::SecretString;
use crate::kernel::token_store::{Credentials, TokenStore};
use crate::kernel::transport::ThrottledTransport;

/// Scopes requested during authorization.
const SCOPES: &str = "employer_vacancies employer_negotiations";

/// OAuth client registration on the upstream platform.
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_uri: String,
    /// e.g. `https://hh.ru`
    pub oauth_base: String,
}

impl OAuthSettings {
    fn token_url(&self) -> String {
        format!("{}/oauth/token", self.oauth_base.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TokenPolicy {
    /// Safety margin before expiry at which a refresh is due
    pub skew: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            skew: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Unauthenticated,
    Valid,
    Expiring,
    Invalid,
}

/// Keeps the upstream access token usable, refreshing it ahead of expiry.
pub struct TokenManager {
    transport: Arc<ThrottledTransport>,
    store: TokenStore,
    credentials: Credentials,
    oauth: OAuthSettings,
    policy: TokenPolicy,
    notifier: Arc<dyn Notifier>,
    /// The API answered 401 for the current token
    invalidated: bool,
    /// Refresh was rejected; only a new authorization code helps
    reauthorization_reason: Option<String>,
}

impl TokenManager {
    pub fn new(
        transport: Arc<ThrottledTransport>,
        store: TokenStore,
        credentials: Credentials,
        oauth: OAuthSettings,
        policy: TokenPolicy,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            transport,
            store,
            credentials,
            oauth,
            policy,
            notifier,
            invalidated: false,
            reauthorization_reason: None,
        }
    }

    pub fn state(&self) -> TokenState {
        self.state_at(Utc::now())
    }

    /// Token state as of `now`.
    ///
    /// A token with no recorded expiry is treated as valid until an API
    /// call proves otherwise. This can reuse a stale token for one round
    /// trip; the 401 path then refreshes it.
    pub fn state_at(&self, now: DateTime<Utc>) -> TokenState {
        if self.credentials.access_token.is_none() {
            return TokenState::Unauthenticated;
        }
        if self.invalidated {
            return TokenState::Invalid;
        }
        match self.credentials.expires_at {
            None => TokenState::Valid,
            Some(expires_at) => {
                let skew = chrono::Duration::from_std(self.policy.skew)
                    .unwrap_or_else(|_| chrono::Duration::zero());
                if now < expires_at - skew {
                    TokenState::Valid
                } else {
                    TokenState::Expiring
                }
            }
        }
    }

    pub fn has_access_token(&self) -> bool {
        self.credentials.access_token.is_some()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.credentials.expires_at
    }

    pub fn needs_reauthorization(&self) -> bool {
        self.reauthorization_reason.is_some()
    }

    /// URL the operator opens to grant access and obtain a code.
    pub fn authorization_url(&self) -> String {
        let base = format!("{}/oauth/authorize", self.oauth.oauth_base.trim_end_matches('/'));
        let params = [
            ("response_type", "code"),
            ("client_id", self.oauth.client_id.as_str()),
            ("redirect_uri", self.oauth.redirect_uri.as_str()),
            ("scope", SCOPES),
        ];
        match url::Url::parse_with_params(&base, params) {
            Ok(url) => url.to_string(),
            Err(_) => base,
        }
    }

    /// Headers for an authenticated call, refreshing first if the token is
    /// about to expire or was rejected.
    pub async fn auth_headers(&mut self) -> Result<HeaderMap, AuthError> {
        if let Some(reason) = &self.reauthorization_reason {
            return Err(AuthError::ReauthorizationRequired {
                reason: reason.clone(),
            });
        }

        match self.state() {
            TokenState::Unauthenticated => return Err(AuthError::Unauthenticated),
            TokenState::Valid => {}
            TokenState::Expiring | TokenState::Invalid => self.refresh().await?,
        }

        self.bearer_headers()
    }

    /// The API rejected the current token: mark it invalid and refresh once.
    pub async fn handle_unauthorized(&mut self) -> Result<(), AuthError> {
        warn!("access token rejected by API, refreshing");
        self.invalidated = true;
        self.refresh().await
    }

    /// Exchange the refresh token for a new token pair.
    pub async fn refresh(&mut self) -> Result<(), AuthError> {
        let Some(refresh_token) = self.credentials.refresh_token.clone() else {
            return Err(self.require_reauthorization("no refresh token stored").await);
        };

        info!("refreshing access token");
        let request = HttpRequest::post_form(
            self.oauth.token_url(),
            [
                ("grant_type", "refresh_token".to_string()),
                ("refresh_token", refresh_token),
                ("client_id", self.oauth.client_id.clone()),
                ("client_secret", self.oauth.client_secret.expose().to_string()),
            ],
        );

        let Some(response) = self.transport.send(request).await else {
            let reason = "token endpoint unreachable".to_string();
            error!(%reason, "token refresh failed");
            self.notifier
                .notify(Notice::error(format!("Token refresh failed: {reason}")))
                .await;
            return Err(AuthError::AuthExpired { reason });
        };

        if response.status.is_server_error() {
            let reason = format!("token endpoint returned {}", response.status);
            error!(%reason, "token refresh failed");
            self.notifier
                .notify(Notice::error(format!("Token refresh failed: {reason}")))
                .await;
            return Err(AuthError::AuthExpired { reason });
        }

        if !response.is_success() {
            let body: OAuthErrorBody = response.json().unwrap_or_default();
            let reason = format!("{} ({})", body.describe(&response.body), response.status);
            return Err(self.require_reauthorization(&reason).await);
        }

        let grant = TokenResponse::from_body(&response.body);
        if grant.access_token.is_none() {
            return Err(self
                .require_reauthorization("refresh response carried no access token")
                .await);
        }

        let expires_in = grant.expires_in;
        self.apply(grant).await;
        info!(expires_in, "access token refreshed");
        self.notifier
            .notify(Notice::Log(format!(
                "Access token refreshed (expires in {}s)",
                expires_in.map_or_else(|| "?".to_string(), |s| s.to_string())
            )))
            .await;
        Ok(())
    }

    /// One-time bootstrap: trade an authorization code for the first token pair.
    pub async fn exchange_code(&mut self, code: &str) -> Result<(), AuthError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AuthError::Exchange {
                reason: "empty authorization code".into(),
            });
        }

        info!("exchanging authorization code for tokens");
        let request = HttpRequest::post_form(
            self.oauth.token_url(),
            [
                ("grant_type", "authorization_code".to_string()),
                ("client_id", self.oauth.client_id.clone()),
                ("client_secret", self.oauth.client_secret.expose().to_string()),
                ("code", code.to_string()),
                ("redirect_uri", self.oauth.redirect_uri.clone()),
            ],
        );

        let response = self
            .transport
            .send(request)
            .await
            .ok_or_else(|| AuthError::Exchange {
                reason: "token endpoint unreachable".into(),
            })?;

        if !response.is_success() {
            let body: OAuthErrorBody = response.json().unwrap_or_default();
            let reason = format!("{} ({})", body.describe(&response.body), response.status);
            error!(%reason, "authorization code exchange rejected");
            self.notifier
                .notify(Notice::error(format!("Token exchange failed: {reason}")))
                .await;
            return Err(AuthError::Exchange { reason });
        }

        let grant = TokenResponse::from_body(&response.body);
        if grant.access_token.is_none() {
            return Err(AuthError::Exchange {
                reason: "token response carried no access token".into(),
            });
        }

        let expires_in = grant.expires_in;
        self.apply(grant).await;
        self.reauthorization_reason = None;
        info!(expires_in, "access token issued");
        self.notifier
            .notify(Notice::Log(format!(
                "New access token issued (expires in {}s)",
                expires_in.map_or_else(|| "?".to_string(), |s| s.to_string())
            )))
            .await;
        Ok(())
    }

    fn bearer_headers(&self) -> Result<HeaderMap, AuthError> {
        let token = self
            .credentials
            .access_token
            .as_deref()
            .ok_or(AuthError::Unauthenticated)?;
        let bearer = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
            AuthError::ReauthorizationRequired {
                reason: "stored access token is not a valid header value".into(),
            }
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Adopt a freshly issued grant and persist it right away.
    async fn apply(&mut self, grant: TokenResponse) {
        self.credentials.access_token = grant.access_token;
        if let Some(refresh_token) = grant.refresh_token.filter(|t| !t.is_empty()) {
            self.credentials.refresh_token = Some(refresh_token);
        }
        self.credentials.expires_at = grant.expires_in.and_then(|secs| {
            let expires_at = chrono::Duration::try_seconds(secs)
                .and_then(|lifetime| Utc::now().checked_add_signed(lifetime));
            if expires_at.is_none() {
                warn!(expires_in = secs, "token lifetime out of range, recording no expiry");
            }
            expires_at
        });
        self.invalidated = false;

        if let Err(e) = self.store.save(&self.credentials) {
            error!(error = %e, "failed to persist tokens; continuing with in-memory copy");
            self.notifier
                .notify(Notice::error(format!(
                    "Could not save tokens, a restart will need re-authorization: {e}"
                )))
                .await;
        }
    }

    async fn require_reauthorization(&mut self, reason: &str) -> AuthError {
        error!(reason, "token refresh rejected, re-authorization required");
        self.reauthorization_reason = Some(reason.to_string());
        self.notifier
            .notify(Notice::error(format!(
                "Access token expired and could not be refreshed ({reason}). Authorize again: {}",
                self.authorization_url()
            )))
            .await;
        AuthError::ReauthorizationRequired {
            reason: reason.to_string(),
        }
    }
}

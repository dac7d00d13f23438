//! Token acquisition and the session value that carries it

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::fmt;

use super::client::Portal;
use super::common::{decode, remote_error, FormParams, RemoteError};
use super::error::{ApiError, Result};

pub const DEFAULT_TOKEN_EXPIRATION_MINUTES: u32 = 60;

/// Authenticated identity plus the bearer token issued for it.
///
/// A session is replaced wholesale on refresh; nothing mutates it in place.
/// Components never check expiry for the caller.
#[derive(Clone)]
pub struct Session {
    username: String,
    password: String,
    portal_url: String,
    token_url: String,
    token: String,
    expires: DateTime<Utc>,
    expiration_minutes: u32,
}

impl Session {
    /// Wrap a token that was issued elsewhere. Such a session cannot be refreshed.
    pub fn from_token(
        portal_url: &str,
        username: &str,
        token: &str,
        expires: DateTime<Utc>,
    ) -> Self {
        let portal_url = portal_url.trim_end_matches('/').to_string();
        Self {
            username: username.to_string(),
            password: String::new(),
            token_url: format!("{}/sharing/rest/generateToken", portal_url),
            portal_url,
            token: token.to_string(),
            expires,
            expiration_minutes: DEFAULT_TOKEN_EXPIRATION_MINUTES,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn portal_url(&self) -> &str {
        &self.portal_url
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires
    }

    pub fn is_expired(&self) -> bool {
        !self.is_valid_at(Utc::now())
    }

    /// True if the token lapses within `window` from now.
    pub fn expires_within(&self, window: Duration) -> bool {
        !self.is_valid_at(Utc::now() + window)
    }

    pub fn can_refresh(&self) -> bool {
        !self.password.is_empty()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .field("portal_url", &self.portal_url)
            .field("token", &"***")
            .field("expires", &self.expires)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    expires: Option<i64>,
}

impl Portal {
    /// POST {portal}/sharing/rest/generateToken
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
        expiration_minutes: u32,
    ) -> Result<Session> {
        let token_url = self.sharing_url("/generateToken");
        let form = FormParams::new()
            .add("username", username)
            .add("password", password)
            .add("client", "referer")
            .add("referer", self.base_url())
            .add("expiration", expiration_minutes)
            .add("f", "json");

        let requested_at = Utc::now();
        let value = self.post(&token_url, &form).await?;

        if let Some(err) = remote_error(&value) {
            tracing::error!("Token request for {} rejected: {}", username, err);
            return Err(ApiError::Auth(err));
        }

        let response: TokenResponse = decode(value, "token response")?;
        let token = response.token.ok_or_else(|| {
            ApiError::MalformedResponse("token response did not include `token`".to_string())
        })?;

        let expires = response
            .expires
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_else(|| requested_at + Duration::minutes(i64::from(expiration_minutes)));

        tracing::info!("Acquired token for {} (expires {})", username, expires);

        Ok(Session {
            username: username.to_string(),
            password: password.to_string(),
            portal_url: self.base_url().to_string(),
            token_url,
            token,
            expires,
            expiration_minutes,
        })
    }

    /// Re-run token acquisition with the session's stored credentials.
    pub async fn refresh(&self, session: &Session) -> Result<Session> {
        if !session.can_refresh() {
            return Err(ApiError::Auth(RemoteError::new(
                None,
                "session was built from a bare token and holds no credentials",
            )));
        }
        self.authenticate(
            &session.username,
            &session.password,
            session.expiration_minutes,
        )
        .await
    }
}

//! Environment-driven configuration

use std::time::Duration;

use crate::api::{Portal, Session, TransportConfig, DEFAULT_TOKEN_EXPIRATION_MINUTES};

pub const DEFAULT_PORTAL_URL: &str = "https://www.arcgis.com";

pub const ENV_PORTAL_URL: &str = "ARCREST_PORTAL_URL";
pub const ENV_USERNAME: &str = "ARCREST_USERNAME";
pub const ENV_PASSWORD: &str = "ARCREST_PASSWORD";
pub const ENV_TOKEN_EXPIRATION: &str = "ARCREST_TOKEN_EXPIRATION";
pub const ENV_INSECURE: &str = "ARCREST_INSECURE";
pub const ENV_TIMEOUT_SECONDS: &str = "ARCREST_TIMEOUT_SECONDS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{name} has an invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Clone)]
pub struct PortalConfig {
    pub portal_url: String,
    pub username: String,
    pub password: String,
    pub token_expiration_minutes: u32,
    pub insecure: bool,
    pub timeout: Duration,
}

impl std::fmt::Debug for PortalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalConfig")
            .field("portal_url", &self.portal_url)
            .field("username", &self.username)
            .field("password", &"***")
            .field("token_expiration_minutes", &self.token_expiration_minutes)
            .field("insecure", &self.insecure)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn parsed<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

impl PortalConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let portal_url =
            std::env::var(ENV_PORTAL_URL).unwrap_or_else(|_| DEFAULT_PORTAL_URL.to_string());

        Ok(Self {
            portal_url,
            username: required(ENV_USERNAME)?,
            password: required(ENV_PASSWORD)?,
            token_expiration_minutes: parsed(
                ENV_TOKEN_EXPIRATION,
                DEFAULT_TOKEN_EXPIRATION_MINUTES,
            )?,
            insecure: parsed(ENV_INSECURE, false)?,
            timeout: Duration::from_secs(parsed(ENV_TIMEOUT_SECONDS, 30u64)?),
        })
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            insecure: self.insecure,
            request_timeout: self.timeout,
            ..Default::default()
        }
    }

    pub fn portal(&self) -> crate::api::Result<Portal> {
        Portal::with_config(&self.portal_url, &self.transport_config())
    }

    /// Build the client and acquire a token with the configured credentials.
    pub async fn connect(&self) -> crate::api::Result<(Portal, Session)> {
        let portal = self.portal()?;
        let session = portal
            .authenticate(&self.username, &self.password, self.token_expiration_minutes)
            .await?;
        Ok((portal, session))
    }
}

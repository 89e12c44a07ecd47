//! Client configuration: the identity service base URL, the fixed per-request
//! timeout and the profile endpoint used to verify a restored session.
//! Environment overrides are optional; blank values are ignored so a stray
//! empty variable never clobbers a default.

use crate::error::{Error, Result};
use std::{env, time::Duration};
use url::Url;

/// Default request timeout applied to every call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Endpoint used by bootstrap to verify a persisted access token.
pub const DEFAULT_PROFILE_PATH: &str = "/v1/auth/me";

pub const ENV_API_BASE_URL: &str = "ADMINAUTH_API_BASE_URL";
pub const ENV_TIMEOUT_SECONDS: &str = "ADMINAUTH_TIMEOUT_SECONDS";
pub const ENV_PROFILE_PATH: &str = "ADMINAUTH_PROFILE_PATH";

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Debug)]
pub struct ClientConfig {
    api_base_url: Url,
    timeout: Duration,
    profile_path: String,
    user_agent: String,
}

impl ClientConfig {
    /// # Errors
    /// Returns an error if `api_base_url` is not an absolute http(s) URL.
    pub fn new(api_base_url: &str) -> Result<Self> {
        Ok(Self {
            api_base_url: parse_base_url(api_base_url)?,
            timeout: DEFAULT_TIMEOUT,
            profile_path: DEFAULT_PROFILE_PATH.to_string(),
            user_agent: APP_USER_AGENT.to_string(),
        })
    }

    /// Loads the config from `ADMINAUTH_*` environment variables.
    ///
    /// # Errors
    /// Returns an error if the base URL is missing or invalid, or if the timeout is not a
    /// positive number of seconds.
    pub fn from_env() -> Result<Self> {
        let base_url = read_env(ENV_API_BASE_URL)
            .ok_or_else(|| Error::Config(format!("{ENV_API_BASE_URL} is not configured.")))?;

        let mut config = Self::new(&base_url)?;

        if let Some(value) = read_env(ENV_TIMEOUT_SECONDS) {
            config.timeout = parse_timeout_seconds(&value)?;
        }

        if let Some(value) = read_env(ENV_PROFILE_PATH) {
            config.profile_path = value;
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_profile_path(mut self, path: &str) -> Self {
        self.profile_path = path.trim().to_string();
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = user_agent.to_string();
        self
    }

    #[must_use]
    pub fn api_base_url(&self) -> &Url {
        &self.api_base_url
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn profile_path(&self) -> &str {
        &self.profile_path
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

/// Parses a timeout given in whole seconds; zero is rejected.
///
/// # Errors
/// Returns an error if the value is not a positive integer.
pub fn parse_timeout_seconds(value: &str) -> Result<Duration> {
    match value.trim().parse::<u64>() {
        Ok(seconds) if seconds > 0 => Ok(Duration::from_secs(seconds)),
        _ => Err(Error::Config(format!(
            "Invalid timeout '{value}': expected a positive number of seconds."
        ))),
    }
}

fn parse_base_url(value: &str) -> Result<Url> {
    let url = Url::parse(value.trim())
        .map_err(|err| Error::Config(format!("Invalid API base URL '{value}': {err}")))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(Error::Config(format!(
                "Invalid API base URL '{value}': unsupported scheme {scheme}"
            )))
        }
    }

    if url.host().is_none() {
        return Err(Error::Config(format!(
            "Invalid API base URL '{value}': no host specified"
        )));
    }

    Ok(url)
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|v| normalize_value(&v))
}

fn normalize_value(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

//! Identity service endpoints. These calls go through the base client only:
//! a 401 from login or refresh is an answer, not a reason to refresh again.
//! Payloads carry credentials and must never be logged.

use crate::{
    config::ClientConfig,
    error::Result,
    http::client::{ApiRequest, HttpClient},
    session::types::{AuthResponse, ProfileResponse, RefreshResponse, TokenPair, User},
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::instrument;

pub const LOGIN_PATH: &str = "/v1/auth/login";
pub const REGISTER_PATH: &str = "/v1/auth/register";
pub const LOGOUT_PATH: &str = "/v1/auth/logout";
pub const REFRESH_PATH: &str = "/v1/auth/refresh-token";

#[derive(Clone, Debug)]
pub struct AuthApi {
    http: HttpClient,
    profile_path: String,
}

impl AuthApi {
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(config)?,
            profile_path: config.profile_path().to_string(),
        })
    }

    #[must_use]
    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// # Errors
    /// Returns the server's error (bad credentials arrive as `Error::Http`).
    #[instrument(skip_all)]
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<AuthResponse> {
        let request = ApiRequest::post(LOGIN_PATH).with_body(json!({
            "email": email,
            "password": password.expose_secret(),
        }));
        self.http.send(&request, None).await?.json()
    }

    /// # Errors
    /// Returns the server's error (duplicate accounts arrive as `Error::Http`).
    #[instrument(skip_all)]
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &SecretString,
    ) -> Result<AuthResponse> {
        let request = ApiRequest::post(REGISTER_PATH).with_body(json!({
            "email": email,
            "password": password.expose_secret(),
            "name": name,
        }));
        self.http.send(&request, None).await?.json()
    }

    /// # Errors
    /// Returns an error if the server cannot be reached or rejects the call.
    #[instrument(skip_all)]
    pub async fn logout(&self, access_token: Option<&str>) -> Result<()> {
        self.http
            .send(&ApiRequest::post(LOGOUT_PATH), access_token)
            .await?;
        Ok(())
    }

    /// Verifies `access_token` and returns the current user.
    ///
    /// # Errors
    /// Returns an error if the token is rejected or the body is not a user.
    #[instrument(skip_all)]
    pub async fn profile(&self, access_token: &str) -> Result<User> {
        let response = self
            .http
            .send(&ApiRequest::get(self.profile_path.as_str()), Some(access_token))
            .await?;
        Ok(response.json::<ProfileResponse>()?.into_user())
    }

    /// Exchanges a refresh token for a new token pair.
    ///
    /// # Errors
    /// Returns an error if the exchange is rejected or the body has no tokens.
    #[instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let request = ApiRequest::post(REFRESH_PATH).with_body(json!({
            "refreshToken": refresh_token,
        }));
        let response: RefreshResponse = self.http.send(&request, None).await?.json()?;
        Ok(response.tokens)
    }
}

//! Authenticated request pipeline.
//!
//! Stages, in order:
//!
//! 1. **attach-auth**: the current access token from the `TokenProvider` is
//!    sent as a bearer token.
//! 2. **observe-response**: non-success statuses become `Error::Http`.
//! 3. **on-401-refresh-and-retry**: a 401 asks the provider for a fresh token
//!    once; a token replays the request, no token ends the session.
//!
//! The attempt counter travels with the call instead of being stored on the
//! request, so a replayed request can never loop.

use crate::{
    error::Result,
    http::client::{ApiRequest, ApiResponse, HttpClient},
};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// First send plus one replay after a refresh.
pub const MAX_ATTEMPTS: u8 = 2;

/// Source of bearer tokens for the pipeline. The session manager implements
/// it; tests substitute their own.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Token to attach to the next request, if any.
    fn access_token(&self) -> Option<String>;

    /// Called after `rejected` drew a 401. Returns the token to replay with,
    /// or `None` when no valid session remains. Concurrent callers must share
    /// a single refresh.
    async fn refresh_after_unauthorized(&self, rejected: Option<String>) -> Option<String>;

    /// Called when a 401 is final.
    async fn session_rejected(&self);
}

#[derive(Clone)]
pub struct AuthorizedClient {
    http: HttpClient,
    provider: Arc<dyn TokenProvider>,
}

impl AuthorizedClient {
    pub fn new(http: HttpClient, provider: Arc<dyn TokenProvider>) -> Self {
        Self { http, provider }
    }

    /// Runs `request` through the full pipeline.
    ///
    /// # Errors
    /// Returns the first 401 when recovery fails, otherwise the error status
    /// or transport failure unchanged.
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let mut token = self.provider.access_token();
        let mut attempt: u8 = 1;
        let mut first_rejection = None;

        loop {
            let err = match self.http.send(request, token.as_deref()).await {
                Err(err) if err.is_unauthorized() => err,
                other => return other,
            };

            warn!(
                attempt,
                method = %request.method(),
                path = request.path(),
                "request rejected as unauthorized"
            );

            if attempt >= MAX_ATTEMPTS {
                self.provider.session_rejected().await;
                return Err(first_rejection.unwrap_or(err));
            }

            match self.provider.refresh_after_unauthorized(token).await {
                Some(fresh) => {
                    debug!(attempt, "replaying request with refreshed token");
                    first_rejection = Some(err);
                    token = Some(fresh);
                    attempt += 1;
                }
                None => {
                    self.provider.session_rejected().await;
                    return Err(err);
                }
            }
        }
    }

    /// # Errors
    /// See [`AuthorizedClient::execute`]; also fails if the body does not decode.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute(&ApiRequest::get(path)).await?.json()
    }

    /// # Errors
    /// See [`AuthorizedClient::execute`]; also fails if the body does not decode.
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let request = ApiRequest::post(path).json(body)?;
        self.execute(&request).await?.json()
    }

    /// # Errors
    /// See [`AuthorizedClient::execute`]; also fails if the body does not decode.
    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let request = ApiRequest::put(path).json(body)?;
        self.execute(&request).await?.json()
    }

    /// # Errors
    /// See [`AuthorizedClient::execute`]; also fails if the body does not decode.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute(&ApiRequest::delete(path)).await?.json()
    }
}

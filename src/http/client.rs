//! Base HTTP client for the identity service. One `send` runs the first two
//! stages of the request pipeline: attach the bearer token, then observe the
//! response and turn non-success statuses into `Error::Http` with the
//! original status and payload. Refresh and retry live one level up, in
//! `AuthorizedClient`.

use crate::{
    config::ClientConfig,
    error::{Error, Result},
};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Client, Method, RequestBuilder, Response, StatusCode,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, info_span, Instrument};
use url::Url;

/// A replayable request description. Bodies are stored as JSON values so the
/// same request can be re-issued after a token refresh.
#[derive(Clone, Debug, PartialEq)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// # Errors
    /// Returns an error if `body` cannot be encoded as JSON.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        let value = serde_json::to_value(body)
            .map_err(|err| Error::Serialization(format!("Failed to encode request: {err}")))?;
        self.body = Some(value);
        Ok(self)
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }
}

#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    /// Decodes the body; an empty body decodes as JSON `null`.
    ///
    /// # Errors
    /// Returns an error if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let raw = if self.body.trim().is_empty() {
            "null"
        } else {
            self.body.as_str()
        };
        serde_json::from_str(raw)
            .map_err(|err| Error::Parse(format!("Failed to decode response: {err}")))
    }
}

#[derive(Clone, Debug)]
pub struct HttpClient {
    client: Client,
    base_url: Url,
}

impl HttpClient {
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .user_agent(config.user_agent())
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .map_err(|err| Error::Config(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: config.api_base_url().clone(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Joins `path` onto the base URL, keeping any path prefix the base has.
    ///
    /// # Errors
    /// Returns an error if the result is not a valid URL.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim().trim_start_matches('/');
        let joined = if path.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{path}")
        };
        Url::parse(&joined)
            .map_err(|err| Error::Config(format!("Invalid endpoint '{joined}': {err}")))
    }

    /// Issues one attempt of `request`, authenticated with `bearer` if given.
    ///
    /// # Errors
    /// Returns `Error::Http` for non-success statuses, `Error::Timeout` or
    /// `Error::Network` for transport failures.
    pub async fn send(&self, request: &ApiRequest, bearer: Option<&str>) -> Result<ApiResponse> {
        let url = self.endpoint(request.path())?;

        let mut builder = self.client.request(request.method().clone(), url.clone());
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }
        let builder = attach_auth(builder, bearer);

        let span = info_span!(
            "http.request",
            http.method = %request.method(),
            url = %url,
            authenticated = bearer.is_some()
        );
        let response = builder.send().instrument(span).await?;

        observe(response).await
    }
}

/// Pipeline stage: adds `Authorization: Bearer <token>` when a token exists.
#[must_use]
pub fn attach_auth(builder: RequestBuilder, bearer: Option<&str>) -> RequestBuilder {
    match bearer {
        Some(token) if !token.is_empty() => {
            builder.header(AUTHORIZATION, format!("Bearer {token}"))
        }
        _ => builder,
    }
}

/// Pipeline stage: reads the body and classifies the status.
///
/// # Errors
/// Returns `Error::Http` carrying the status and payload for any non-success status.
pub async fn observe(response: Response) -> Result<ApiResponse> {
    let status = response.status();
    let body = response.text().await?;

    debug!(status = status.as_u16(), "response received");

    if status.is_success() {
        Ok(ApiResponse { status, body })
    } else {
        Err(Error::from_response(status, &body))
    }
}

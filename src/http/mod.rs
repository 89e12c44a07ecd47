//! HTTP access to the identity service: a base client that attaches bearer
//! tokens and classifies responses, the auth endpoint wrappers, and the
//! authorized pipeline that refreshes and replays on 401.

pub mod api;
pub mod client;
pub mod pipeline;

pub use api::AuthApi;
pub use client::{ApiRequest, ApiResponse, HttpClient};
pub use pipeline::{AuthorizedClient, TokenProvider, MAX_ATTEMPTS};

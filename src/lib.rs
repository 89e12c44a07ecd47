//! # adminauth (admin console session client)
//!
//! `adminauth` keeps an admin console signed in against an identity service
//! that issues short-lived access tokens and long-lived refresh tokens.
//!
//! ## Session lifecycle
//!
//! [`AuthSessionManager`] restores persisted tokens at startup (bootstrap),
//! signs users in and out, and is the only writer of the persisted session.
//! Consumers observe the [`Session`] snapshot or subscribe to changes.
//!
//! ## Request pipeline
//!
//! [`AuthorizedClient`] attaches the current access token, surfaces error
//! statuses unchanged and, on a 401, refreshes the token once and replays the
//! request. Concurrent 401s share a single refresh.
//!
//! ## Guards and forms
//!
//! [`RouteGuard`] turns a session snapshot into allow/redirect decisions;
//! [`forms`] validates credentials and reduces failures to a display message.

pub mod cli;
pub mod config;
pub mod error;
pub mod forms;
pub mod http;
pub mod session;

pub use config::ClientConfig;
pub use error::{Error, Result};
pub use forms::{FormError, LoginForm, RegisterForm};
pub use http::{AuthApi, AuthorizedClient, TokenProvider};
pub use session::{
    AuthSessionManager, FileStore, GuardDecision, KeyValueStore, MemoryStore, Navigator, Route,
    RouteGuard, Session, SessionState, TracingNavigator, User,
};

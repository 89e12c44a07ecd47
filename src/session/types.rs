//! Identity records and token payloads exchanged with the identity service,
//! plus the derived session snapshot published by the manager. Token fields
//! are credentials: `Debug` output redacts them.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub is_email_verified: bool,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub token: String,
    #[serde(default)]
    pub expires: String,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("token", &"[REDACTED]")
            .field("expires", &self.expires)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: Token,
    pub refresh: Token,
}

/// Body returned by login and register.
#[derive(Clone, Debug, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub tokens: TokenPair,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RefreshResponse {
    pub tokens: TokenPair,
}

/// Profile responses come either wrapped (`{"user": {...}}`) or bare.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ProfileResponse {
    Wrapped { user: User },
    Bare(User),
}

impl ProfileResponse {
    #[must_use]
    pub fn into_user(self) -> User {
        match self {
            Self::Wrapped { user } | Self::Bare(user) => user,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Uninitialized,
    Bootstrapping,
    Authenticated,
    RefreshingToken,
    Anonymous,
}

/// Snapshot of the session as seen by guards and forms.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Session {
    pub state: SessionState,
    pub user: Option<User>,
}

impl Session {
    pub(crate) fn authenticated(user: User) -> Self {
        Self {
            state: SessionState::Authenticated,
            user: Some(user),
        }
    }

    pub(crate) fn anonymous() -> Self {
        Self {
            state: SessionState::Anonymous,
            user: None,
        }
    }

    /// True until bootstrap has resolved.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(
            self.state,
            SessionState::Uninitialized | SessionState::Bootstrapping
        )
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(
            self.state,
            SessionState::Authenticated | SessionState::RefreshingToken
        ) && self.user.is_some()
    }
}

//! Navigation side effects requested by the session manager. Route-table
//! wiring lives with the embedding application; the manager only says where
//! the user should end up.

use serde::{Serialize, Serializer};
use std::fmt;
use tracing::info;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    /// Default authenticated view.
    Home,
    SignIn,
    SignUp,
    Path(String),
}

impl Route {
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Home => "/",
            Self::SignIn => "/signin",
            Self::SignUp => "/signup",
            Self::Path(path) => path,
        }
    }

    /// Maps a URL path back to a route.
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        match path.trim() {
            "" | "/" => Self::Home,
            "/signin" => Self::SignIn,
            "/signup" => Self::SignUp,
            other => Self::Path(other.to_string()),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

impl Serialize for Route {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.path())
    }
}

pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

/// Navigator for headless use: records the transition in the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn navigate(&self, route: Route) {
        info!(route = %route, "navigate");
    }
}

//! Route guards. These are pure functions of the session snapshot; the
//! embedding router performs the redirect. Guards are a UX convenience only,
//! the API remains the authority on access.

use crate::session::{navigator::Route, types::Session};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "route", rename_all = "snake_case")]
pub enum GuardDecision {
    /// Bootstrap has not resolved; render nothing.
    Pending,
    Allow,
    Redirect(Route),
}

pub struct RouteGuard;

impl RouteGuard {
    /// Protected views: allowed iff authenticated, otherwise sent to sign-in.
    /// The attempted destination is not preserved.
    #[must_use]
    pub fn require_auth(session: &Session) -> GuardDecision {
        if session.is_loading() {
            GuardDecision::Pending
        } else if session.is_authenticated() {
            GuardDecision::Allow
        } else {
            GuardDecision::Redirect(Route::SignIn)
        }
    }

    /// Sign-in and sign-up views: authenticated users go to the default view.
    #[must_use]
    pub fn guest_only(session: &Session) -> GuardDecision {
        if session.is_loading() {
            GuardDecision::Pending
        } else if session.is_authenticated() {
            GuardDecision::Redirect(Route::Home)
        } else {
            GuardDecision::Allow
        }
    }

    /// Picks the guard for a destination: the sign-in and sign-up views are
    /// guest-only, everything else requires a session.
    #[must_use]
    pub fn evaluate(session: &Session, destination: &Route) -> GuardDecision {
        match destination {
            Route::SignIn | Route::SignUp => Self::guest_only(session),
            Route::Home | Route::Path(_) => Self::require_auth(session),
        }
    }
}

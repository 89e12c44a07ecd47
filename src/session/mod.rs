//! Session lifecycle: persisted tokens, the manager state machine, and the
//! route guards that read it.

pub mod guard;
pub mod manager;
pub mod navigator;
pub mod store;
pub mod types;

pub use guard::{GuardDecision, RouteGuard};
pub use manager::AuthSessionManager;
pub use navigator::{Navigator, Route, TracingNavigator};
pub use store::{FileStore, KeyValueStore, MemoryStore, SessionStore};
pub use types::{Session, SessionState, Token, TokenPair, User};

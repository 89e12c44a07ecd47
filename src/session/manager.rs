//! Auth session manager.
//!
//! Owns the session state machine
//! (`Uninitialized → Bootstrapping → {Authenticated, Anonymous}`, with a
//! transient `RefreshingToken` while an authenticated session exchanges its
//! refresh token) and is the only writer of the persisted session. Consumers
//! read state through [`AuthSessionManager::session`] or a watch receiver and
//! send authenticated requests through [`AuthSessionManager::client`].
//!
//! Token refreshes are serialized by `refresh_lock`: a 401 handler that finds
//! its rejected token already replaced reuses the replacement instead of
//! exchanging the refresh token again. Writes that finish after the session
//! was established or ended elsewhere (a refresh or bootstrap outliving a
//! logout) are dropped by comparing session epochs.

use crate::{
    error::{Error, Result},
    http::{AuthApi, AuthorizedClient, TokenProvider},
    session::{
        navigator::{Navigator, Route},
        store::{KeyValueStore, SessionStore},
        types::{AuthResponse, Session, SessionState, User},
    },
};
use async_trait::async_trait;
use secrecy::SecretString;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, instrument, warn};

#[derive(Clone)]
pub struct AuthSessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    api: AuthApi,
    store: SessionStore,
    navigator: Arc<dyn Navigator>,
    session: watch::Sender<Session>,
    refresh_lock: Mutex<()>,
    /// Bumped whenever a session is established or ended.
    epoch: StdMutex<u64>,
}

enum Restored {
    Verified(User),
    Discard,
    Empty,
}

enum Refreshed {
    Stored(String),
    Superseded,
    Failed(Error),
}

impl AuthSessionManager {
    pub fn new(
        api: AuthApi,
        store: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let (session, _) = watch::channel(Session::default());
        Self {
            inner: Arc::new(Inner {
                api,
                store: SessionStore::new(store),
                navigator,
                session,
                refresh_lock: Mutex::new(()),
                epoch: StdMutex::new(0),
            }),
        }
    }

    #[must_use]
    pub fn session(&self) -> Session {
        self.inner.session.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.session.subscribe()
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.inner.session.borrow().user.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.inner.session.borrow().is_authenticated()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.inner.session.borrow().is_loading()
    }

    /// Client whose requests carry this session's token and recover from 401.
    #[must_use]
    pub fn client(&self) -> AuthorizedClient {
        AuthorizedClient::new(self.inner.api.http().clone(), Arc::new(self.clone()))
    }

    /// Restores the persisted session. Runs once; later calls return the
    /// current snapshot.
    #[instrument(skip_all)]
    pub async fn bootstrap(&self) -> Session {
        let started = self.inner.session.send_if_modified(|session| {
            if session.state == SessionState::Uninitialized {
                session.state = SessionState::Bootstrapping;
                true
            } else {
                false
            }
        });

        if !started {
            debug!("bootstrap already ran");
            return self.session();
        }

        let epoch = self.epoch();
        let restored = self.restore().await;

        self.with_epoch(|current| {
            // A login or logout that finished while bootstrap was in flight wins.
            let bootstrapping = self.inner.session.borrow().state == SessionState::Bootstrapping;
            if *current != epoch || !bootstrapping {
                debug!("session changed during bootstrap");
                return;
            }

            let session = match restored {
                Restored::Verified(user) => {
                    if let Err(err) = self.inner.store.persist_user(&user) {
                        warn!("Failed to cache refreshed user: {}", err);
                    }
                    info!(user_id = %user.id, "session restored");
                    Session::authenticated(user)
                }
                Restored::Discard => {
                    self.discard_persisted();
                    Session::anonymous()
                }
                Restored::Empty => Session::anonymous(),
            };
            self.inner.session.send_replace(session);
        });

        self.session()
    }

    /// Reads and verifies the persisted session without writing anything.
    async fn restore(&self) -> Restored {
        let store = &self.inner.store;

        let (token, user) = match (store.access_token(), store.user()) {
            (Ok(token), Ok(user)) => (token, user),
            (Err(err), _) | (_, Err(err)) => {
                error!("Error reading persisted session: {}", err);
                return Restored::Discard;
            }
        };

        let (Some(token), Some(_)) = (token, user) else {
            if store.has_any() {
                debug!("discarding partial persisted session");
                return Restored::Discard;
            }
            return Restored::Empty;
        };

        match self.inner.api.profile(&token).await {
            Ok(user) => Restored::Verified(user),
            Err(err) => {
                error!("Error initializing auth: {}", err);
                Restored::Discard
            }
        }
    }

    /// # Errors
    /// Returns the server's error (for display) or a storage error. A server
    /// error leaves the session unchanged; a storage error ends it.
    #[instrument(skip_all)]
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<User> {
        let response = self.inner.api.login(email, password).await?;
        let user = self.establish(response)?;
        self.inner.navigator.navigate(Route::Home);
        Ok(user)
    }

    /// Creates an account and signs into it.
    ///
    /// # Errors
    /// Returns the server's error (for display) or a storage error. A server
    /// error leaves the session unchanged; a storage error ends it.
    #[instrument(skip_all)]
    pub async fn register(&self, name: &str, email: &str, password: &SecretString) -> Result<User> {
        let response = self.inner.api.register(name, email, password).await?;
        let user = self.establish(response)?;
        self.inner.navigator.navigate(Route::Home);
        Ok(user)
    }

    fn establish(&self, response: AuthResponse) -> Result<User> {
        let AuthResponse { user, tokens } = response;

        self.with_epoch(|epoch| {
            *epoch += 1;

            if let Err(err) = self.inner.store.persist(&tokens, &user) {
                // The previous session's keys may be half overwritten.
                self.discard_persisted();
                self.inner.session.send_if_modified(|session| {
                    if *session != Session::anonymous() {
                        *session = Session::anonymous();
                        true
                    } else {
                        false
                    }
                });
                return Err(err);
            }

            info!(user_id = %user.id, "session established");
            self.inner
                .session
                .send_replace(Session::authenticated(user.clone()));
            Ok(())
        })?;

        Ok(user)
    }

    /// Ends the session locally, then tells the server on a best-effort basis.
    #[instrument(skip_all)]
    pub async fn logout(&self) {
        let token = self.inner.store.access_token().ok().flatten();

        self.end_session();

        if let Some(token) = token {
            if let Err(err) = self.inner.api.logout(Some(&token)).await {
                debug!("server logout failed: {}", err);
            }
        }
    }

    /// Exchanges the persisted refresh token for a new pair. Returns the new
    /// access token, or `None` if there is no refresh token (nothing changes),
    /// the session ended while the exchange was in flight, or the exchange
    /// failed (the session is ended).
    pub async fn refresh_token(&self) -> Option<String> {
        let _guard = self.inner.refresh_lock.lock().await;
        self.exchange_refresh_token().await
    }

    // Callers hold `refresh_lock`.
    #[instrument(skip_all)]
    async fn exchange_refresh_token(&self) -> Option<String> {
        let epoch = self.epoch();

        let refresh = match self.inner.store.refresh_token() {
            Ok(Some(token)) => token,
            Ok(None) => return None,
            Err(err) => {
                warn!("Failed to read refresh token: {}", err);
                return None;
            }
        };

        let was_authenticated =
            self.transition(SessionState::Authenticated, SessionState::RefreshingToken);

        let exchanged = self.inner.api.refresh(&refresh).await;

        let outcome = self.with_epoch(|current| {
            if *current != epoch {
                return Refreshed::Superseded;
            }
            match exchanged.and_then(|tokens| {
                self.inner.store.persist_tokens(&tokens).map(|()| tokens)
            }) {
                Ok(tokens) => Refreshed::Stored(tokens.access.token),
                Err(err) => Refreshed::Failed(err),
            }
        });

        match outcome {
            Refreshed::Stored(access) => {
                if was_authenticated {
                    self.transition(SessionState::RefreshingToken, SessionState::Authenticated);
                }
                debug!("access token refreshed");
                Some(access)
            }
            Refreshed::Superseded => {
                debug!("session changed during refresh, dropping new tokens");
                None
            }
            Refreshed::Failed(err) => {
                warn!("Error refreshing token: {}", err);
                self.end_session();
                None
            }
        }
    }

    /// Moves `from` to `to`; returns false if the session was elsewhere.
    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        self.inner.session.send_if_modified(|session| {
            if session.state == from {
                session.state = to;
                true
            } else {
                false
            }
        })
    }

    fn end_session(&self) {
        self.with_epoch(|epoch| {
            *epoch += 1;
            self.discard_persisted();
            self.inner.session.send_replace(Session::anonymous());
        });
        info!("session ended");
        self.inner.navigator.navigate(Route::SignIn);
    }

    fn epoch(&self) -> u64 {
        self.with_epoch(|epoch| *epoch)
    }

    /// Runs `f` while holding the session epoch. Every write to the persisted
    /// session happens inside it, so a write that started under an older
    /// epoch can be dropped.
    fn with_epoch<T>(&self, f: impl FnOnce(&mut u64) -> T) -> T {
        let mut epoch = self
            .inner
            .epoch
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut epoch)
    }

    fn discard_persisted(&self) {
        if let Err(err) = self.inner.store.clear() {
            error!("Failed to clear persisted session: {}", err);
        }
    }

    fn persisted_access_token(&self) -> Option<String> {
        match self.inner.store.access_token() {
            Ok(token) => token,
            Err(err) => {
                warn!("Failed to read access token: {}", err);
                None
            }
        }
    }
}

#[async_trait]
impl TokenProvider for AuthSessionManager {
    fn access_token(&self) -> Option<String> {
        self.persisted_access_token()
    }

    async fn refresh_after_unauthorized(&self, rejected: Option<String>) -> Option<String> {
        let _guard = self.inner.refresh_lock.lock().await;

        let current = self.persisted_access_token();
        if current.is_some() && current != rejected {
            debug!("reusing token from a concurrent refresh");
            return current;
        }

        self.exchange_refresh_token().await
    }

    async fn session_rejected(&self) {
        if self.is_authenticated() || self.inner.store.has_any() {
            warn!("session rejected by the server");
            self.end_session();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ClientConfig,
        session::{
            store::{MemoryStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY},
            types::{Token, TokenPair},
        },
    };
    use anyhow::{anyhow, Result};
    use serde_json::json;
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn can_bind_localhost() -> bool {
        TcpListener::bind("127.0.0.1:0").is_ok()
    }

    #[derive(Default)]
    struct RecordingNavigator {
        routes: StdMutex<Vec<Route>>,
    }

    impl RecordingNavigator {
        fn routes(&self) -> Vec<Route> {
            self.routes.lock().map(|r| r.clone()).unwrap_or_default()
        }
    }

    impl Navigator for RecordingNavigator {
        fn navigate(&self, route: Route) {
            if let Ok(mut routes) = self.routes.lock() {
                routes.push(route);
            }
        }
    }

    struct Fixture {
        manager: AuthSessionManager,
        store: MemoryStore,
        navigator: Arc<RecordingNavigator>,
    }

    fn fixture(base: &str) -> Result<Fixture> {
        let api = AuthApi::new(&ClientConfig::new(base)?)?;
        let store = MemoryStore::new();
        let navigator = Arc::new(RecordingNavigator::default());
        let manager = AuthSessionManager::new(api, Arc::new(store.clone()), navigator.clone());
        Ok(Fixture {
            manager,
            store,
            navigator,
        })
    }

    fn seed(store: &MemoryStore, access: &str, refresh: &str) -> Result<()> {
        let tokens = TokenPair {
            access: Token {
                token: access.to_string(),
                expires: String::new(),
            },
            refresh: Token {
                token: refresh.to_string(),
                expires: String::new(),
            },
        };
        let user = User {
            id: "1".to_string(),
            email: "a@b.com".to_string(),
            ..User::default()
        };
        SessionStore::new(Arc::new(store.clone())).persist(&tokens, &user)?;
        Ok(())
    }

    fn keys(store: &MemoryStore) -> Result<[Option<String>; 3]> {
        Ok([
            store.get(ACCESS_TOKEN_KEY)?,
            store.get(REFRESH_TOKEN_KEY)?,
            store.get(USER_KEY)?,
        ])
    }

    fn auth_body(access: &str, refresh: &str) -> serde_json::Value {
        json!({
            "user": {"id": "1", "name": "Ada", "email": "a@b.com"},
            "tokens": {
                "access": {"token": access, "expires": "2026-01-01T00:00:00Z"},
                "refresh": {"token": refresh, "expires": "2026-02-01T00:00:00Z"}
            }
        })
    }

    #[tokio::test]
    async fn bootstrap_without_token_skips_network() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        let fx = fixture(&server.uri())?;
        let mut rx = fx.manager.subscribe();

        assert!(fx.manager.is_loading());
        let session = fx.manager.bootstrap().await;

        assert!(!session.is_loading());
        assert!(!session.is_authenticated());
        assert_eq!(session.state, SessionState::Anonymous);
        assert!(rx.has_changed()?);
        assert!(!rx.borrow_and_update().is_loading());

        let requests = server
            .received_requests()
            .await
            .ok_or_else(|| anyhow!("request recording disabled"))?;
        assert!(requests.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn bootstrap_with_valid_token_authenticates() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/auth/me"))
            .and(header("Authorization", "Bearer A1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user": {"id": "1", "name": "Fresh Name", "email": "a@b.com"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(&server.uri())?;
        seed(&fx.store, "A1", "R1")?;

        let session = fx.manager.bootstrap().await;
        assert!(session.is_authenticated());
        assert_eq!(
            session.user.as_ref().map(|u| u.name.as_str()),
            Some("Fresh Name")
        );

        let cached = SessionStore::new(Arc::new(fx.store.clone())).user()?;
        assert_eq!(cached.map(|u| u.name), Some("Fresh Name".to_string()));
        assert!(fx.navigator.routes().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn bootstrap_failure_clears_session() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/auth/me"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(&server.uri())?;
        seed(&fx.store, "A1", "R1")?;

        let session = fx.manager.bootstrap().await;
        assert_eq!(session.state, SessionState::Anonymous);
        assert_eq!(keys(&fx.store)?, [None, None, None]);
        Ok(())
    }

    #[tokio::test]
    async fn bootstrap_discards_partial_session() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        let fx = fixture(&server.uri())?;
        fx.store.set_all(&[(ACCESS_TOKEN_KEY, "A1".to_string())])?;

        let session = fx.manager.bootstrap().await;
        assert_eq!(session.state, SessionState::Anonymous);
        assert_eq!(keys(&fx.store)?, [None, None, None]);
        Ok(())
    }

    #[tokio::test]
    async fn bootstrap_runs_once() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/auth/me"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"user": {"id": "1", "email": "a@b.com"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(&server.uri())?;
        seed(&fx.store, "A1", "R1")?;

        fx.manager.bootstrap().await;
        let again = fx.manager.bootstrap().await;
        assert!(again.is_authenticated());
        Ok(())
    }

    #[tokio::test]
    async fn login_persists_all_keys_and_navigates_home() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/auth/login"))
            .and(body_json(json!({"email": "a@b.com", "password": "x"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(auth_body("A1", "R1")))
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(&server.uri())?;
        fx.manager.bootstrap().await;

        let user = fx
            .manager
            .login("a@b.com", &SecretString::from("x".to_string()))
            .await?;
        assert_eq!(user.id, "1");
        assert!(fx.manager.is_authenticated());

        let [access, refresh, stored_user] = keys(&fx.store)?;
        assert_eq!(access.as_deref(), Some("A1"));
        assert_eq!(refresh.as_deref(), Some("R1"));
        assert!(stored_user.is_some());
        assert_eq!(fx.navigator.routes(), vec![Route::Home]);
        Ok(())
    }

    #[tokio::test]
    async fn login_failure_leaves_session_untouched() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/auth/login"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "message": "Incorrect email or password"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/refresh-token"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let fx = fixture(&server.uri())?;
        fx.manager.bootstrap().await;

        let err = fx
            .manager
            .login("a@b.com", &SecretString::from("bad".to_string()))
            .await
            .err()
            .ok_or_else(|| anyhow!("expected error"))?;
        assert_eq!(err.server_message(), Some("Incorrect email or password"));
        assert!(!fx.manager.is_authenticated());
        assert_eq!(fx.manager.session().state, SessionState::Anonymous);
        assert_eq!(keys(&fx.store)?, [None, None, None]);
        assert!(fx.navigator.routes().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn register_establishes_session() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/auth/register"))
            .respond_with(ResponseTemplate::new(201).set_body_json(auth_body("A1", "R1")))
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(&server.uri())?;
        fx.manager
            .register("Ada", "a@b.com", &SecretString::from("x".to_string()))
            .await?;
        assert!(fx.manager.is_authenticated());
        assert_eq!(fx.store.get(ACCESS_TOKEN_KEY)?.as_deref(), Some("A1"));
        Ok(())
    }

    #[tokio::test]
    async fn logout_succeeds_when_server_is_down() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0");
        let Ok(listener) = listener else {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        };
        let addr = listener.local_addr()?;
        drop(listener);

        let fx = fixture(&format!("http://{addr}"))?;
        seed(&fx.store, "A1", "R1")?;

        fx.manager.logout().await;

        assert!(!fx.manager.is_authenticated());
        assert_eq!(keys(&fx.store)?, [None, None, None]);
        assert_eq!(fx.navigator.routes(), vec![Route::SignIn]);
        Ok(())
    }

    #[tokio::test]
    async fn logout_notifies_server_with_token() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/auth/logout"))
            .and(header("Authorization", "Bearer A1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(&server.uri())?;
        seed(&fx.store, "A1", "R1")?;
        fx.manager.logout().await;
        assert_eq!(keys(&fx.store)?, [None, None, None]);
        Ok(())
    }

    #[tokio::test]
    async fn refresh_without_token_has_no_side_effects() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        let fx = fixture(&server.uri())?;

        assert_eq!(fx.manager.refresh_token().await, None);
        assert!(fx.navigator.routes().is_empty());
        assert_eq!(fx.manager.session().state, SessionState::Uninitialized);

        let requests = server
            .received_requests()
            .await
            .ok_or_else(|| anyhow!("request recording disabled"))?;
        assert!(requests.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn refresh_persists_new_pair() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/auth/me"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"user": {"id": "1", "email": "a@b.com"}})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/refresh-token"))
            .and(body_json(json!({"refreshToken": "R1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tokens": {
                    "access": {"token": "A2", "expires": "later"},
                    "refresh": {"token": "R2", "expires": "much later"}
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(&server.uri())?;
        seed(&fx.store, "A1", "R1")?;
        fx.manager.bootstrap().await;

        assert_eq!(fx.manager.refresh_token().await.as_deref(), Some("A2"));
        assert_eq!(fx.store.get(ACCESS_TOKEN_KEY)?.as_deref(), Some("A2"));
        assert_eq!(fx.store.get(REFRESH_TOKEN_KEY)?.as_deref(), Some("R2"));
        assert!(fx.store.get(USER_KEY)?.is_some());
        assert_eq!(fx.manager.session().state, SessionState::Authenticated);
        Ok(())
    }

    #[tokio::test]
    async fn refresh_failure_logs_out() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/auth/refresh-token"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(&server.uri())?;
        seed(&fx.store, "A1", "R1")?;

        assert_eq!(fx.manager.refresh_token().await, None);
        assert_eq!(keys(&fx.store)?, [None, None, None]);
        assert!(!fx.manager.is_authenticated());
        assert_eq!(fx.navigator.routes(), vec![Route::SignIn]);
        Ok(())
    }

    #[tokio::test]
    async fn refresh_after_unauthorized_reuses_newer_token() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/auth/refresh-token"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let fx = fixture(&server.uri())?;
        seed(&fx.store, "A2", "R2")?;

        let token = fx
            .manager
            .refresh_after_unauthorized(Some("A1".to_string()))
            .await;
        assert_eq!(token.as_deref(), Some("A2"));
        Ok(())
    }

    #[tokio::test]
    async fn session_rejected_is_idempotent() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;
        let fx = fixture(&server.uri())?;
        seed(&fx.store, "A1", "R1")?;

        fx.manager.session_rejected().await;
        fx.manager.session_rejected().await;

        assert_eq!(keys(&fx.store)?, [None, None, None]);
        assert_eq!(fx.navigator.routes(), vec![Route::SignIn]);
        Ok(())
    }

    /// Memory store whose batch writes can be switched to fail.
    #[derive(Clone, Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_writes: Arc<AtomicBool>,
    }

    impl KeyValueStore for FlakyStore {
        fn get(&self, key: &str) -> crate::error::Result<Option<String>> {
            self.inner.get(key)
        }

        fn set_all(&self, entries: &[(&str, String)]) -> crate::error::Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(Error::Storage("disk full".to_string()));
            }
            self.inner.set_all(entries)
        }

        fn remove_all(&self, keys: &[&str]) -> crate::error::Result<()> {
            self.inner.remove_all(keys)
        }
    }

    #[tokio::test]
    async fn logout_during_refresh_drops_new_tokens() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/auth/refresh-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "tokens": {
                            "access": {"token": "A2", "expires": "later"},
                            "refresh": {"token": "R2", "expires": "much later"}
                        }
                    }))
                    .set_delay(Duration::from_millis(300)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(&server.uri())?;
        seed(&fx.store, "A1", "R1")?;

        let refreshing = tokio::spawn({
            let manager = fx.manager.clone();
            async move { manager.refresh_token().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        fx.manager.logout().await;

        assert_eq!(refreshing.await?, None);
        assert!(!fx.manager.is_authenticated());
        assert_eq!(keys(&fx.store)?, [None, None, None]);
        assert_eq!(fx.navigator.routes(), vec![Route::SignIn]);
        Ok(())
    }

    #[tokio::test]
    async fn logout_during_bootstrap_leaves_nothing_behind() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/auth/me"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"user": {"id": "1", "email": "a@b.com"}}))
                    .set_delay(Duration::from_millis(300)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(&server.uri())?;
        seed(&fx.store, "A1", "R1")?;

        let bootstrapping = tokio::spawn({
            let manager = fx.manager.clone();
            async move { manager.bootstrap().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        fx.manager.logout().await;

        let session = bootstrapping.await?;
        assert_eq!(session.state, SessionState::Anonymous);
        assert!(!fx.manager.is_authenticated());
        assert_eq!(keys(&fx.store)?, [None, None, None]);
        Ok(())
    }

    #[tokio::test]
    async fn failed_persist_on_login_ends_previous_session() -> Result<()> {
        if !can_bind_localhost() {
            eprintln!("Skipping test: cannot bind localhost");
            return Ok(());
        }
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(auth_body("A1", "R1")))
            .mount(&server)
            .await;

        let store = FlakyStore::default();
        let api = AuthApi::new(&ClientConfig::new(&server.uri())?)?;
        let manager = AuthSessionManager::new(
            api,
            Arc::new(store.clone()),
            Arc::new(RecordingNavigator::default()),
        );
        let password = SecretString::from("x".to_string());

        manager.login("a@b.com", &password).await?;
        assert!(manager.is_authenticated());

        store.fail_writes.store(true, Ordering::SeqCst);
        let err = manager
            .login("a@b.com", &password)
            .await
            .err()
            .ok_or_else(|| anyhow!("expected error"))?;
        assert!(matches!(err, Error::Storage(_)));

        assert!(!manager.is_authenticated());
        assert_eq!(manager.session().state, SessionState::Anonymous);
        assert_eq!(keys(&store.inner)?, [None, None, None]);
        Ok(())
    }
}

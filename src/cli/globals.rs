use crate::{
    config::ClientConfig,
    http::AuthApi,
    session::{AuthSessionManager, FileStore, TracingNavigator},
};
use anyhow::Result;
use std::{path::PathBuf, sync::Arc};

/// Settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub config: ClientConfig,
    pub session_file: PathBuf,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(config: ClientConfig, session_file: impl Into<PathBuf>) -> Self {
        Self {
            config,
            session_file: session_file.into(),
        }
    }

    /// Session manager backed by the session file.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn manager(&self) -> Result<AuthSessionManager> {
        let api = AuthApi::new(&self.config)?;
        Ok(AuthSessionManager::new(
            api,
            Arc::new(FileStore::new(self.session_file.clone())),
            Arc::new(TracingNavigator),
        ))
    }
}

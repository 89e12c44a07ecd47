//! Session subcommands: each builds a manager over the session file, runs one
//! lifecycle operation and prints the resulting snapshot.

use super::print_json;
use crate::{
    cli::globals::GlobalArgs,
    forms::{LoginForm, RegisterForm},
    session::{Route, RouteGuard},
};
use anyhow::{bail, Result};
use secrecy::SecretString;
use serde_json::json;
use tracing::debug;

#[derive(Debug)]
pub struct LoginArgs {
    pub globals: GlobalArgs,
    pub email: String,
    pub password: SecretString,
}

#[derive(Debug)]
pub struct RegisterArgs {
    pub globals: GlobalArgs,
    pub name: String,
    pub email: String,
    pub password: SecretString,
}

#[derive(Debug)]
pub struct GuardArgs {
    pub globals: GlobalArgs,
    pub path: String,
}

/// # Errors
/// Returns the form's message if validation or sign in fails.
pub async fn login(args: LoginArgs) -> Result<()> {
    let manager = args.globals.manager()?;
    manager.bootstrap().await;

    LoginForm::new(args.email, args.password)
        .submit(&manager)
        .await?;

    print_json(&manager.session())
}

/// # Errors
/// Returns the form's message if validation or sign up fails.
pub async fn register(args: RegisterArgs) -> Result<()> {
    let manager = args.globals.manager()?;
    manager.bootstrap().await;

    RegisterForm::new(args.name, args.email, args.password)
        .submit(&manager)
        .await?;

    print_json(&manager.session())
}

/// # Errors
/// Returns an error only if the manager cannot be built or output fails.
pub async fn logout(globals: &GlobalArgs) -> Result<()> {
    let manager = globals.manager()?;
    manager.logout().await;
    print_json(&manager.session())
}

/// # Errors
/// Returns an error only if the manager cannot be built or output fails.
pub async fn whoami(globals: &GlobalArgs) -> Result<()> {
    let manager = globals.manager()?;
    let session = manager.bootstrap().await;
    print_json(&session)
}

/// Refreshes without bootstrapping first, so an expired access token can
/// still be replaced.
///
/// # Errors
/// Returns an error if there is no refresh token or the exchange failed.
pub async fn refresh(globals: &GlobalArgs) -> Result<()> {
    let manager = globals.manager()?;

    if manager.refresh_token().await.is_none() {
        bail!("no session to refresh; sign in again");
    }

    debug!(file = %globals.session_file.display(), "session file updated");
    print_json(&json!({ "refreshed": true }))
}

/// # Errors
/// Returns an error only if the manager cannot be built or output fails.
pub async fn guard(args: GuardArgs) -> Result<()> {
    let manager = args.globals.manager()?;
    let session = manager.bootstrap().await;
    let route = Route::from_path(&args.path);

    print_json(&json!({
        "route": route,
        "decision": RouteGuard::evaluate(&session, &route),
    }))
}

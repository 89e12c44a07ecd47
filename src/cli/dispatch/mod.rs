//! Maps validated CLI matches to an [`Action`].

use crate::cli::{
    actions::{request, session, Action},
    commands::{
        ARG_API_URL, ARG_DATA, ARG_EMAIL, ARG_METHOD, ARG_NAME, ARG_PASSWORD, ARG_PATH,
        ARG_PROFILE_PATH, ARG_SESSION_FILE, ARG_TIMEOUT,
    },
    globals::GlobalArgs,
};
use crate::config::{parse_timeout_seconds, ClientConfig};
use anyhow::{anyhow, Context, Result};
use reqwest::Method;
use secrecy::SecretString;
use serde_json::Value;
use std::str::FromStr;

fn required<'a>(matches: &'a clap::ArgMatches, id: &str) -> Result<&'a String> {
    matches
        .get_one::<String>(id)
        .with_context(|| format!("missing required argument: --{id}"))
}

fn globals(matches: &clap::ArgMatches) -> Result<GlobalArgs> {
    let api_url = matches
        .get_one::<String>(ARG_API_URL)
        .context("missing required argument: --api-url (or ADMINAUTH_API_BASE_URL)")?;

    let mut config = ClientConfig::new(api_url)?;
    if let Some(timeout) = matches.get_one::<String>(ARG_TIMEOUT) {
        config = config.with_timeout(parse_timeout_seconds(timeout)?);
    }
    if let Some(path) = matches.get_one::<String>(ARG_PROFILE_PATH) {
        config = config.with_profile_path(path);
    }

    let session_file = required(matches, ARG_SESSION_FILE)?;

    Ok(GlobalArgs::new(config, session_file))
}

/// Map validated CLI matches to an action.
///
/// # Errors
/// Returns an error if required arguments are missing or malformed.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let globals = globals(matches)?;

    match matches.subcommand() {
        Some(("login", sub_m)) => Ok(Action::Login(session::LoginArgs {
            globals,
            email: required(sub_m, ARG_EMAIL)?.clone(),
            password: SecretString::from(required(sub_m, ARG_PASSWORD)?.clone()),
        })),
        Some(("register", sub_m)) => Ok(Action::Register(session::RegisterArgs {
            globals,
            name: required(sub_m, ARG_NAME)?.clone(),
            email: required(sub_m, ARG_EMAIL)?.clone(),
            password: SecretString::from(required(sub_m, ARG_PASSWORD)?.clone()),
        })),
        Some(("logout", _)) => Ok(Action::Logout(globals)),
        Some(("whoami", _)) => Ok(Action::Whoami(globals)),
        Some(("refresh", _)) => Ok(Action::Refresh(globals)),
        Some(("request", sub_m)) => {
            let method = required(sub_m, ARG_METHOD)?;
            let method = Method::from_str(&method.to_uppercase())
                .map_err(|err| anyhow!("invalid method '{method}': {err}"))?;

            let body = sub_m
                .get_one::<String>(ARG_DATA)
                .map(|data| serde_json::from_str::<Value>(data))
                .transpose()
                .context("--data must be valid JSON")?;

            Ok(Action::Request(request::Args {
                globals,
                method,
                path: required(sub_m, ARG_PATH)?.clone(),
                body,
            }))
        }
        Some(("guard", sub_m)) => Ok(Action::Guard(session::GuardArgs {
            globals,
            path: required(sub_m, ARG_PATH)?.clone(),
        })),
        Some((other, _)) => Err(anyhow!("unknown command: {other}")),
        None => Err(anyhow!("no command given")),
    }
}

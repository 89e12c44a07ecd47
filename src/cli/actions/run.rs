use super::{request, session, Action};
use anyhow::Result;

pub(super) async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Login(args) => session::login(args).await,
        Action::Register(args) => session::register(args).await,
        Action::Logout(globals) => session::logout(&globals).await,
        Action::Whoami(globals) => session::whoami(&globals).await,
        Action::Refresh(globals) => session::refresh(&globals).await,
        Action::Request(args) => request::execute(args).await,
        Action::Guard(args) => session::guard(args).await,
    }
}

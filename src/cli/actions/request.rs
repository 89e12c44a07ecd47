use super::print_json;
use crate::{cli::globals::GlobalArgs, http::ApiRequest};
use anyhow::Result;
use reqwest::Method;
use serde_json::{json, Value};

#[derive(Debug)]
pub struct Args {
    pub globals: GlobalArgs,
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl Args {
    fn api_request(&self) -> ApiRequest {
        let request = ApiRequest::new(self.method.clone(), self.path.as_str());
        match &self.body {
            Some(body) => request.with_body(body.clone()),
            None => request,
        }
    }
}

/// Sends one request through the authorized pipeline. The persisted token is
/// used as-is; a 401 refreshes it and replays once.
///
/// # Errors
/// Returns the final request error, including the server's status and message.
pub async fn execute(args: Args) -> Result<()> {
    let manager = args.globals.manager()?;
    let response = manager.client().execute(&args.api_request()).await?;

    let body = serde_json::from_str::<Value>(&response.body)
        .unwrap_or_else(|_| Value::String(response.body.clone()));

    print_json(&json!({
        "status": response.status.as_u16(),
        "body": body,
    }))
}

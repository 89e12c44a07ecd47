//! Sign-in and sign-up form controllers: shape checks on the fields, then a
//! submit through the session manager. Whatever goes wrong is reduced to one
//! message suitable for display under the form.

use crate::{
    error::Error,
    session::{AuthSessionManager, User},
};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error as ThisError;
use tracing::debug;

pub const SIGN_IN_FALLBACK: &str = "An error occurred during sign in";
pub const SIGN_UP_FALLBACK: &str = "An error occurred during sign up";

#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("{0}")]
pub struct FormError(pub String);

impl FormError {
    #[must_use]
    pub fn message(&self) -> &str {
        &self.0
    }

    /// Server message when the response carried one, otherwise `fallback`.
    fn from_error(err: &Error, fallback: &str) -> Self {
        let message = match err {
            Error::Validation(message) => message.as_str(),
            other => other
                .server_message()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .unwrap_or(fallback),
        };
        Self(message.to_string())
    }
}

#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email))
}

fn require(value: &str, field: &str) -> Result<(), FormError> {
    if value.trim().is_empty() {
        Err(FormError(format!("{field} is required")))
    } else {
        Ok(())
    }
}

fn require_email(email: &str) -> Result<(), FormError> {
    require(email, "Email")?;
    if valid_email(email.trim()) {
        Ok(())
    } else {
        Err(FormError("Please enter a valid email address".to_string()))
    }
}

#[derive(Debug)]
pub struct LoginForm {
    pub email: String,
    pub password: SecretString,
}

impl LoginForm {
    pub fn new(email: impl Into<String>, password: SecretString) -> Self {
        Self {
            email: email.into(),
            password,
        }
    }

    /// # Errors
    /// Returns the first failing field check.
    pub fn validate(&self) -> Result<(), FormError> {
        require_email(&self.email)?;
        require(self.password.expose_secret(), "Password")
    }

    /// # Errors
    /// Returns a displayable message; the session is unchanged on error.
    pub async fn submit(&self, manager: &AuthSessionManager) -> Result<User, FormError> {
        self.validate()?;
        manager
            .login(self.email.trim(), &self.password)
            .await
            .map_err(|err| {
                debug!("sign in failed: {}", err);
                FormError::from_error(&err, SIGN_IN_FALLBACK)
            })
    }
}

#[derive(Debug)]
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    pub password: SecretString,
}

impl RegisterForm {
    pub fn new(name: impl Into<String>, email: impl Into<String>, password: SecretString) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password,
        }
    }

    /// # Errors
    /// Returns the first failing field check.
    pub fn validate(&self) -> Result<(), FormError> {
        require(&self.name, "Name")?;
        require_email(&self.email)?;
        require(self.password.expose_secret(), "Password")
    }

    /// # Errors
    /// Returns a displayable message; the session is unchanged on error.
    pub async fn submit(&self, manager: &AuthSessionManager) -> Result<User, FormError> {
        self.validate()?;
        manager
            .register(self.name.trim(), self.email.trim(), &self.password)
            .await
            .map_err(|err| {
                debug!("sign up failed: {}", err);
                FormError::from_error(&err, SIGN_UP_FALLBACK)
            })
    }
}

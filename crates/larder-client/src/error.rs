use thiserror::Error;
use tracing::warn;

use larder_types::validation::ValidationError;

use crate::routes::Route;

pub type Result<T> = std::result::Result<T, Error>;

/// Generic prompt for actions that need a signed-in user.
pub const LOGIN_PROMPT: &str = "Please log in to continue.";

/// Failures reported by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("invalid credential")]
    InvalidCredential,
    #[error("email already in use")]
    EmailAlreadyInUse,
    #[error("weak password")]
    WeakPassword,
    #[error("auth provider unreachable: {0}")]
    Network(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("recipe not found")]
    NotFound,

    #[error("permission denied")]
    Permission,

    /// Carries the prompt to show the user.
    #[error("not signed in")]
    NotAuthenticated(&'static str),

    #[error("request failed: {0}")]
    Transient(String),
}

impl Error {
    /// Text for the toast shown when this error reaches the UI.
    pub fn user_message(&self) -> String {
        match self {
            Error::Auth(AuthError::InvalidCredential) => "Invalid email or password.".into(),
            Error::Auth(AuthError::EmailAlreadyInUse) => "Email is already registered.".into(),
            Error::Auth(AuthError::WeakPassword) => ValidationError::WeakPassword.to_string(),
            Error::Auth(AuthError::Network(_)) => {
                "Could not reach the server. Please try again.".into()
            }
            Error::Validation(e) => e.to_string(),
            Error::NotFound => "Recipe not found.".into(),
            Error::Permission => "You are not authorized to edit this recipe.".into(),
            Error::NotAuthenticated(prompt) => (*prompt).into(),
            Error::Transient(_) => "Something went wrong. Please try again.".into(),
        }
    }

    /// Where the UI should navigate after showing the message, if anywhere.
    pub fn redirect(&self) -> Option<Route> {
        match self {
            Error::NotFound | Error::Permission => Some(Route::Feed),
            Error::NotAuthenticated(_) => Some(Route::Login),
            _ => None,
        }
    }

    /// Every transient failure is logged where it is raised; the UI only
    /// shows a generic message.
    pub(crate) fn transient(e: impl std::fmt::Display) -> Self {
        let message = e.to_string();
        warn!("Request failed: {}", message);
        Error::Transient(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_map_to_form_messages() {
        assert_eq!(
            Error::from(AuthError::InvalidCredential).user_message(),
            "Invalid email or password."
        );
        assert_eq!(
            Error::from(AuthError::EmailAlreadyInUse).user_message(),
            "Email is already registered."
        );
        assert_eq!(
            Error::from(AuthError::WeakPassword).user_message(),
            "Password must be at least 6 characters."
        );
    }

    #[test]
    fn validation_message_is_the_form_text() {
        let err = Error::from(ValidationError::BlankStep);
        assert_eq!(err.user_message(), "Please fill in all preparation steps.");
        assert_eq!(err.redirect(), None);
    }

    #[test]
    fn missing_or_foreign_recipe_redirects_to_feed() {
        assert_eq!(Error::NotFound.redirect(), Some(Route::Feed));
        assert_eq!(Error::Permission.redirect(), Some(Route::Feed));
        assert_eq!(
            Error::NotAuthenticated(LOGIN_PROMPT).redirect(),
            Some(Route::Login)
        );
        assert_eq!(Error::transient("boom").redirect(), None);
    }
}

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use larder_types::models::User;
use larder_types::validation::{ValidationError, validate_registration};

use crate::backend::AuthProvider;
use crate::error::{AuthError, Error, Result};

/// Holds the signed-in user and tells subscribers when it changes.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    auth: Arc<dyn AuthProvider>,
    user: watch::Sender<Option<User>>,
}

impl SessionStore {
    pub fn new(auth: Arc<dyn AuthProvider>) -> Self {
        let (user, _) = watch::channel(None);
        Self {
            inner: Arc::new(SessionInner { auth, user }),
        }
    }

    pub fn current_user(&self) -> Option<User> {
        self.inner.user.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.inner.user.subscribe()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(ValidationError::MissingRequiredField.into());
        }

        let user = self.inner.auth.sign_in(email.trim(), password).await?;
        info!("Signed in as {}", user.id);
        self.inner.user.send_replace(Some(user.clone()));
        Ok(user)
    }

    pub async fn signup(&self, email: &str, password: &str, display_name: &str) -> Result<User> {
        validate_registration(email, password, display_name).map_err(|e| match e {
            ValidationError::WeakPassword => Error::Auth(AuthError::WeakPassword),
            other => Error::Validation(other),
        })?;

        let user = self
            .inner
            .auth
            .sign_up(email.trim(), password, display_name.trim())
            .await?;
        info!("Registered {} ({})", user.email, user.id);
        self.inner.user.send_replace(Some(user.clone()));
        Ok(user)
    }

    /// Clears the user before the provider is told, so dependents see the
    /// signed-out state even if the provider call fails.
    pub async fn logout(&self) -> Result<()> {
        let previous = self.inner.user.send_replace(None);
        if let Some(user) = previous {
            info!("Signed out {}", user.id);
        }
        self.inner.auth.sign_out().await
    }
}

/// Register form input, including the confirmation field.
#[derive(Debug, Clone, Default)]
pub struct RegistrationForm {
    pub display_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegistrationForm {
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.password != self.confirm_password {
            return Err(ValidationError::PasswordMismatch);
        }
        validate_registration(&self.email, &self.password, &self.display_name)
    }

    pub async fn submit(&self, session: &SessionStore) -> Result<User> {
        self.validate().map_err(|e| match e {
            ValidationError::WeakPassword => Error::Auth(AuthError::WeakPassword),
            other => Error::Validation(other),
        })?;
        session
            .signup(&self.email, &self.password, &self.display_name)
            .await
    }
}

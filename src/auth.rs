//! Credential provider: the only place secrets come from.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::AuthError;

/// A login usable against the mail server, plus an optional API token
/// for the sheet source.
#[derive(Debug, Clone)]
pub struct Credential {
    pub username: String,
    pub secret: SecretString,
    pub access_token: Option<SecretString>,
}

/// Produces a currently-valid credential or fails with `AuthError`.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn valid_credential(&self) -> Result<Credential, AuthError>;
}

/// Reads `MAILBOT_USERNAME`, `MAILBOT_PASSWORD` and the optional
/// `MAILBOT_ACCESS_TOKEN` from the environment on every call.
#[derive(Debug, Default)]
pub struct EnvCredentialProvider;

impl EnvCredentialProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn valid_credential(&self) -> Result<Credential, AuthError> {
        let username = non_blank_env("MAILBOT_USERNAME")?;
        let secret = non_blank_env("MAILBOT_PASSWORD")?;
        let access_token = non_blank_env("MAILBOT_ACCESS_TOKEN").ok();

        Ok(Credential {
            username,
            secret: SecretString::from(secret),
            access_token: access_token.map(SecretString::from),
        })
    }
}

/// A fixed credential, for tests and single-shot tools.
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider {
    credential: Credential,
}

impl StaticCredentialProvider {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            credential: Credential {
                username: username.into(),
                secret: SecretString::from(secret.into()),
                access_token: None,
            },
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.credential.access_token = Some(SecretString::from(token.into()));
        self
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn valid_credential(&self) -> Result<Credential, AuthError> {
        if self.credential.secret.expose_secret().is_empty() {
            return Err(AuthError::Missing("empty secret".into()));
        }
        Ok(self.credential.clone())
    }
}

fn non_blank_env(key: &str) -> Result<String, AuthError> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(AuthError::Missing(key.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_returns_credential() {
        let provider = StaticCredentialProvider::new("bot@x.com", "hunter2").with_access_token("tok");
        let cred = provider.valid_credential().await.unwrap();
        assert_eq!(cred.username, "bot@x.com");
        assert_eq!(cred.secret.expose_secret(), "hunter2");
        assert_eq!(
            cred.access_token.as_ref().map(|t| t.expose_secret().to_string()),
            Some("tok".to_string())
        );
    }

    #[tokio::test]
    async fn static_provider_rejects_empty_secret() {
        let provider = StaticCredentialProvider::new("bot@x.com", "");
        assert!(matches!(
            provider.valid_credential().await,
            Err(AuthError::Missing(_))
        ));
    }

    #[test]
    fn blank_env_is_missing() {
        // SAFETY: no other test reads this variable.
        unsafe { std::env::set_var("MAILBOT_TEST_BLANK", "   ") };
        assert!(matches!(
            non_blank_env("MAILBOT_TEST_BLANK"),
            Err(AuthError::Missing(_))
        ));
        unsafe { std::env::remove_var("MAILBOT_TEST_BLANK") };
    }
}

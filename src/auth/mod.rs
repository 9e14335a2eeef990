//! Credential sourcing for the push channel connection.
//!
//! The client only needs read access to the current bearer token; it never
//! issues or refreshes credentials itself. A missing token still allows
//! connection attempts (the server may reject them).

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AuthConfig;

/// Read-only access to the current bearer token.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn bearer_token(&self) -> Option<String>;
}

/// A fixed token supplied at construction time.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn bearer_token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Reads the token from an environment variable on every connect, so a
/// rotated token is picked up by the next reconnect.
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl CredentialProvider for EnvToken {
    async fn bearer_token(&self) -> Option<String> {
        std::env::var(&self.var).ok()
    }
}

/// No credentials; connections are attempted unauthenticated.
pub struct NoToken;

#[async_trait]
impl CredentialProvider for NoToken {
    async fn bearer_token(&self) -> Option<String> {
        None
    }
}

/// Build a provider from settings: explicit token wins over token_env.
pub fn from_settings(auth: &AuthConfig) -> Arc<dyn CredentialProvider> {
    if let Some(token) = &auth.token {
        Arc::new(StaticToken::new(token.clone()))
    } else if let Some(var) = &auth.token_env {
        Arc::new(EnvToken::new(var.clone()))
    } else {
        Arc::new(NoToken)
    }
}

//! Identity seam. The chat core never decodes credentials itself.

use async_trait::async_trait;

use crate::error::{ChatError, Result};

/// Source of the signed-in user and a fresh bearer credential
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current user id, or `None` when signed out
    fn user_id(&self) -> Option<String>;

    /// Credential for the next request. May refresh.
    async fn bearer_token(&self) -> Result<String>;
}

/// Fixed identity, for tests and headless tools
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    user_id: Option<String>,
    token: String,
}

impl StaticIdentity {
    pub fn new(user_id: &str, token: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            token: token.to_string(),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            user_id: None,
            token: String::new(),
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    fn user_id(&self) -> Option<String> {
        self.user_id.clone()
    }

    async fn bearer_token(&self) -> Result<String> {
        if self.user_id.is_none() || self.token.is_empty() {
            return Err(ChatError::Identity("no signed-in user".to_string()));
        }
        Ok(self.token.clone())
    }
}

//! Denormalized record of who pushed

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::event::{Provider, PushEvent};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookUser {
    /// Forwarded host the hook was delivered through
    pub domain: String,
    pub user_name: String,
    pub email: String,
    pub source: Provider,
    /// Unix seconds
    pub created_at: i64,
}

impl WebhookUser {
    /// Author of the first commit, or `None` for a push without commits.
    pub fn from_push(event: &PushEvent, domain: &str, created_at: i64) -> Option<Self> {
        let first = event.commits.first()?;
        Some(Self {
            domain: domain.to_string(),
            user_name: first.author.name.clone(),
            email: first.author.email.clone(),
            source: event.provider,
            created_at,
        })
    }
}

#[async_trait]
pub trait UserRegistry: Send + Sync {
    /// Insert or refresh; never removes data.
    async fn upsert(&self, user: &WebhookUser) -> Result<()>;
}

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::error::{Result, SyncError};
use crate::user::{UserRegistry, WebhookUser};

#[derive(Clone)]
pub struct SqlUserRegistry {
    pool: SqlitePool,
}

impl SqlUserRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn count(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM webhook_users")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SyncError::DatabaseError(format!("Failed to count webhook users: {}", e)))?;
        Ok(count.0)
    }
}

#[async_trait]
impl UserRegistry for SqlUserRegistry {
    async fn upsert(&self, user: &WebhookUser) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO webhook_users (domain, user_name, email, source, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (domain, source, email)
            DO UPDATE SET user_name = excluded.user_name, created_at = excluded.created_at
            "#,
        )
        .bind(&user.domain)
        .bind(&user.user_name)
        .bind(&user.email)
        .bind(user.source.as_str())
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::DatabaseError(format!("Failed to upsert webhook user: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::event::Provider;

    #[tokio::test]
    async fn upsert_is_keyed_on_domain_source_email() {
        let registry = SqlUserRegistry::new(memory_pool().await.unwrap());
        let mut user = WebhookUser {
            domain: "cd.example.com".into(),
            user_name: "Dev".into(),
            email: "dev@example.com".into(),
            source: Provider::Codehub,
            created_at: 1,
        };
        registry.upsert(&user).await.unwrap();
        user.user_name = "Dev Renamed".into();
        user.created_at = 2;
        registry.upsert(&user).await.unwrap();
        assert_eq!(registry.count().await.unwrap(), 1);

        user.source = Provider::Gitlab;
        registry.upsert(&user).await.unwrap();
        assert_eq!(registry.count().await.unwrap(), 2);
    }
}

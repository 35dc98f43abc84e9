use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use tracing::warn;

use crate::error::{Result, SyncError};
use crate::event::Provider;
use crate::sync::TemplateRepository;
use crate::template::{CommitWatermark, ServiceTemplate, TemplateContent};

const TEMPLATE_COLUMNS: &str = r#"
    t.service_name, t.revision, t.product_name, t.deploy_type, t.source, t.src_path,
    t.commit_sha, t.commit_message, t.commit_author, t.committed_at,
    t.yaml, t.files, t.created_by, t.updated_at
"#;

// Newest revision per service name
const LATEST_JOIN: &str = r#"
    FROM service_templates t
    JOIN (
        SELECT service_name, MAX(revision) AS revision
        FROM service_templates
        GROUP BY service_name
    ) m ON t.service_name = m.service_name AND t.revision = m.revision
"#;

/// Revision-history template store on SQLite.
///
/// Every save inserts a new row; a save is accepted only if its revision is
/// exactly one past the newest stored revision, checked and written by one
/// statement.
#[derive(Clone)]
pub struct SqlTemplateStore {
    pool: SqlitePool,
}

impl SqlTemplateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Newest revision of every template
    pub async fn list_latest(&self) -> Result<Vec<ServiceTemplate>> {
        let sql = format!("SELECT {TEMPLATE_COLUMNS} {LATEST_JOIN} ORDER BY t.service_name");
        let rows = sqlx::query_as::<_, TemplateRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SyncError::DatabaseError(format!("Failed to list templates: {}", e)))?;

        rows.into_iter().map(ServiceTemplate::try_from).collect()
    }

    /// Every stored revision of one template, newest first
    pub async fn revisions(&self, service_name: &str) -> Result<Vec<ServiceTemplate>> {
        let sql = format!(
            "SELECT {TEMPLATE_COLUMNS} FROM service_templates t WHERE t.service_name = ? ORDER BY t.revision DESC"
        );
        let rows = sqlx::query_as::<_, TemplateRow>(&sql)
            .bind(service_name)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                SyncError::DatabaseError(format!("Failed to fetch template revisions: {}", e))
            })?;

        rows.into_iter().map(ServiceTemplate::try_from).collect()
    }

    pub async fn get_latest(&self, service_name: &str) -> Result<Option<ServiceTemplate>> {
        Ok(self.revisions(service_name).await?.into_iter().next())
    }
}

#[async_trait]
impl TemplateRepository for SqlTemplateStore {
    async fn list_by_source_and_type(
        &self,
        source: Provider,
        deploy_type: &str,
    ) -> Result<Vec<ServiceTemplate>> {
        let sql = format!(
            "SELECT {TEMPLATE_COLUMNS} {LATEST_JOIN} WHERE t.source = ? AND t.deploy_type = ? ORDER BY t.service_name"
        );
        let rows = sqlx::query_as::<_, TemplateRow>(&sql)
            .bind(source.as_str())
            .bind(deploy_type)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SyncError::DatabaseError(format!("Failed to list templates: {}", e)))?;

        rows.into_iter().map(ServiceTemplate::try_from).collect()
    }

    async fn save(&self, template: &ServiceTemplate) -> Result<()> {
        let persist = |e: sqlx::Error| {
            SyncError::Persistence(format!(
                "Failed to save {} revision {}: {}",
                template.service_name, template.revision, e
            ))
        };

        let files = serde_json::to_string(&template.content.files)
            .map_err(|e| SyncError::Persistence(format!("Failed to encode file list: {}", e)))?;
        let commit = template.commit.as_ref();

        // Check and insert in one statement: SQLite takes the write lock up
        // front, so concurrent saves wait on busy_timeout instead of failing.
        let result = sqlx::query(
            r#"
            INSERT INTO service_templates (
                service_name, revision, product_name, deploy_type, source, src_path,
                commit_sha, commit_message, commit_author, committed_at,
                yaml, files, created_by, updated_at
            )
            SELECT ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
            WHERE ? = COALESCE(
                (SELECT MAX(revision) FROM service_templates WHERE service_name = ?), 0
            ) + 1
            "#,
        )
        .bind(&template.service_name)
        .bind(template.revision)
        .bind(&template.product_name)
        .bind(&template.deploy_type)
        .bind(template.source.as_str())
        .bind(&template.src_path)
        .bind(commit.map(|c| c.sha.as_str()))
        .bind(commit.and_then(|c| c.message.as_deref()))
        .bind(commit.and_then(|c| c.author.as_deref()))
        .bind(commit.and_then(|c| c.committed_at).map(|dt| dt.to_rfc3339()))
        .bind(&template.content.yaml)
        .bind(files)
        .bind(&template.created_by)
        .bind(template.updated_at.to_rfc3339())
        .bind(template.revision)
        .bind(&template.service_name)
        .execute(&self.pool)
        .await
        .map_err(persist)?;

        if result.rows_affected() == 0 {
            warn!(
                "Rejecting stale write of {} revision {}",
                template.service_name, template.revision
            );
            return Err(SyncError::Persistence(format!(
                "conflicting write for {}: revision {} is not the next revision",
                template.service_name, template.revision
            )));
        }
        Ok(())
    }
}

// Helper struct to map DB row to ServiceTemplate
#[derive(FromRow)]
struct TemplateRow {
    service_name: String,
    revision: i64,
    product_name: String,
    deploy_type: String,
    source: String,
    src_path: String,
    commit_sha: Option<String>,
    commit_message: Option<String>,
    commit_author: Option<String>,
    committed_at: Option<String>,
    yaml: String,
    files: String,
    created_by: String,
    updated_at: String,
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

impl TryFrom<TemplateRow> for ServiceTemplate {
    type Error = SyncError;

    fn try_from(row: TemplateRow) -> Result<Self> {
        let source = row.source.parse::<Provider>().map_err(|s| {
            SyncError::DatabaseError(format!(
                "Template {} has unknown source '{}'",
                row.service_name, s
            ))
        })?;
        let files: Vec<String> = serde_json::from_str(&row.files).map_err(|e| {
            SyncError::DatabaseError(format!(
                "Template {} revision {} has a corrupt file list: {}",
                row.service_name, row.revision, e
            ))
        })?;
        let commit = row.commit_sha.map(|sha| CommitWatermark {
            sha,
            message: row.commit_message,
            author: row.commit_author,
            committed_at: row.committed_at.as_deref().and_then(parse_timestamp),
        });

        Ok(ServiceTemplate {
            service_name: row.service_name,
            revision: row.revision,
            product_name: row.product_name,
            deploy_type: row.deploy_type,
            source,
            src_path: row.src_path,
            commit,
            content: TemplateContent {
                yaml: row.yaml,
                files,
            },
            created_by: row.created_by,
            updated_at: parse_timestamp(&row.updated_at).unwrap_or_else(Utc::now),
        })
    }
}

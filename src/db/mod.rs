use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

pub mod jobs;
pub mod templates;
pub mod users;

use crate::error::SyncError;
pub use jobs::SqlJobStore;
pub use templates::SqlTemplateStore;
pub use users::SqlUserRegistry;

/// Initialize the SQLite database connection pool and run migrations
pub async fn init_db(db_path: impl AsRef<Path>) -> Result<SqlitePool, SyncError> {
    let db_path = db_path.as_ref();
    let db_path_str = db_path.to_string_lossy();

    // Ensure the database file exists or create it
    if !db_path.exists() {
        info!("Database file not found at {}, creating...", db_path_str);
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SyncError::DatabaseError(format!("Failed to create database directory: {}", e))
            })?;
        }
        std::fs::File::create(db_path).map_err(|e| {
            SyncError::DatabaseError(format!("Failed to create database file: {}", e))
        })?;
    }

    let db_url = format!("sqlite:{}", db_path_str);
    info!("Connecting to database at {}", db_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await
        .map_err(|e| SyncError::DatabaseError(format!("Failed to connect to database: {}", e)))?;

    migrate(&pool).await?;
    info!("Database initialized successfully");
    Ok(pool)
}

/// Single-connection in-memory database with migrations applied.
/// Every connection to `sqlite::memory:` is its own database, hence the cap.
pub async fn memory_pool() -> Result<SqlitePool, SyncError> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .map_err(|e| SyncError::DatabaseError(format!("Failed to open in-memory database: {}", e)))?;
    migrate(&pool).await?;
    Ok(pool)
}

async fn migrate(pool: &SqlitePool) -> Result<(), SyncError> {
    info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| SyncError::DatabaseError(format!("Failed to run migrations: {}", e)))
}

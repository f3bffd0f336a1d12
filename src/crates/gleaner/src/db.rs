//! Database connection and migrations.
//!
//! One SQLite database backs the durable task queue, conversation
//! checkpoints, and the KG changelog, so a commit and its changelog append
//! share transactional semantics.

use crate::error::{GleanerError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Type alias for the database connection pool.
pub type DatabasePool = SqlitePool;

/// Database connection wrapper.
#[derive(Clone, Debug)]
pub struct Database {
    pool: Arc<DatabasePool>,
}

impl Database {
    /// Connect to the database at `database_url` (e.g. `sqlite:gleaner.db`),
    /// creating the file when missing, and run migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        debug!(url = %database_url, "Connecting to database");
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| GleanerError::Database(format!("Invalid database URL: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| GleanerError::Database(format!("Failed to connect: {}", e)))?;

        let db = Self {
            pool: Arc::new(pool),
        };
        db.run_migrations().await?;
        info!(url = %database_url, "Database ready");
        Ok(db)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// Run embedded migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(self.pool.as_ref())
            .await
            .map_err(|e| GleanerError::Database(format!("Migration failed: {}", e)))?;
        Ok(())
    }

    /// Health check: run a trivial query.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(self.pool.as_ref())
            .await
            .map_err(|e| GleanerError::Database(format!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// In-memory database with migrations applied, for tests.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| GleanerError::Database(format!("Failed to connect in-memory: {}", e)))?;
        let db = Self {
            pool: Arc::new(pool),
        };
        db.run_migrations().await?;
        Ok(db)
    }
}

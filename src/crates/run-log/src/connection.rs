//! Pool management for the sqlite-backed event log and repositories.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub type DatabasePool = SqlitePool;

#[derive(Clone)]
pub struct DatabaseConnection {
    pool: DatabasePool,
}

impl DatabaseConnection {
    /// Connects and runs pending migrations. `database_url` is typically
    /// `sqlite::memory:` in tests or a `sqlite:<path>` file URL in
    /// production, read from the `DATABASE_URL` environment variable (§6).
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new().max_connections(5).connect(database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }
}

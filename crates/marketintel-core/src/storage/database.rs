use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::Result;

/// A connection pool wrapper, mirroring the teacher's `storage::database`
/// split of config-driven setup from the pool itself. One `Database` is
/// held for the lifetime of the process; the orchestrator checks a
/// connection out of the pool per step rather than holding one raw
/// connection across an entire pass.
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_with(options)
            .await?;

        if config.run_migrations {
            sqlx::migrate!("./migrations").run(&pool).await?;
        }

        info!(url = %config.url, "connected to database");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<bool> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(true)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            connections: self.pool.size(),
            idle_connections: self.pool.num_idle() as u32,
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    pub connections: u32,
    pub idle_connections: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config() -> DatabaseConfig {
        DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            connect_timeout_secs: 5,
            run_migrations: true,
        }
    }

    #[tokio::test]
    async fn connect_runs_migrations_and_health_checks() {
        let db = Database::connect(&memory_config()).await.unwrap();
        assert!(db.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn stats_reports_pool_size() {
        let db = Database::connect(&memory_config()).await.unwrap();
        let stats = db.stats();
        assert!(stats.connections >= 1);
    }
}

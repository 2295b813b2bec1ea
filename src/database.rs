use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use sqlx::migrate::{Migrate, Migration};

use crate::config::{DatabaseConfig, DatabaseKind};
use crate::hub::repository::HubRepository;

pub enum WrappedPool {
    #[cfg(feature = "sqlite")]
    Sqlite(sqlx::Pool<sqlx::Sqlite>),
    #[cfg(feature = "postgres")]
    Postgres(sqlx::Pool<sqlx::Postgres>),
}

impl WrappedPool {
    pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Self> {
        match config.kind {
            DatabaseKind::SQLite => {
                #[cfg(feature = "sqlite")]
                {
                    tracing::info!("Opening SQLite database...");
                    let pool = sqlx::SqlitePool::connect(&config.url)
                        .await
                        .context("failed to open SQLite database")?;
                    Ok(WrappedPool::Sqlite(pool))
                }
                #[cfg(not(feature = "sqlite"))]
                anyhow::bail!("SQLite selected, but 'sqlite' feature is not enabled.")
            }
            DatabaseKind::Postgres => {
                #[cfg(feature = "postgres")]
                {
                    tracing::info!("Connecting to PostgreSQL...");
                    let pool = sqlx::PgPool::connect(&config.url)
                        .await
                        .context("failed to connect to PostgreSQL")?;
                    Ok(WrappedPool::Postgres(pool))
                }
                #[cfg(not(feature = "postgres"))]
                anyhow::bail!("PostgreSQL selected, but 'postgres' feature is not enabled.")
            }
        }
    }

    pub async fn migrate_up(&self) -> anyhow::Result<()> {
        match &self {
            #[cfg(feature = "sqlite")]
            WrappedPool::Sqlite(pool) => {
                sqlx::migrate!("./migrations/sqlite")
                    .run(pool)
                    .await
                    .context("Failed to run SQLite migrations")?;
                Ok(())
            }
            #[cfg(feature = "postgres")]
            WrappedPool::Postgres(pool) => {
                sqlx::migrate!("./migrations/postgres")
                    .run(pool)
                    .await
                    .context("Failed to run PostgreSQL migrations")?;
                Ok(())
            }
        }
    }

    async fn collect_migration_status_for_conn<C>(
        conn: &mut C,
        migrator: &sqlx::migrate::Migrator,
    ) -> anyhow::Result<Vec<(Migration, bool)>>
    where
        C: Migrate,
    {
        let applied_versions: HashSet<i64> = conn
            .list_applied_migrations()
            .await?
            .into_iter()
            .map(|m| m.version)
            .collect();

        Ok(migrator
            .iter()
            .map(|migration| {
                let is_applied = applied_versions.contains(&migration.version);
                (migration.clone(), is_applied)
            })
            .collect())
    }

    pub async fn migrate_status(&self) -> anyhow::Result<Vec<(Migration, bool)>> {
        match &self {
            #[cfg(feature = "sqlite")]
            WrappedPool::Sqlite(pool) => {
                let migrator = sqlx::migrate!("./migrations/sqlite");
                let mut conn = pool.acquire().await?;
                Self::collect_migration_status_for_conn(&mut *conn, &migrator).await
            }
            #[cfg(feature = "postgres")]
            WrappedPool::Postgres(pool) => {
                let migrator = sqlx::migrate!("./migrations/postgres");
                let mut conn = pool.acquire().await?;
                Self::collect_migration_status_for_conn(&mut *conn, &migrator).await
            }
        }
    }

    pub fn hub_repository(&self) -> Arc<dyn HubRepository> {
        match &self {
            #[cfg(feature = "sqlite")]
            WrappedPool::Sqlite(pool) => {
                use crate::hub::repository::sqlite::SqliteHubRepository;
                Arc::new(SqliteHubRepository::new(pool.clone()))
            }
            #[cfg(feature = "postgres")]
            WrappedPool::Postgres(pool) => {
                use crate::hub::repository::postgres::PostgresHubRepository;
                Arc::new(PostgresHubRepository::new(pool.clone()))
            }
        }
    }
}

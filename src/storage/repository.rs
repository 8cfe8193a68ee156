use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use crate::config::DatabaseConfig;

use super::{SCHEMA_ACCOUNTS, UnitOfWork};

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Entry point to the accounts store. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database described by `config`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to database {}", config.path.display()))?;
        Ok(Self::new(pool))
    }

    /// Create the accounts table if it is missing.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(SCHEMA_ACCOUNTS)
            .execute(&self.pool)
            .await
            .context("Failed to create accounts table")?;
        Ok(())
    }

    /// Connect and migrate.
    pub async fn init(config: &DatabaseConfig) -> Result<Self> {
        let repo = Self::connect(config).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Start a new unit of work.
    pub async fn begin(&self) -> Result<UnitOfWork> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin unit of work")?;
        Ok(UnitOfWork::new(tx))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// True if the error chain holds a SQLite busy/locked error, which is how
/// the store reports that another writer got there first.
pub fn is_write_conflict(err: &anyhow::Error) -> bool {
    database_errors(err).any(|db| {
        db.code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
    })
}

/// True if the error chain holds a unique constraint violation.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    database_errors(err).any(|db| db.is_unique_violation())
}

fn database_errors(
    err: &anyhow::Error,
) -> impl Iterator<Item = &(dyn sqlx::error::DatabaseError + 'static)> {
    err.chain().filter_map(|cause| match cause.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db)) => Some(&**db),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Account, Holder};
    use crate::storage::CasOutcome;
    use tempfile::TempDir;

    async fn test_repo() -> Result<(Repository, TempDir)> {
        let temp_dir = TempDir::new()?;
        let config = DatabaseConfig {
            path: temp_dir.path().join("test.db"),
            ..DatabaseConfig::default()
        };
        let repo = Repository::init(&config).await?;
        Ok((repo, temp_dir))
    }

    async fn insert(repo: &Repository, name: &str) -> Result<Account> {
        let account = Account::open(Holder::new(name));
        let mut uow = repo.begin().await?;
        uow.insert(&account).await?;
        uow.commit().await?;
        Ok(account)
    }

    #[tokio::test]
    async fn test_find_all_on_empty_store() -> Result<()> {
        let (repo, _temp) = test_repo().await?;
        let mut uow = repo.begin().await?;
        assert!(uow.find_all().await?.is_empty());
        assert!(uow.find_by_holder("nobody").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() -> Result<()> {
        let (repo, _temp) = test_repo().await?;
        insert(&repo, "Alice").await?;
        repo.migrate().await?;

        let mut uow = repo.begin().await?;
        assert_eq!(uow.find_all().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_insert_then_find() -> Result<()> {
        let (repo, _temp) = test_repo().await?;
        let account = insert(&repo, "Alice").await?;

        let mut uow = repo.begin().await?;
        let found = uow.find_by_holder("Alice").await?.unwrap();
        assert_eq!(found, account);
        assert_eq!(found.balance(), 0);
        assert_eq!(found.version(), 0);
        assert_eq!(uow.find_by_id(account.id()).await?, Some(found));
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_holder_is_a_unique_violation() -> Result<()> {
        let (repo, _temp) = test_repo().await?;
        insert(&repo, "Bob").await?;

        let err = insert(&repo, "Bob").await.unwrap_err();
        assert!(is_unique_violation(&err));
        assert!(!is_write_conflict(&err));
        Ok(())
    }

    #[tokio::test]
    async fn test_cas_applies_on_matching_version() -> Result<()> {
        let (repo, _temp) = test_repo().await?;
        let account = insert(&repo, "Alice").await?;

        let mut uow = repo.begin().await?;
        let outcome = uow.compare_and_swap_balance(account.id(), 0, 100).await?;
        uow.commit().await?;
        assert_eq!(outcome, CasOutcome::Applied { version: 1 });

        let mut uow = repo.begin().await?;
        let stored = uow.find_by_id(account.id()).await?.unwrap();
        assert_eq!(stored.balance(), 100);
        assert_eq!(stored.version(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_cas_rejects_stale_version() -> Result<()> {
        let (repo, _temp) = test_repo().await?;
        let account = insert(&repo, "Alice").await?;

        let mut uow = repo.begin().await?;
        uow.compare_and_swap_balance(account.id(), 0, 50).await?;
        uow.commit().await?;

        // A writer still holding version 0 must lose.
        let mut uow = repo.begin().await?;
        let outcome = uow.compare_and_swap_balance(account.id(), 0, 999).await?;
        uow.commit().await?;
        assert_eq!(outcome, CasOutcome::VersionMismatch);

        let mut uow = repo.begin().await?;
        let stored = uow.find_by_id(account.id()).await?.unwrap();
        assert_eq!(stored.balance(), 50);
        assert_eq!(stored.version(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_negative_balance_is_refused_by_the_table() -> Result<()> {
        let (repo, _temp) = test_repo().await?;
        let account = insert(&repo, "Alice").await?;

        let mut uow = repo.begin().await?;
        assert!(uow.compare_and_swap_balance(account.id(), 0, -1).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() -> Result<()> {
        let (repo, _temp) = test_repo().await?;

        let mut uow = repo.begin().await?;
        uow.insert(&Account::open(Holder::new("Ghost"))).await?;
        uow.rollback().await?;

        let mut uow = repo.begin().await?;
        assert!(uow.find_by_holder("Ghost").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_reports_missing_row() -> Result<()> {
        let (repo, _temp) = test_repo().await?;
        let account = insert(&repo, "Alice").await?;

        let mut uow = repo.begin().await?;
        assert!(uow.delete(account.id()).await?);
        assert!(!uow.delete(account.id()).await?);
        uow.commit().await?;
        Ok(())
    }
}

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, Transaction};
use uuid::Uuid;

use crate::domain::{Account, AccountId, Amount, Holder};

/// Result of a version-conditioned balance write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The row still carried the expected version and now carries `version`.
    Applied { version: i64 },
    /// The row was changed (or removed) since it was read.
    VersionMismatch,
}

/// One atomic unit of work against the accounts table.
///
/// Dropping a unit of work without calling [`UnitOfWork::commit`] rolls
/// back everything it did.
pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
}

impl UnitOfWork {
    pub(crate) fn new(tx: Transaction<'static, Sqlite>) -> Self {
        Self { tx }
    }

    /// Look up the account owned by `holder_name`.
    pub async fn find_by_holder(&mut self, holder_name: &str) -> Result<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, holder_name, balance, version, created_at
            FROM accounts
            WHERE holder_name = ?
            "#,
        )
        .bind(holder_name)
        .fetch_optional(&mut *self.tx)
        .await
        .context("Failed to fetch account by holder")?;

        row.as_ref().map(row_to_account).transpose()
    }

    /// Look up an account by its id.
    pub async fn find_by_id(&mut self, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, holder_name, balance, version, created_at
            FROM accounts
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&mut *self.tx)
        .await
        .context("Failed to fetch account")?;

        row.as_ref().map(row_to_account).transpose()
    }

    /// All accounts, ordered by holder name.
    pub async fn find_all(&mut self) -> Result<Vec<Account>> {
        let rows = sqlx::query(
            r#"
            SELECT id, holder_name, balance, version, created_at
            FROM accounts
            ORDER BY holder_name
            "#,
        )
        .fetch_all(&mut *self.tx)
        .await
        .context("Failed to list accounts")?;

        rows.iter().map(row_to_account).collect()
    }

    /// Insert a new row. The stored version always starts at zero.
    pub async fn insert(&mut self, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, holder_name, balance, version, created_at)
            VALUES (?, ?, ?, 0, ?)
            "#,
        )
        .bind(account.id().to_string())
        .bind(account.holder_name())
        .bind(account.balance())
        .bind(account.created_at().to_rfc3339())
        .execute(&mut *self.tx)
        .await
        .context("Failed to insert account")?;
        Ok(())
    }

    /// Delete the row with the given id. Returns false if there was none.
    pub async fn delete(&mut self, id: AccountId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *self.tx)
            .await
            .context("Failed to delete account")?;
        Ok(result.rows_affected() > 0)
    }

    /// Write `new_balance` only if the row still has `expected_version`,
    /// bumping the version in the same statement.
    pub async fn compare_and_swap_balance(
        &mut self,
        id: AccountId,
        expected_version: i64,
        new_balance: Amount,
    ) -> Result<CasOutcome> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = ?, version = version + 1
            WHERE id = ? AND version = ?
            "#,
        )
        .bind(new_balance)
        .bind(id.to_string())
        .bind(expected_version)
        .execute(&mut *self.tx)
        .await
        .context("Failed to write account balance")?;

        if result.rows_affected() == 0 {
            Ok(CasOutcome::VersionMismatch)
        } else {
            Ok(CasOutcome::Applied {
                version: expected_version + 1,
            })
        }
    }

    pub async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .context("Failed to commit unit of work")
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx
            .rollback()
            .await
            .context("Failed to roll back unit of work")
    }
}

fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Result<Account> {
    let id_str: String = row.get("id");
    let holder_name: String = row.get("holder_name");
    let created_at_str: String = row.get("created_at");

    Ok(Account::restore(
        Uuid::parse_str(&id_str).context("Invalid account ID")?,
        Holder::new(holder_name),
        row.get("balance"),
        row.get("version"),
        DateTime::parse_from_rfc3339(&created_at_str)
            .context("Invalid created_at timestamp")?
            .with_timezone(&Utc),
    ))
}

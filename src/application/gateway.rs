use tracing::{debug, warn};

use crate::domain::{Account, AccountSnapshot, RejectedError};
use crate::storage::{CasOutcome, Repository, is_unique_violation, is_write_conflict};

use super::AppError;

/// Runs every ledger operation inside exactly one unit of work.
///
/// Each method commits on success. Any error returns before the commit, and
/// dropping the unit of work rolls the store back to where it was.
#[derive(Clone)]
pub struct LedgerGateway {
    repo: Repository,
}

impl LedgerGateway {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    /// Find the account for `holder_name`. A missing account is `Ok(None)`.
    pub async fn find_by_holder(&self, holder_name: &str) -> Result<Option<Account>, AppError> {
        let mut uow = self.repo.begin().await?;
        let account = uow.find_by_holder(holder_name).await?;
        uow.commit().await?;
        Ok(account)
    }

    pub async fn find_all(&self) -> Result<Vec<Account>, AppError> {
        let mut uow = self.repo.begin().await?;
        let accounts = uow.find_all().await?;
        uow.commit().await?;
        Ok(accounts)
    }

    /// Persist a new account with version zero.
    pub async fn create(&self, account: &Account) -> Result<(), AppError> {
        let holder = account.holder_name();
        let mut uow = self.repo.begin().await?;
        uow.insert(account)
            .await
            .map_err(|err| classify(holder, err))?;
        uow.commit().await.map_err(|err| classify(holder, err))?;
        debug!(holder, id = %account.id(), "Account row inserted");
        Ok(())
    }

    /// Delete the row the snapshot was taken from, matched by id.
    pub async fn remove(&self, account: &AccountSnapshot) -> Result<(), AppError> {
        let holder = account.holder_name.as_str();
        let mut uow = self.repo.begin().await?;
        let deleted = uow
            .delete(account.id)
            .await
            .map_err(|err| classify(holder, err))?;
        if !deleted {
            return Err(AppError::NotFound(holder.to_string()));
        }
        uow.commit().await.map_err(|err| classify(holder, err))?;
        debug!(holder, id = %account.id, "Account row deleted");
        Ok(())
    }

    /// Read the account, apply `mutation` to a private copy, and write the new
    /// balance back only if nobody else wrote the row in between.
    ///
    /// Rule violations from `mutation` fail the call before anything is
    /// written. A lost race is reported as [`AppError::ConcurrentModification`]
    /// and leaves the row as the winner wrote it.
    pub async fn apply_mutation<F>(&self, holder_name: &str, mutation: F) -> Result<Account, AppError>
    where
        F: FnOnce(&mut Account) -> Result<(), RejectedError>,
    {
        let mut uow = self.repo.begin().await?;
        let mut account = uow
            .find_by_holder(holder_name)
            .await
            .map_err(|err| classify(holder_name, err))?
            .ok_or_else(|| AppError::NotFound(holder_name.to_string()))?;

        let read_version = account.version();
        mutation(&mut account).map_err(|err| AppError::rejected(holder_name, err))?;

        let outcome = uow
            .compare_and_swap_balance(account.id(), read_version, account.balance())
            .await
            .map_err(|err| classify(holder_name, err))?;

        match outcome {
            CasOutcome::Applied { version } => {
                uow.commit()
                    .await
                    .map_err(|err| classify(holder_name, err))?;
                account.set_persisted_version(version);
                Ok(account)
            }
            CasOutcome::VersionMismatch => {
                uow.rollback().await?;
                warn!(holder = holder_name, read_version, "Account version changed since read");
                Err(AppError::ConcurrentModification(holder_name.to_string()))
            }
        }
    }
}

fn classify(holder: &str, err: anyhow::Error) -> AppError {
    if is_unique_violation(&err) {
        AppError::DuplicateHolder(holder.to_string())
    } else if is_write_conflict(&err) {
        AppError::ConcurrentModification(holder.to_string())
    } else {
        AppError::StorageUnavailable(err)
    }
}

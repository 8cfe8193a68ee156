use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{BankConfig, RetryConfig};
use crate::domain::{Account, AccountSnapshot, Amount, Holder, RejectedError};
use crate::storage::Repository;

use super::{AppError, LedgerGateway};

/// The bank's call surface. Every client request goes through one method.
///
/// Operations on the set of accounts (list, create, get, delete) run one at a
/// time behind `set_lock`. Deposits and withdrawals never take that lock;
/// they rely on the gateway's version check and retry when they lose.
///
/// Clones share the lock and the connection pool, so hand one clone to each
/// task serving a request.
#[derive(Clone)]
pub struct BankService {
    gateway: LedgerGateway,
    retry: RetryConfig,
    set_lock: Arc<Mutex<()>>,
}

impl BankService {
    pub fn new(repo: Repository, retry: RetryConfig) -> Self {
        Self {
            gateway: LedgerGateway::new(repo),
            retry,
            set_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Open the configured database, creating the table if needed.
    pub async fn open(config: &BankConfig) -> Result<Self, AppError> {
        let repo = Repository::init(&config.database).await?;
        Ok(Self::new(repo, config.retry))
    }

    pub fn gateway(&self) -> &LedgerGateway {
        &self.gateway
    }

    // ========================
    // Set-level operations
    // ========================

    pub async fn list_accounts(&self) -> Result<Vec<AccountSnapshot>, AppError> {
        let _guard = self.set_lock.lock().await;
        let accounts = self.gateway.find_all().await?;
        debug!(count = accounts.len(), "Listed accounts");
        Ok(accounts.iter().map(Account::snapshot).collect())
    }

    /// Open a zero-balance account for a holder that has none yet.
    ///
    /// The existence check and the insert happen under the set lock, so two
    /// racing creates for the same name cannot both pass the check.
    pub async fn create_account(&self, holder_name: &str) -> Result<AccountSnapshot, AppError> {
        let holder_name = holder_name.trim();
        if holder_name.is_empty() {
            return Err(AppError::InvalidHolderName(holder_name.to_string()));
        }

        let _guard = self.set_lock.lock().await;
        if self.gateway.find_by_holder(holder_name).await?.is_some() {
            return Err(AppError::DuplicateHolder(holder_name.to_string()));
        }

        let account = Account::open(Holder::new(holder_name));
        self.gateway.create(&account).await?;
        info!(holder = holder_name, id = %account.id(), "Account created");
        Ok(account.snapshot())
    }

    /// Current state of the holder's account, or `None` if there is none.
    pub async fn get_account(&self, holder_name: &str) -> Result<Option<AccountSnapshot>, AppError> {
        let holder_name = holder_name.trim();
        if holder_name.is_empty() {
            return Ok(None);
        }

        let _guard = self.set_lock.lock().await;
        let account = self.gateway.find_by_holder(holder_name).await?;
        Ok(account.as_ref().map(Account::snapshot))
    }

    pub async fn delete_account(&self, account: &AccountSnapshot) -> Result<(), AppError> {
        let _guard = self.set_lock.lock().await;
        self.gateway.remove(account).await?;
        info!(holder = %account.holder_name, id = %account.id, "Account deleted");
        Ok(())
    }

    // ========================
    // Balance mutations
    // ========================

    /// Deposit into the account currently owned by the snapshot's holder.
    pub async fn deposit(
        &self,
        account: &AccountSnapshot,
        amount: Amount,
    ) -> Result<AccountSnapshot, AppError> {
        self.mutate("deposit", &account.holder_name, |acct| acct.deposit(amount))
            .await
    }

    /// Withdraw from the account currently owned by the snapshot's holder.
    pub async fn withdraw(
        &self,
        account: &AccountSnapshot,
        amount: Amount,
    ) -> Result<AccountSnapshot, AppError> {
        self.mutate("withdraw", &account.holder_name, |acct| acct.withdraw(amount))
            .await
    }

    /// Run one read-mutate-write cycle, starting over on a lost write race
    /// until `retry.max_attempts` cycles have been spent.
    async fn mutate<F>(
        &self,
        operation: &'static str,
        holder_name: &str,
        mutation: F,
    ) -> Result<AccountSnapshot, AppError>
    where
        F: Fn(&mut Account) -> Result<(), RejectedError>,
    {
        let mut attempt: u32 = 1;
        loop {
            match self.gateway.apply_mutation(holder_name, &mutation).await {
                Ok(account) => {
                    debug!(
                        operation,
                        holder = holder_name,
                        balance = account.balance(),
                        version = account.version(),
                        attempt,
                        "Balance updated"
                    );
                    return Ok(account.snapshot());
                }
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(operation, holder = holder_name, attempt, ?delay, "Write conflict, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_retryable() {
                        warn!(operation, holder = holder_name, attempt, "Giving up after write conflicts");
                    }
                    return Err(err);
                }
            }
        }
    }
}

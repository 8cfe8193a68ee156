use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub type AccountId = Uuid;

/// Balances and amounts are whole currency units.
pub type Amount = i64;

/// Why an account refused a balance change.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectedError {
    #[error("Amount must not be negative, got {0}")]
    NegativeAmount(Amount),

    #[error("Tried to overdraft: balance {balance}, requested {requested}")]
    Overdraft { balance: Amount, requested: Amount },

    #[error("Deposit of {0} would overflow the balance")]
    Overflow(Amount),
}

/// The person owning an account. Embedded in the account, never shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Holder {
    pub name: String,
}

impl Holder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// The mutable account record. Only the persistence gateway hands these out,
/// one private copy per unit of work.
#[derive(Debug, Clone)]
pub struct Account {
    id: AccountId,
    holder: Holder,
    balance: Amount,
    version: i64,
    created_at: DateTime<Utc>,
}

impl Account {
    /// A fresh, not yet persisted account with a zero balance.
    pub fn open(holder: Holder) -> Self {
        Self {
            id: Uuid::new_v4(),
            holder,
            balance: 0,
            version: 0,
            created_at: Utc::now(),
        }
    }

    /// Rebuild an account from a stored row.
    pub(crate) fn restore(
        id: AccountId,
        holder: Holder,
        balance: Amount,
        version: i64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            holder,
            balance,
            version,
            created_at,
        }
    }

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn holder_name(&self) -> &str {
        &self.holder.name
    }

    pub fn balance(&self) -> Amount {
        self.balance
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn deposit(&mut self, amount: Amount) -> Result<(), RejectedError> {
        if amount < 0 {
            return Err(RejectedError::NegativeAmount(amount));
        }
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(RejectedError::Overflow(amount))?;
        Ok(())
    }

    pub fn withdraw(&mut self, amount: Amount) -> Result<(), RejectedError> {
        if amount < 0 {
            return Err(RejectedError::NegativeAmount(amount));
        }
        if self.balance - amount < 0 {
            return Err(RejectedError::Overdraft {
                balance: self.balance,
                requested: amount,
            });
        }
        self.balance -= amount;
        Ok(())
    }

    /// Record the version the store assigned after a successful write.
    pub(crate) fn set_persisted_version(&mut self, version: i64) {
        self.version = version;
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            id: self.id,
            holder_name: self.holder.name.clone(),
            balance: self.balance,
            version: self.version,
            created_at: self.created_at,
        }
    }
}

impl PartialEq for Account {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Account {}

impl std::fmt::Display for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Account: [holder: {}, balance: {}]",
            self.holder.name, self.balance
        )
    }
}

/// Read-only view of an account as it was when the call returned.
///
/// Snapshots are what callers keep and pass back as account references.
/// Only `holder_name` is used to find the account again; the balance and
/// version may be stale by the time the snapshot is reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub id: AccountId,
    pub holder_name: String,
    pub balance: Amount,
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

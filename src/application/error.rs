use thiserror::Error;

use crate::domain::{Amount, RejectedError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient funds for {holder}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        holder: String,
        balance: Amount,
        requested: Amount,
    },

    #[error("Account for {0} already exists")]
    DuplicateHolder(String),

    #[error("No account for {0}")]
    NotFound(String),

    #[error("Account for {0} was modified concurrently")]
    ConcurrentModification(String),

    #[error("Invalid holder name: {0:?}")]
    InvalidHolderName(String),

    #[error("Storage unavailable: {0:#}")]
    StorageUnavailable(#[from] anyhow::Error),
}

impl AppError {
    /// Attach the holder to an entity rejection.
    pub fn rejected(holder: &str, err: RejectedError) -> Self {
        match err {
            RejectedError::Overdraft { balance, requested } => AppError::InsufficientFunds {
                holder: holder.to_string(),
                balance,
                requested,
            },
            other @ (RejectedError::NegativeAmount(_) | RejectedError::Overflow(_)) => {
                AppError::InvalidAmount(other.to_string())
            }
        }
    }

    /// Only lost write races are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ConcurrentModification(_))
    }
}

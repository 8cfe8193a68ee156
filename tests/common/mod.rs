// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use arca::application::BankService;
use arca::config::{BankConfig, RetryConfig};
use arca::domain::{AccountSnapshot, Amount};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(BankService, TempDir)> {
    test_service_with_retry(RetryConfig::default()).await
}

/// Same as `test_service`, with a custom retry policy
pub async fn test_service_with_retry(retry: RetryConfig) -> Result<(BankService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let mut config = BankConfig::default().with_database_path(temp_dir.path().join("test.db"));
    config.retry = retry;
    let service = BankService::open(&config).await?;
    Ok((service, temp_dir))
}

/// Retry budget that heavily contended tests never run out of
pub fn patient_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 500,
        base_backoff_ms: 1,
        max_backoff_ms: 20,
    }
}

/// Create an account and bring it to `balance`
pub async fn funded_account(
    service: &BankService,
    holder: &str,
    balance: Amount,
) -> Result<AccountSnapshot> {
    let account = service.create_account(holder).await?;
    Ok(service.deposit(&account, balance).await?)
}

/// Current balance of `holder`, failing the test if the account is gone
pub async fn balance_of(service: &BankService, holder: &str) -> Result<Amount> {
    let account = service
        .get_account(holder)
        .await?
        .ok_or_else(|| anyhow::anyhow!("no account for {holder}"))?;
    Ok(account.balance)
}

mod repository;
mod unit_of_work;

pub use repository::*;
pub use unit_of_work::*;

/// SQL for the accounts table, applied on every open.
pub const SCHEMA_ACCOUNTS: &str = include_str!("migrations/001_accounts.sql");

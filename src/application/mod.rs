// Application layer: the persistence gateway (transaction boundaries) and the
// request coordinator that every caller goes through.

pub mod error;
pub mod gateway;
pub mod service;

pub use error::*;
pub use gateway::*;
pub use service::*;

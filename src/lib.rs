pub mod config;
pub mod error;
pub mod logging;
pub mod query;
pub mod ssh;

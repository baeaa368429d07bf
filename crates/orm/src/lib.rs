//! # orient-orm: Active-record persistence over an object database
//!
//! Plain serde structs implement [`Model`] and get find, save, delete,
//! refresh, count and OSQL queries through blanket traits. Every operation
//! runs through a [`DatabaseHandle`] opened from an [`Odb`] factory, either
//! directly or through the process-wide [`db()`] helper.
//!
//! Storage sits behind the [`ObjectStorage`] trait; the crate ships the
//! in-process engine used for `memory:` databases.

pub mod backends;
pub mod database;
pub mod document;
pub mod error;
pub mod identity;
pub mod model;
pub mod query;
pub mod transaction;

#[cfg(test)]
mod tests;

// Re-export core traits and types
pub use backends::{MemoryStorage, ObjectStorage, TxOperation};
pub use database::*;
pub use document::Document;
pub use error::*;
pub use identity::RecordId;
pub use model::*;
pub use query::*;
pub use transaction::{is_concurrency_failure, TransactionConfig};

pub use orient_core::{AppConfigTrait, DatabaseConfig, Environment};

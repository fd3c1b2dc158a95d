// BuyerCache - In-memory buyer cache with substring search over a remote table

pub mod cache;
pub mod config;
pub mod error;
pub mod filter;
pub mod record;
pub mod remote;
pub mod rest;
pub mod sqlite;

// Re-export main types for convenience
pub use cache::{BuyerCache, CacheSnapshot, CacheView, DEFAULT_TABLE, SubscriptionId, sort_records};
pub use config::RemoteConfig;
pub use error::{CacheError, RemoteError};
pub use filter::Filter;
pub use record::{BuyerFields, BuyerRecord, IndexValue};
pub use remote::RemoteTable;
pub use rest::RestTable;
pub use sqlite::SqliteTable;

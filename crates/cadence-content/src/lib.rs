//! `cadence-content`: SQLite-backed post variants and channel connections,
//! plus the config-driven channel catalog the scheduler consumes.

pub mod catalog;
pub mod db;
pub mod store;

pub use catalog::ConfigCatalog;
pub use store::SqliteContentStore;

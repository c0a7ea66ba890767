pub mod db;
pub mod store;

pub use db::{create_store, DbPool};
pub use store::{SqliteStore, StorageError};

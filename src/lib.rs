pub mod config;
pub mod constants;
pub mod cookies;
pub mod errors;
pub mod manager;
pub mod storage;

pub use config::{FallbackPolicy, StorageConfig};
pub use errors::StorageError;
pub use manager::{Backend, StorageManager, StorageOutcome};

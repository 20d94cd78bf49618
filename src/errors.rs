#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Local storage is not available")]
    LocalStorageUnavailable,

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<anyhow::Error> for StorageError {
    fn from(err: anyhow::Error) -> Self {
        StorageError::Backend(format!("{err:#}"))
    }
}

use std::sync::Arc;

use thiserror::Error;

use crate::api::ApiError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store '{store}' is not declared by cache schema version {version} - bump the schema version")]
    SchemaMismatch { store: String, version: u32 },

    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Remote fetch failed: {0}")]
    Remote(Arc<ApiError>),
}

impl StoreError {
    /// The remote failure behind this error, if it came from a fetch.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            StoreError::Remote(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ApiError> for StoreError {
    fn from(e: ApiError) -> Self {
        StoreError::Remote(Arc::new(e))
    }
}

impl From<Arc<ApiError>> for StoreError {
    fn from(e: Arc<ApiError>) -> Self {
        StoreError::Remote(e)
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

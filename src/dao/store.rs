//! Storage traits and the error type shared by their implementations.

use std::error::Error;

use futures::future::BoxFuture;
use thiserror::Error;

use crate::dao::models::{JingleEntity, QuestionEntity, ResultEntity};

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying medium.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

/// Read-only lookup of questions and jingles.
///
/// The CRUD surface that maintains the catalog lives outside this process;
/// the session engine only ever reads.
pub trait CatalogStore: Send + Sync {
    fn find_question(&self, id: u32) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>>;
    fn find_jingle(&self, id: u32) -> BoxFuture<'static, StorageResult<Option<JingleEntity>>>;
}

/// Durable sink for scored answers.
///
/// Insert failures are logged by callers and never propagated into session
/// state; the in-memory game remains authoritative.
pub trait ResultStore: Send + Sync {
    fn insert_result(&self, result: ResultEntity) -> BoxFuture<'static, StorageResult<()>>;
}

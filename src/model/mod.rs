//! Persistence collaborator contract.
//!
//! A resource only needs CRUD access to its documents; any store that can
//! implement [`Model`] can back one. [`memory::MemoryModel`] is the in-process
//! implementation used by the demo server and the tests.

pub mod memory;
pub mod schema;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::filter::FilterData;

pub use memory::MemoryModel;
pub use schema::{Field, FieldError, FieldKind, Schema, ValidationErrors};

/// A stored document. Every document carries a string `id`.
pub type Document = Map<String, Value>;

/// Model errors with structured error types. The variant tells the request
/// pipeline how to classify a failure.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("Duplicate value {value} for unique field \"{field}\".")]
    Duplicate { field: String, value: Value },

    #[error("Cast to {kind} failed for value {value} at path \"{path}\".")]
    Cast { kind: String, value: Value, path: String },

    #[error("No document found with id \"{0}\".")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(String),
}

#[async_trait]
pub trait Model: Send + Sync {
    /// Model name, e.g. `Example`
    fn name(&self) -> &str;

    async fn find(&self, query: &FilterData) -> Result<Vec<Document>, ModelError>;

    async fn count(&self, filter: &Map<String, Value>) -> Result<u64, ModelError>;

    /// First document matching `query.filter`, honouring sort and select
    async fn find_one(&self, query: &FilterData) -> Result<Option<Document>, ModelError>;

    async fn find_by_id(&self, id: &str, select: Option<&[String]>) -> Result<Option<Document>, ModelError>;

    async fn create(&self, body: Value) -> Result<Document, ModelError>;

    /// Persist changes to an existing document (matched by its `id`)
    async fn save(&self, document: Document) -> Result<Document, ModelError>;

    async fn remove(&self, id: &str) -> Result<Option<Document>, ModelError>;
}

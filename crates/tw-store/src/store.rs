//! Document store abstraction the ledger is written against.

use serde::Serialize;
use serde_json::{Map, Value};
use tw_types::{TrialId, TwResult};

/// A stored document: its identifier and JSON body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Document {
    pub id: TrialId,
    pub body: Map<String, Value>,
}

impl Document {
    /// Field-equality match against every entry of `filter`.
    pub fn matches(&self, filter: &Map<String, Value>) -> bool {
        filter
            .iter()
            .all(|(key, expected)| self.body.get(key) == Some(expected))
    }
}

/// Trait for document stores (in-memory, DuckDB, remote drivers, ...).
///
/// Implementations must make every single-document write atomic: a reader
/// sees a document either before or after an insert/merge, never torn.
/// Nothing beyond that is promised across documents or across calls.
pub trait DocumentStore: Send + Sync + std::fmt::Debug {
    /// Insert a new document and return its identifier.
    fn insert(&self, body: Map<String, Value>) -> TwResult<TrialId>;

    /// Merge `fields` into an existing document (partial update, not replace).
    fn merge(&self, id: &TrialId, fields: Map<String, Value>) -> TwResult<()>;

    /// Snapshot of every document in insertion order.
    fn find_all(&self) -> TwResult<Vec<Document>>;

    /// Number of documents, complete or not.
    fn count(&self) -> TwResult<usize> {
        Ok(self.find_all()?.len())
    }

    /// Delete every document, returning how many were removed.
    fn delete_all(&self) -> TwResult<usize>;

    /// Collection label this store writes to.
    fn collection(&self) -> &str;
}

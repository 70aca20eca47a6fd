//! # tw-store
//!
//! The evaluation ledger and the document stores behind it.
//!
//! The ledger is a thin contract over a [`DocumentStore`]: an in-memory store
//! for tests and single-process runs, and a DuckDB store for durable runs.
//! Stores are opened through a [`StoreConnector`] from an address resolved
//! out of the loop configuration.

pub mod address;
pub mod duck;
pub mod ledger;
pub mod memory;
pub mod store;

pub use address::{
    DuckDbConnector, LaunchPad, MemoryConnector, StoreAddress, StoreConfig, StoreConnector,
    DEFAULT_COLLECTION,
};
pub use duck::DuckDbStore;
pub use ledger::{FieldKey, Ledger};
pub use memory::MemoryStore;
pub use store::{Document, DocumentStore};

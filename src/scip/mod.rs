//! SCIP semantic index support
//!
//! - `proto`: protobuf messages for the subset of SCIP we read
//! - `index`: decoded, in-memory index with cursor and symbol queries
//! - `store`: process-wide cache with parse-once-per-path loading

pub mod index;
pub mod proto;
pub mod store;

pub use index::{Document, LookupKind, Occurrence, ScipRange, SemanticIndex, SymbolLocation};
pub use store::SemanticIndexStore;

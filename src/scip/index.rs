//! In-memory semantic index
//!
//! A flat list of documents, each carrying its occurrences in producer
//! order. Symbols are interned so that a symbol referenced from thousands of
//! occurrences is stored once.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use prost::Message;
use serde::{Deserialize, Serialize};

use super::proto;
use crate::error::{CodeBrowserError, Result};

/// What a lookup is after
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupKind {
    Definition,
    Reference,
}

impl LookupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupKind::Definition => "definition",
            LookupKind::Reference => "reference",
        }
    }

    /// Whether an occurrence with the given role bits belongs to this kind
    pub fn matches_roles(&self, roles: i32) -> bool {
        let is_definition = roles & proto::SYMBOL_ROLE_DEFINITION != 0;
        match self {
            LookupKind::Definition => is_definition,
            LookupKind::Reference => !is_definition,
        }
    }
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A 0-based range with the single-line form already expanded
///
/// Columns are kept exactly as the producer wrote them (UTF-16 units or
/// bytes, depending on the indexer).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScipRange {
    pub start_line: i32,
    pub start_column: i32,
    pub end_line: i32,
    pub end_column: i32,
}

impl ScipRange {
    /// Expand a raw SCIP range
    ///
    /// 3 elements: `[startLine, startColumn, endColumn]`
    /// 4 elements: `[startLine, startColumn, endLine, endColumn]`
    ///
    /// Any other length, negative positions, and ranges that end before they
    /// start are rejected.
    pub fn from_raw(raw: &[i32]) -> Option<Self> {
        let range = match *raw {
            [start_line, start_column, end_column] => Self {
                start_line,
                start_column,
                end_line: start_line,
                end_column,
            },
            [start_line, start_column, end_line, end_column] => Self {
                start_line,
                start_column,
                end_line,
                end_column,
            },
            _ => return None,
        };
        range.is_well_formed().then_some(range)
    }

    fn is_well_formed(&self) -> bool {
        if self.start_line < 0 || self.start_column < 0 || self.end_column < 0 {
            return false;
        }
        if self.end_line < self.start_line {
            return false;
        }
        !(self.is_single_line() && self.end_column < self.start_column)
    }

    pub fn is_single_line(&self) -> bool {
        self.start_line == self.end_line
    }

    /// Cursor containment with a half-open end column
    pub fn contains(&self, line: i32, column: i32) -> bool {
        if line < self.start_line || line > self.end_line {
            return false;
        }
        if self.is_single_line() {
            column >= self.start_column && column < self.end_column
        } else if line == self.start_line {
            column >= self.start_column
        } else if line == self.end_line {
            column < self.end_column
        } else {
            true
        }
    }
}

/// One symbol occurrence within a document
#[derive(Debug, Clone)]
pub struct Occurrence {
    pub symbol: Arc<str>,
    pub range: ScipRange,
    pub roles: i32,
}

impl Occurrence {
    pub fn is_definition(&self) -> bool {
        self.roles & proto::SYMBOL_ROLE_DEFINITION != 0
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub relative_path: String,
    pub occurrences: Vec<Occurrence>,
}

impl Document {
    /// First occurrence (in producer order) whose range contains the cursor
    pub fn symbol_at(&self, line: i32, column: i32) -> Option<&str> {
        self.occurrences
            .iter()
            .find(|occ| occ.range.contains(line, column))
            .map(|occ| occ.symbol.as_ref())
    }
}

/// A resolved occurrence location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolLocation {
    pub document_path: String,
    pub range: ScipRange,
}

/// Parsed, immutable semantic index
#[derive(Debug, Default)]
pub struct SemanticIndex {
    documents: Vec<Document>,
    by_path: HashMap<String, usize>,
    tool: Option<String>,
}

impl SemanticIndex {
    /// Decode a SCIP protobuf payload
    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, prost::DecodeError> {
        let index = proto::Index::decode(bytes)?;
        Ok(Self::from_proto(index))
    }

    pub fn from_proto(index: proto::Index) -> Self {
        let tool = index
            .metadata
            .and_then(|m| m.tool_info)
            .map(|t| format!("{} {}", t.name, t.version).trim().to_string());

        let mut interned: HashMap<String, Arc<str>> = HashMap::new();
        let mut documents = Vec::with_capacity(index.documents.len());
        let mut by_path = HashMap::with_capacity(index.documents.len());

        for doc in index.documents {
            let mut occurrences = Vec::with_capacity(doc.occurrences.len());
            for occ in doc.occurrences {
                let Some(range) = ScipRange::from_raw(&occ.range) else {
                    tracing::debug!(
                        "Dropping occurrence of {} in {} with malformed range {:?}",
                        occ.symbol,
                        doc.relative_path,
                        occ.range
                    );
                    continue;
                };
                let symbol = interned
                    .entry(occ.symbol)
                    .or_insert_with_key(|s| Arc::from(s.as_str()))
                    .clone();
                occurrences.push(Occurrence {
                    symbol,
                    range,
                    roles: occ.symbol_roles,
                });
            }

            // First document wins if a producer repeats a path
            by_path
                .entry(doc.relative_path.clone())
                .or_insert(documents.len());
            documents.push(Document {
                relative_path: doc.relative_path,
                occurrences,
            });
        }

        Self {
            documents,
            by_path,
            tool,
        }
    }

    pub fn document(&self, relative_path: &str) -> Option<&Document> {
        self.by_path.get(relative_path).map(|&i| &self.documents[i])
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn occurrence_count(&self) -> usize {
        self.documents.iter().map(|d| d.occurrences.len()).sum()
    }

    /// Name and version of the indexer that produced this index
    pub fn tool(&self) -> Option<&str> {
        self.tool.as_deref()
    }

    /// Symbol under a 0-based cursor
    ///
    /// Returns `DocumentMissing` when the file is not part of the index and
    /// `Ok(None)` when the document exists but no occurrence covers the cursor.
    pub fn find_symbol_at(&self, relative_path: &str, line: i32, column: i32) -> Result<Option<&str>> {
        let doc = self
            .document(relative_path)
            .ok_or_else(|| CodeBrowserError::DocumentMissing {
                path: relative_path.to_string(),
            })?;
        Ok(doc.symbol_at(line, column))
    }

    /// Every occurrence of `symbol` with the requested role, in
    /// document-then-occurrence order, without deduplication
    pub fn occurrences_of(&self, symbol: &str, kind: LookupKind) -> Vec<SymbolLocation> {
        let mut locations = Vec::new();
        for doc in &self.documents {
            for occ in &doc.occurrences {
                if occ.symbol.as_ref() == symbol && kind.matches_roles(occ.roles) {
                    locations.push(SymbolLocation {
                        document_path: doc.relative_path.clone(),
                        range: occ.range,
                    });
                }
            }
        }
        locations
    }
}

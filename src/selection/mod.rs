//! Mapping of metadata blobs to the binary blobs they reference
//!
//! A metadata blob is a small JSON document such as
//! `{"atoms": {"Data": "<uuid>,binary"}}`. A [`LookupExpression`] picks the
//! entries naming binary blobs, and the title's [`SaveLayout`] decides where
//! each binary is written locally.

mod strategy;


pub use strategy::{ByLookupKeyStrategy, ByRemoteNameStrategy, LayoutStrategy};

use crate::error::SelectionError;
use crate::registry::SaveLayout;
use crate::types::BlobHandle;
use serde_json::Value;
use serde_json_path::{JsonPath, PathElement};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Lookup used for titles that are not in the registry
pub const DEFAULT_LOOKUP_FILTER: &str = "atoms.*";

/// A compiled path query over a metadata document
///
/// Expressions are JSONPath. A leading `$` may be omitted (`atoms.*` is
/// read as `$.atoms.*`).
#[derive(Clone)]
pub struct LookupExpression {
    source: String,
    path: Arc<JsonPath>,
}

impl LookupExpression {
    /// Compile an expression
    pub fn parse(expression: &str) -> Result<Self, SelectionError> {
        let trimmed = expression.trim();
        let rooted = if trimmed.starts_with('$') {
            trimmed.to_string()
        } else if trimmed.starts_with('[') {
            format!("${}", trimmed)
        } else {
            format!("$.{}", trimmed)
        };

        let path = JsonPath::parse(&rooted).map_err(|e| SelectionError::InvalidExpression {
            expression: expression.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            source: expression.to_string(),
            path: Arc::new(path),
        })
    }

    /// The expression as configured
    pub fn source(&self) -> &str {
        &self.source
    }

    /// All matches in document order
    pub fn evaluate(&self, document: &Value) -> Vec<LookupMatch> {
        self.path
            .query_located(document)
            .iter()
            .map(|node| LookupMatch {
                key: match node.location().last() {
                    Some(PathElement::Name(name)) => name.to_string(),
                    Some(PathElement::Index(index)) => index.to_string(),
                    None => String::new(),
                },
                value: node.node().clone(),
            })
            .collect()
    }
}

impl fmt::Debug for LookupExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LookupExpression").field(&self.source).finish()
    }
}

impl fmt::Display for LookupExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// One node matched by a lookup expression
#[derive(Clone, Debug, PartialEq)]
pub struct LookupMatch {
    /// Last element of the match's location (member name or array index)
    pub key: String,
    /// The matched value; a remote blob name when it is a string
    pub value: Value,
}

/// One binary blob to download
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannedFetch {
    /// Remote blob name
    pub remote_name: String,
    /// Absolute local target path
    pub local_path: PathBuf,
}

/// Ordered remote → local mapping produced for one metadata blob
pub type FileSelection = Vec<PlannedFetch>;

/// Per-title selection logic: a lookup expression plus a save layout
#[derive(Clone, Debug)]
pub struct TitleSelector {
    expression: LookupExpression,
    layout: SaveLayout,
}

impl TitleSelector {
    /// Combine an expression and a layout
    pub fn new(expression: LookupExpression, layout: SaveLayout) -> Self {
        Self { expression, layout }
    }

    /// Selector for unregistered titles: every child of `atoms`, named by key
    pub fn fallback() -> Result<Self, SelectionError> {
        Ok(Self::new(
            LookupExpression::parse(DEFAULT_LOOKUP_FILTER)?,
            SaveLayout::ByLookupKey,
        ))
    }

    /// The lookup expression
    pub fn expression(&self) -> &LookupExpression {
        &self.expression
    }

    /// The save layout
    pub fn layout(&self) -> SaveLayout {
        self.layout
    }

    /// Decide which binaries a parsed metadata document references
    ///
    /// Returns [`SelectionError::NoMatch`] when the expression finds
    /// nothing; the caller skips that blob. Layout violations are returned
    /// as the fatal errors they are.
    pub fn select(
        &self,
        blob: &BlobHandle,
        document: &Value,
        download_dir: &Path,
    ) -> Result<FileSelection, SelectionError> {
        let matches = self.expression.evaluate(document);
        if matches.is_empty() {
            return Err(SelectionError::NoMatch {
                blob: blob.file_name.clone(),
                expression: self.expression.source().to_string(),
            });
        }

        self.layout.strategy().plan(blob, matches, download_dir)
    }

    /// Like [`select`](Self::select), decoding the metadata file first
    pub fn select_bytes(
        &self,
        blob: &BlobHandle,
        metadata_path: &Path,
        bytes: &[u8],
        download_dir: &Path,
    ) -> Result<FileSelection, SelectionError> {
        let document: Value =
            serde_json::from_slice(bytes).map_err(|e| SelectionError::InvalidDocument {
                blob: metadata_path.to_path_buf(),
                reason: e.to_string(),
            })?;
        self.select(blob, &document, download_dir)
    }
}

impl SaveLayout {
    /// Strategy implementing this layout
    pub fn strategy(&self) -> &'static dyn LayoutStrategy {
        match self {
            SaveLayout::ByLookupKey => &ByLookupKeyStrategy,
            SaveLayout::ByRemoteName => &ByRemoteNameStrategy,
        }
    }
}

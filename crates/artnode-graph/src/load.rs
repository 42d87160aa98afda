//! Reading and validating scanned entries.
//!
//! Each entry is loaded on its own: validation of one directory never looks
//! at another, which is what lets entries be cached and reused by the
//! incremental re-indexer.

use std::sync::Arc;
use std::time::Duration;

use artnode_schema::{
    CollectionMeta, Diagnostic, NodeKind, Payload, SchemaRegistry, infer_kind, parse_document,
    parse_features,
};
use artnode_storage::Storage;
use rayon::prelude::*;
use serde_json::{Map, Value};

use crate::scan::RawEntry;
use crate::timeout::{Abandoned, run_with_timeout};

/// A scanned directory after validation.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    /// Tree path, `""` for the content root.
    pub path: String,
    /// Whether the directory is a content node (has an index, or is the root).
    pub is_node: bool,
    pub kind: NodeKind,
    /// Validated payload; `None` when the node is invalid or not a node.
    pub payload: Option<Payload>,
    /// Collection meta; `None` when absent or invalid.
    pub meta: Option<CollectionMeta>,
    /// Media file names found next to the documents.
    pub media: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Entry {
    #[must_use]
    pub fn is_valid_node(&self) -> bool {
        self.is_node && self.payload.is_some()
    }
}

/// Reads entry documents through storage and validates them.
pub struct Loader<'a> {
    storage: &'a Arc<dyn Storage>,
    registry: &'a SchemaRegistry,
    read_timeout: Duration,
}

impl<'a> Loader<'a> {
    pub fn new(
        storage: &'a Arc<dyn Storage>,
        registry: &'a SchemaRegistry,
        read_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            registry,
            read_timeout,
        }
    }

    /// Load entries in parallel, preserving input order.
    pub fn load_all(&self, raws: &[RawEntry]) -> Vec<Entry> {
        raws.par_iter().map(|raw| self.load(raw)).collect()
    }

    /// Load a single entry.
    pub fn load(&self, raw: &RawEntry) -> Entry {
        let mut diagnostics = Vec::new();
        let is_node = raw.index.is_some() || raw.path.is_empty();

        let meta = raw
            .meta
            .as_deref()
            .and_then(|file| self.load_meta(&raw.path, file, &mut diagnostics));
        let meta_failed = raw.meta.is_some() && meta.is_none();

        let (kind, mut payload) = if is_node {
            self.load_index(raw, &mut diagnostics)
        } else {
            (NodeKind::Generic, None)
        };
        if meta_failed {
            payload = None;
        }

        if is_node && payload.is_none() {
            tracing::debug!(path = %raw.path, problems = diagnostics.len(), "Node invalid");
        }

        Entry {
            path: raw.path.clone(),
            is_node,
            kind,
            payload,
            meta,
            media: raw.media.clone(),
            diagnostics,
        }
    }

    fn load_index(
        &self,
        raw: &RawEntry,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> (NodeKind, Option<Payload>) {
        let document = match &raw.index {
            Some(file) => {
                let parsed = self
                    .read(&raw.path, file)
                    .and_then(|content| parse(&raw.path, file, &content));
                match parsed {
                    Ok(document) => document,
                    Err(diagnostic) => {
                        diagnostics.push(diagnostic);
                        return (NodeKind::Generic, None);
                    }
                }
            }
            None => Map::new(),
        };

        let kind = infer_kind(&raw.path, &document);
        let mut payload = match self.registry.validate(&raw.path, &kind, document) {
            Ok(payload) => payload,
            Err(found) => {
                diagnostics.extend(found);
                return (kind, None);
            }
        };
        if let Some(Err(message)) = payload.get("features").map(parse_features) {
            diagnostics.push(Diagnostic::structural(&raw.path, "field.type", message));
            return (kind, None);
        }

        if let Some(file) = &raw.markdown {
            match self.read(&raw.path, file) {
                Ok(body) => payload.insert("markdown", Value::String(body)),
                Err(diagnostic) => {
                    diagnostics.push(diagnostic);
                    return (kind, None);
                }
            }
        }
        (kind, Some(payload))
    }

    fn load_meta(
        &self,
        path: &str,
        file: &str,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<CollectionMeta> {
        let document = match self
            .read(path, file)
            .and_then(|content| parse(path, file, &content))
        {
            Ok(document) => document,
            Err(diagnostic) => {
                diagnostics.push(diagnostic);
                return None;
            }
        };

        let payload = match self.registry.validate_meta(path, document) {
            Ok(payload) => payload,
            Err(found) => {
                diagnostics.extend(found);
                return None;
            }
        };

        let (meta, found) = CollectionMeta::from_payload(path, &payload);
        let discard = found.iter().any(Diagnostic::is_structural);
        diagnostics.extend(found);
        if discard { None } else { Some(meta) }
    }

    fn read(&self, path: &str, file: &str) -> Result<String, Diagnostic> {
        let storage = Arc::clone(self.storage);
        let target = file.to_owned();
        match run_with_timeout(self.read_timeout, move || storage.read(&target)) {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => {
                tracing::warn!(file, error = %e, "Failed to read document");
                Err(Diagnostic::resource(
                    path,
                    "read.failed",
                    format!("cannot read '{file}': {e}"),
                ))
            }
            Err(Abandoned::Panicked) => {
                tracing::warn!(file, "Reader panicked");
                Err(Diagnostic::resource(
                    path,
                    "read.failed",
                    format!("cannot read '{file}': reader panicked"),
                ))
            }
            Err(Abandoned::TimedOut) => {
                tracing::warn!(file, timeout_ms = self.read_timeout.as_millis(), "Read timed out");
                Err(Diagnostic::resource(
                    path,
                    "read.timeout",
                    format!(
                        "reading '{file}' did not finish within {} ms",
                        self.read_timeout.as_millis()
                    ),
                ))
            }
        }
    }
}

fn parse(path: &str, file: &str, content: &str) -> Result<Map<String, Value>, Diagnostic> {
    parse_document(content).map_err(|message| {
        Diagnostic::structural(path, "document.parse", format!("{file}: {message}"))
    })
}

//! Content tree discovery.
//!
//! Walks the tree through [`Storage`] and returns one [`RawEntry`] per
//! directory that holds an index or meta document. Nothing is read at this
//! stage; entries only carry file locations.

use artnode_schema::Diagnostic;
use artnode_storage::{Storage, StorageErrorKind, join_path, parent_path};
use rayon::prelude::*;

/// Markdown body attached to an index document.
pub const MARKDOWN_NAME: &str = "index.md";

/// File names that carry documents rather than media.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentNames {
    /// Index document name (default `index.yaml`).
    pub index: String,
    /// Collection meta document name (default `_meta.yaml`).
    pub meta: String,
}

impl Default for DocumentNames {
    fn default() -> Self {
        Self {
            index: "index.yaml".to_owned(),
            meta: "_meta.yaml".to_owned(),
        }
    }
}

/// A directory that may become a node or carry collection meta.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawEntry {
    /// Tree path, `""` for the content root.
    pub path: String,
    /// Tree path of the index document, if present.
    pub index: Option<String>,
    /// Tree path of the meta document, if present.
    pub meta: Option<String>,
    /// Tree path of the Markdown body, if present.
    pub markdown: Option<String>,
    /// Names of the media files in the directory, sorted.
    pub media: Vec<String>,
}

/// Result of a scan: entries sorted by tree path plus scan diagnostics.
#[derive(Debug, Default)]
pub struct ScanOutput {
    pub entries: Vec<RawEntry>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ScanOutput {
    fn merge(mut self, other: Self) -> Self {
        self.entries.extend(other.entries);
        self.diagnostics.extend(other.diagnostics);
        self
    }
}

/// Walks a content tree.
pub struct Scanner<'a> {
    storage: &'a dyn Storage,
    names: &'a DocumentNames,
}

impl<'a> Scanner<'a> {
    pub fn new(storage: &'a dyn Storage, names: &'a DocumentNames) -> Self {
        Self { storage, names }
    }

    /// Scan the whole tree.
    ///
    /// The content root always yields an entry, even when it has no
    /// documents, so the caller can report a missing root meta.
    pub fn scan(&self) -> ScanOutput {
        let mut output = self.scan_dir("", Vec::new());
        if !output.entries.iter().any(|e| e.path.is_empty()) {
            output.entries.push(RawEntry::default());
        }
        output.entries.sort_by(|a, b| a.path.cmp(&b.path));
        output.diagnostics.sort();
        output
    }

    /// Scan the subtree rooted at `scope`.
    ///
    /// Ancestor identities are resolved first so a symlink inside the scope
    /// that points back above it is still detected. A scope that no longer
    /// exists yields nothing.
    pub fn scan_subtree(&self, scope: &str) -> ScanOutput {
        if scope.is_empty() {
            return self.scan();
        }

        let mut ancestors = Vec::new();
        let mut current = parent_path(scope);
        while let Some(dir) = current {
            if let Ok(identity) = self.storage.identity(dir) {
                ancestors.push(identity);
            }
            current = parent_path(dir);
        }
        ancestors.reverse();

        let mut output = self.scan_dir(scope, ancestors);
        output.entries.sort_by(|a, b| a.path.cmp(&b.path));
        output.diagnostics.sort();
        output
    }

    fn scan_dir(&self, dir: &str, mut ancestors: Vec<String>) -> ScanOutput {
        let identity = match self.storage.identity(dir) {
            Ok(identity) => identity,
            Err(e) if e.kind == StorageErrorKind::NotFound => return ScanOutput::default(),
            Err(e) => return Self::unreadable(dir, &e.to_string()),
        };
        if ancestors.contains(&identity) {
            tracing::warn!(path = dir, target = %identity, "Directory cycle detected");
            return ScanOutput {
                entries: Vec::new(),
                diagnostics: vec![Diagnostic::resource(
                    dir,
                    "scan.cycle",
                    format!("'{dir}' leads back to ancestor '{identity}'; not followed"),
                )],
            };
        }

        let listing = match self.storage.list(dir) {
            Ok(listing) => listing,
            Err(e) if e.kind == StorageErrorKind::NotFound => return ScanOutput::default(),
            Err(e) => return Self::unreadable(dir, &e.to_string()),
        };
        ancestors.push(identity);

        let mut entry = RawEntry {
            path: dir.to_owned(),
            ..RawEntry::default()
        };
        let mut subdirs = Vec::new();
        for item in listing {
            if item.name.starts_with('.') {
                continue;
            }
            let path = join_path(dir, &item.name);
            if item.is_dir() {
                subdirs.push(path);
            } else if item.name == self.names.index {
                entry.index = Some(path);
            } else if item.name == self.names.meta {
                entry.meta = Some(path);
            } else if item.name == MARKDOWN_NAME {
                entry.markdown = Some(path);
            } else {
                entry.media.push(item.name);
            }
        }
        entry.media.sort();

        let mut output = ScanOutput::default();
        if entry.index.is_some() || entry.meta.is_some() || dir.is_empty() {
            output.entries.push(entry);
        }

        let nested = subdirs
            .par_iter()
            .map(|sub| self.scan_dir(sub, ancestors.clone()))
            .reduce(ScanOutput::default, ScanOutput::merge);
        output.merge(nested)
    }

    fn unreadable(dir: &str, message: &str) -> ScanOutput {
        tracing::warn!(path = dir, error = message, "Directory unreadable");
        ScanOutput {
            entries: Vec::new(),
            diagnostics: vec![Diagnostic::resource(dir, "scan.unreadable", message)],
        }
    }
}

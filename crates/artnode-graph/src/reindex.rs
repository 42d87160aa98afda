//! Incremental re-indexing.
//!
//! A change batch is reduced to rescan roots (directories whose subtrees
//! are scanned again) and a closure of affected ids (nodes whose artifacts
//! must be rendered again). Linking and resolution still see the whole
//! entry set; only scanning and rendering are narrowed.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU8, Ordering};

use artnode_storage::parent_path;

use crate::graph::{ContentGraph, ContentNode, is_within};
use crate::inherit::ancestor_chain;
use crate::load::Entry;

/// Stage of the build state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Scanning,
    RebuildingSubgraph,
    Resolving,
    Emitting,
}

impl Phase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Scanning,
            2 => Self::RebuildingSubgraph,
            3 => Self::Resolving,
            4 => Self::Emitting,
            _ => Self::Idle,
        }
    }
}

/// Lock-free holder of the current [`Phase`].
#[derive(Debug, Default)]
pub(crate) struct PhaseCell(AtomicU8);

impl PhaseCell {
    pub fn get(&self) -> Phase {
        Phase::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, phase: Phase) {
        tracing::trace!(?phase, "Build phase");
        self.0.store(phase as u8, Ordering::Release);
    }

    /// Enter `phase`; the cell returns to [`Phase::Idle`] when the guard drops.
    pub fn enter(&self, phase: Phase) -> PhaseGuard<'_> {
        self.set(phase);
        PhaseGuard(self)
    }
}

pub(crate) struct PhaseGuard<'a>(&'a PhaseCell);

impl PhaseGuard<'_> {
    pub fn advance(&self, phase: Phase) {
        self.0.set(phase);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.0.set(Phase::Idle);
    }
}

/// Map changed file paths to the directories to scan again.
///
/// A file maps to its parent directory; nested roots collapse into the
/// outermost one. A result containing `""` means the whole tree.
pub(crate) fn rescan_roots(changed: &BTreeSet<String>) -> Vec<String> {
    let dirs: BTreeSet<String> = changed
        .iter()
        .map(|path| path.trim_matches('/'))
        .map(|path| parent_path(path).unwrap_or_default().to_owned())
        .collect();

    let mut roots: Vec<String> = Vec::new();
    // Sorted order puts every ancestor before its descendants.
    for dir in dirs {
        if !roots.iter().any(|root| is_within(&dir, root)) {
            roots.push(dir);
        }
    }
    roots
}

/// Ids whose artifacts may change after rescanning `roots`.
///
/// Contains every old or new entry inside a root (descendants included,
/// since meta changes flow down by inheritance), every ancestor of those,
/// and every source that referenced one of them before or after the change.
pub(crate) fn closure(
    roots: &[String],
    old_entries: &[Entry],
    new_entries: &[Entry],
    old_declared: &BTreeMap<String, BTreeSet<String>>,
    new_declared: &BTreeMap<String, BTreeSet<String>>,
) -> BTreeSet<String> {
    let inside = |path: &str| roots.iter().any(|root| is_within(path, root));

    let mut affected: BTreeSet<String> = old_entries
        .iter()
        .chain(new_entries)
        .map(|entry| entry.path.as_str())
        .filter(|path| inside(path))
        .map(str::to_owned)
        .collect();
    affected.extend(roots.iter().cloned());

    let ancestors: Vec<String> = affected
        .iter()
        .flat_map(|path| ancestor_chain(path))
        .collect();
    affected.extend(ancestors);

    let referrers: Vec<String> = old_declared
        .iter()
        .chain(new_declared)
        .filter(|(_, targets)| targets.iter().any(|t| affected.contains(t)))
        .map(|(source, _)| source.clone())
        .collect();
    affected.extend(referrers);
    affected
}

/// Whether `node` renders to the same document it had in `previous`.
///
/// A node document is a function of the node and its accepted references.
/// Cycle checks follow transitive paths, so an edit far away can change a
/// node's references without the node being in the closure.
pub(crate) fn render_inputs_unchanged(
    previous: &ContentGraph,
    next: &ContentGraph,
    node: &ContentNode,
) -> bool {
    previous.node(&node.id) == Some(node) && previous.refs(&node.id) == next.refs(&node.id)
}

#[cfg(test)]
mod tests {
    use artnode_schema::NodeKind;
    use pretty_assertions::assert_eq;

    use super::*;

    fn set(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| (*p).to_owned()).collect()
    }

    fn entry(path: &str) -> Entry {
        Entry {
            path: path.to_owned(),
            is_node: true,
            kind: NodeKind::Generic,
            payload: None,
            meta: None,
            media: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    #[test]
    fn test_rescan_roots_collapse_nested() {
        let roots = rescan_roots(&set(&[
            "artists/zol/index.yaml",
            "artists/zol/albums/one/index.yaml",
            "pages/about/index.md",
        ]));
        assert_eq!(roots, vec!["artists/zol", "pages/about"]);
    }

    #[test]
    fn test_rescan_roots_root_file() {
        let roots = rescan_roots(&set(&["_meta.yaml", "pages/about/index.yaml"]));
        assert_eq!(roots, vec![""]);
    }

    #[test]
    fn test_closure_ancestors_descendants_and_referrers() {
        let old = vec![
            entry(""),
            entry("artists/zol"),
            entry("artists/zol/albums/one"),
            entry("pages/about"),
            entry("pages/contact"),
        ];
        let mut declared = BTreeMap::new();
        declared.insert("pages/about".to_owned(), set(&["artists/zol/albums/one"]));
        declared.insert("artists".to_owned(), set(&["artists/zol"]));

        let affected = closure(
            &["artists/zol".to_owned()],
            &old,
            &old,
            &declared,
            &BTreeMap::new(),
        );

        assert_eq!(
            affected,
            set(&["", "artists", "artists/zol", "artists/zol/albums/one", "pages/about"])
        );
    }

    #[test]
    fn test_closure_includes_removed_entries() {
        let old = vec![entry(""), entry("pages/gone")];
        let new = vec![entry("")];

        let affected = closure(&["pages/gone".to_owned()], &old, &new, &BTreeMap::new(), &BTreeMap::new());

        assert!(affected.contains("pages/gone"));
        assert!(affected.contains("pages"));
    }

    #[test]
    fn test_phase_guard_resets() {
        let cell = PhaseCell::default();
        {
            let guard = cell.enter(Phase::Scanning);
            guard.advance(Phase::Resolving);
            assert_eq!(cell.get(), Phase::Resolving);
        }
        assert_eq!(cell.get(), Phase::Idle);
    }
}

//! Graph compilation from validated entries.
//!
//! Entries → link → routes → resolution → [`ContentGraph`]. Scanning and
//! loading happen before this stage and rendering after it.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use artnode_schema::Diagnostic;

use crate::cancel::CancelToken;
use crate::error::BuildError;
use crate::graph::{ContentGraph, GraphParts};
use crate::inherit::Defaults;
use crate::link::link;
use crate::load::Entry;
use crate::media::MediaResolver;
use crate::reindex::{Phase, PhaseGuard};
use crate::resolve::Resolver;
use crate::routes::assign_routes;

/// A compiled graph plus the raw references needed for the next closure.
pub(crate) struct Compiled {
    pub graph: ContentGraph,
    pub declared: BTreeMap<String, BTreeSet<String>>,
}

/// Shared inputs of a compilation.
pub(crate) struct Compiler<'a> {
    pub defaults: &'a Defaults,
    pub media: MediaResolver<'a>,
    pub cancel: &'a CancelToken,
}

impl Compiler<'_> {
    /// Compile `entries` (sorted by path) into a graph.
    ///
    /// # Errors
    ///
    /// Fails on an unusable content root, an unresolvable `root_content`
    /// target, a route collision, or cancellation.
    pub fn compile(
        self,
        entries: &[Entry],
        scan_diagnostics: &[Diagnostic],
        phase: &PhaseGuard<'_>,
    ) -> Result<Compiled, BuildError> {
        let root_target = root_target(entries)?;

        phase.advance(Phase::RebuildingSubgraph);
        let mut linked = link(entries, &root_target);
        let routes = assign_routes(&mut linked.nodes, &root_target)?;
        self.cancel.check()?;

        phase.advance(Phase::Resolving);
        let files: HashMap<&str, &[String]> = entries
            .iter()
            .filter(|e| e.is_valid_node())
            .map(|e| (e.path.as_str(), e.media.as_slice()))
            .collect();
        let resolver = Resolver {
            metas: &linked.metas,
            defaults: self.defaults,
            media: self.media,
            files,
        };
        resolver.resolve_all(&mut linked.nodes);
        self.cancel.check()?;

        let mut diagnostics: Vec<Diagnostic> = scan_diagnostics
            .iter()
            .chain(&linked.diagnostics)
            .chain(linked.nodes.iter().flat_map(|n| &n.diagnostics))
            .cloned()
            .collect();
        diagnostics.sort();
        diagnostics.dedup();

        let graph = ContentGraph::new(GraphParts {
            nodes: linked.nodes,
            metas: linked.metas,
            refs: linked.refs,
            routes,
            root_target,
            defaults: self.defaults.clone(),
            diagnostics,
        });
        Ok(Compiled {
            graph,
            declared: linked.declared,
        })
    }
}

/// Check the content root and read its `root_content` target.
fn root_target(entries: &[Entry]) -> Result<String, BuildError> {
    let Some(root) = entries.iter().find(|e| e.path.is_empty()) else {
        return Err(BuildError::RootMeta(
            "content root has no meta document".to_owned(),
        ));
    };

    let Some(meta) = &root.meta else {
        let reason = root.diagnostics.first().map_or_else(
            || "content root has no meta document".to_owned(),
            |d| format!("content-root meta is invalid: {}", d.message),
        );
        return Err(BuildError::RootMeta(reason));
    };
    if !root.is_valid_node() {
        let message = root
            .diagnostics
            .first()
            .map_or("unknown problem", |d| d.message.as_str());
        return Err(BuildError::RootMeta(format!(
            "content-root index is invalid: {message}"
        )));
    }

    Ok(match meta.root_content.as_deref() {
        None | Some(".") => String::new(),
        Some(target) => target.to_owned(),
    })
}

/// Compile an in-memory tree with default settings.
#[cfg(test)]
pub(crate) fn graph_from(storage: artnode_storage::MockStorage) -> ContentGraph {
    try_graph_from(storage).unwrap()
}

#[cfg(test)]
pub(crate) fn try_graph_from(
    storage: artnode_storage::MockStorage,
) -> Result<ContentGraph, BuildError> {
    use std::sync::Arc;
    use std::time::Duration;

    use artnode_schema::SchemaRegistry;
    use artnode_storage::Storage;

    use crate::load::Loader;
    use crate::media::{MediaSettings, TokenCache, unix_now};
    use crate::reindex::PhaseCell;
    use crate::scan::{DocumentNames, Scanner};

    let storage: Arc<dyn Storage> = Arc::new(storage);
    let names = DocumentNames::default();
    let scanned = Scanner::new(storage.as_ref(), &names).scan();
    let registry = SchemaRegistry::builtin();
    let entries = Loader::new(&storage, &registry, Duration::from_secs(5)).load_all(&scanned.entries);

    let settings = MediaSettings::default();
    let tokens = TokenCache::new();
    let defaults = Defaults::default();
    let cancel = CancelToken::new();
    let cell = PhaseCell::default();
    let phase = cell.enter(Phase::Scanning);
    let compiler = Compiler {
        defaults: &defaults,
        media: MediaResolver {
            settings: &settings,
            signer: None,
            tokens: &tokens,
            storage: storage.as_ref(),
            now: unix_now(),
        },
        cancel: &cancel,
    };
    compiler
        .compile(&entries, &scanned.diagnostics, &phase)
        .map(|compiled| compiled.graph)
}

#[cfg(test)]
mod tests {
    use artnode_storage::MockStorage;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_missing_root_meta_is_fatal() {
        let storage = MockStorage::new().with_file("pages/about/index.yaml", "title: About");
        let err = try_graph_from(storage).unwrap_err();
        assert!(matches!(err, BuildError::RootMeta(_)), "{err:?}");
    }

    #[test]
    fn test_invalid_root_meta_is_fatal() {
        let storage = MockStorage::new().with_file("_meta.yaml", "theme: [unclosed");
        let err = try_graph_from(storage).unwrap_err();
        let BuildError::RootMeta(message) = err else {
            panic!("expected root meta error");
        };
        assert!(message.contains("invalid"), "{message}");
    }

    #[test]
    fn test_invalid_root_index_is_fatal() {
        let storage = MockStorage::new()
            .with_file("_meta.yaml", "")
            .with_file("index.yaml", "order: first");
        assert!(matches!(
            try_graph_from(storage),
            Err(BuildError::RootMeta(_))
        ));
    }

    #[test]
    fn test_root_content_override() {
        let storage = MockStorage::new()
            .with_file("_meta.yaml", "root_content: artists/zol")
            .with_file("artists/zol/index.yaml", "title: Zol");

        let graph = graph_from(storage);

        assert_eq!(graph.root_target(), "artists/zol");
        assert_eq!(graph.node_by_route("/").unwrap().id, "artists/zol");
        assert_eq!(graph.node_by_route("/artists/zol").unwrap().id, "artists/zol");
    }

    #[test]
    fn test_root_content_dot_means_root() {
        let storage = MockStorage::new().with_file("_meta.yaml", "root_content: .");
        let graph = graph_from(storage);
        assert_eq!(graph.root_target(), "");
        assert_eq!(graph.node_by_route("/").unwrap().id, "");
    }

    #[test]
    fn test_malformed_node_does_not_abort() {
        let storage = MockStorage::new()
            .with_file("_meta.yaml", "")
            .with_file("pages/ok/index.yaml", "title: Ok")
            .with_file("pages/bad/index.yaml", "title: [unclosed");

        let graph = graph_from(storage);

        assert!(graph.node("pages/ok").unwrap().is_valid());
        assert!(!graph.node("pages/bad").unwrap().is_valid());
        assert!(graph.node_by_route("/pages/bad").is_none());
        let rules: Vec<&str> = graph.diagnostics().iter().map(|d| d.rule.as_str()).collect();
        assert_eq!(rules, vec!["document.parse"]);
    }

    #[test]
    fn test_every_valid_node_has_layout_and_theme() {
        let storage = MockStorage::new()
            .with_file("_meta.yaml", "theme: dusk")
            .with_file("artists/_meta.yaml", "layout: grid")
            .with_file("artists/zol/index.yaml", "title: Zol")
            .with_file("pages/about/index.yaml", "title: About\nlayout: narrow");

        let graph = graph_from(storage);

        for node in graph.valid_nodes() {
            assert!(node.layout.is_some(), "{}", node.id);
            assert_eq!(node.theme.as_deref(), Some("dusk"), "{}", node.id);
        }
        assert_eq!(graph.node("artists/zol").unwrap().layout.as_deref(), Some("grid"));
        assert_eq!(graph.node("pages/about").unwrap().layout.as_deref(), Some("narrow"));
        assert_eq!(graph.node("").unwrap().layout.as_deref(), Some("default"));
    }

    #[test]
    fn test_diagnostics_sorted_and_deduped() {
        let storage = MockStorage::new()
            .with_file("_meta.yaml", "")
            .with_file(
                "pages/a/index.yaml",
                "title: A\ncontent:\n  - type: subpage\n    ref: pages/none\n",
            )
            .with_file("pages/b/index.yaml", "order: x");

        let graph = graph_from(storage);

        let diagnostics = graph.diagnostics();
        let mut sorted = diagnostics.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(diagnostics, sorted.as_slice());
        assert_eq!(diagnostics[0].path, "pages/a");
        assert_eq!(diagnostics[1].path, "pages/b");
    }
}

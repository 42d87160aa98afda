//! The content graph arena.
//!
//! Nodes live in a flat vector sorted by id and are addressed by id through
//! a hash index. Parent/child edges are stored on the nodes; named
//! cross-references form a separate overlay keyed by source id, so a source
//! may also be a meta-only directory.

use std::collections::{BTreeMap, HashMap};

use artnode_schema::{CollectionMeta, Diagnostic, Features, NodeKind, Payload};
use serde::Serialize;

use crate::inherit::Defaults;
use crate::media::AccessDescriptor;
use crate::store::StoreDescriptor;

/// Named cross-reference kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    /// `subpage` blocks in the node's content.
    Subpage,
    /// Collection meta roster entries.
    Roster,
    /// Collection meta imprint entries.
    Imprint,
    /// Album to track membership.
    Tracks,
    /// Track to owning album.
    Album,
    /// Set to the tracks it plays.
    Tracklist,
}

impl RefKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Subpage => "subpage",
            Self::Roster => "roster",
            Self::Imprint => "imprint",
            Self::Tracks => "tracks",
            Self::Album => "album",
            Self::Tracklist => "tracklist",
        }
    }
}

/// Resolved cross-references of one source, in acceptance order.
pub type RefMap = BTreeMap<RefKind, Vec<String>>;

/// Validation status of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Valid,
    Invalid,
}

/// A node of the content graph.
///
/// Invalid nodes keep their identity and diagnostics but carry no route,
/// layout, theme, or edges.
#[derive(Clone, Debug, PartialEq)]
pub struct ContentNode {
    /// Tree path joined with `/`; `""` for the content root.
    pub id: String,
    /// Tree path segments.
    pub path: Vec<String>,
    pub kind: NodeKind,
    pub status: NodeStatus,
    pub payload: Payload,
    /// Nearest valid ancestor node.
    pub parent: Option<String>,
    /// Valid child nodes, ordered by explicit `order` then id.
    pub children: Vec<String>,
    pub route: Option<String>,
    pub layout: Option<String>,
    pub theme: Option<String>,
    pub features: Features,
    pub effects: Vec<String>,
    pub media: Vec<AccessDescriptor>,
    /// Resolved `background` media URL.
    pub background: Option<String>,
    pub store: Option<StoreDescriptor>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ContentNode {
    /// Shell created before linking.
    pub(crate) fn shell(id: &str, kind: NodeKind, payload: Option<Payload>) -> Self {
        let status = if payload.is_some() {
            NodeStatus::Valid
        } else {
            NodeStatus::Invalid
        };
        Self {
            id: id.to_owned(),
            path: segments(id),
            kind,
            status,
            payload: payload.unwrap_or_default(),
            parent: None,
            children: Vec::new(),
            route: None,
            layout: None,
            theme: None,
            features: Features::new(),
            effects: Vec::new(),
            media: Vec::new(),
            background: None,
            store: None,
            diagnostics: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.status == NodeStatus::Valid
    }

    /// Human label: title, then the last path segment, then the id.
    #[must_use]
    pub fn title(&self) -> &str {
        self.payload
            .title()
            .or_else(|| self.path.last().map(String::as_str))
            .unwrap_or(self.id.as_str())
    }

    /// Sort key for sibling ordering.
    ///
    /// Slugs named in the parent collection's `collection_order` come first,
    /// in list order. The rest follow by explicit `order`, then by id.
    pub(crate) fn order_key(&self, collection_order: &[String]) -> (usize, bool, i64, &str) {
        let slug = self.path.last().map_or("", String::as_str);
        let listed = collection_order
            .iter()
            .position(|listed| listed == slug)
            .unwrap_or(collection_order.len());
        let order = self.payload.order();
        (listed, order.is_none(), order.unwrap_or_default(), &self.id)
    }
}

/// Split an id into its segments.
pub(crate) fn segments(id: &str) -> Vec<String> {
    if id.is_empty() {
        Vec::new()
    } else {
        id.split('/').map(str::to_owned).collect()
    }
}

/// Whether `id` lies strictly below directory `dir`.
pub(crate) fn is_strictly_under(id: &str, dir: &str) -> bool {
    if dir.is_empty() {
        !id.is_empty()
    } else {
        id.strip_prefix(dir).is_some_and(|rest| rest.starts_with('/'))
    }
}

/// Whether `id` is `dir` or lies below it.
pub(crate) fn is_within(id: &str, dir: &str) -> bool {
    id == dir || is_strictly_under(id, dir)
}

/// Immutable, fully resolved content graph.
#[derive(Clone, Debug, Default)]
pub struct ContentGraph {
    nodes: Vec<ContentNode>,
    index: HashMap<String, usize>,
    metas: BTreeMap<String, CollectionMeta>,
    refs: BTreeMap<String, RefMap>,
    routes: BTreeMap<String, String>,
    root_target: String,
    defaults: Defaults,
    diagnostics: Vec<Diagnostic>,
}

impl ContentGraph {
    pub(crate) fn new(parts: GraphParts) -> Self {
        let index = parts
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id.clone(), i))
            .collect();
        Self {
            nodes: parts.nodes,
            index,
            metas: parts.metas,
            refs: parts.refs,
            routes: parts.routes,
            root_target: parts.root_target,
            defaults: parts.defaults,
            diagnostics: parts.diagnostics,
        }
    }

    /// Node by id, valid or not.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&ContentNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// All nodes sorted by id.
    #[must_use]
    pub fn nodes(&self) -> &[ContentNode] {
        &self.nodes
    }

    pub fn valid_nodes(&self) -> impl Iterator<Item = &ContentNode> {
        self.nodes.iter().filter(|n| n.is_valid())
    }

    /// Valid node served at `route`.
    ///
    /// The route is normalized first, so `/artists/zol/` finds the node at
    /// `/artists/zol`.
    #[must_use]
    pub fn node_by_route(&self, route: &str) -> Option<&ContentNode> {
        let id = self.routes.get(&crate::routes::normalize_route(route))?;
        self.node(id)
    }

    /// The content-root node.
    #[must_use]
    pub fn root(&self) -> Option<&ContentNode> {
        self.node("")
    }

    /// Id of the node served at `/`.
    #[must_use]
    pub fn root_target(&self) -> &str {
        &self.root_target
    }

    /// Accepted cross-references of a node or meta directory.
    #[must_use]
    pub fn refs(&self, source: &str) -> Option<&RefMap> {
        self.refs.get(source)
    }

    /// Targets of one reference kind, empty when none.
    #[must_use]
    pub fn refs_of(&self, source: &str, kind: RefKind) -> &[String] {
        self.refs
            .get(source)
            .and_then(|refs| refs.get(&kind))
            .map_or(&[], Vec::as_slice)
    }

    /// Valid collection meta at a directory.
    #[must_use]
    pub fn meta(&self, dir: &str) -> Option<&CollectionMeta> {
        self.metas.get(dir)
    }

    /// Valid collection metas by directory.
    #[must_use]
    pub fn metas(&self) -> &BTreeMap<String, CollectionMeta> {
        &self.metas
    }

    /// The routing table.
    #[must_use]
    pub fn routes(&self) -> &BTreeMap<String, String> {
        &self.routes
    }

    #[must_use]
    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    /// Every diagnostic of the build, sorted.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Ids of the nearest valid ancestors, nearest first.
    pub fn ancestors<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a str> {
        let start = self.node(id).and_then(|n| n.parent.as_deref());
        std::iter::successors(start, |current| {
            self.node(current).and_then(|n| n.parent.as_deref())
        })
    }
}

/// Everything needed to assemble a [`ContentGraph`].
pub(crate) struct GraphParts {
    pub nodes: Vec<ContentNode>,
    pub metas: BTreeMap<String, CollectionMeta>,
    pub refs: BTreeMap<String, RefMap>,
    pub routes: BTreeMap<String, String>,
    pub root_target: String,
    pub defaults: Defaults,
    pub diagnostics: Vec<Diagnostic>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::{Map, json};

    use super::*;

    fn payload(value: serde_json::Value) -> Payload {
        let serde_json::Value::Object(map) = value else {
            panic!("object expected");
        };
        Payload::new(map)
    }

    fn graph() -> ContentGraph {
        let mut root = ContentNode::shell("", NodeKind::Server, Some(Payload::default()));
        root.children = vec!["artists/zol".to_owned()];
        let mut zol = ContentNode::shell(
            "artists/zol",
            NodeKind::Artist,
            Some(payload(json!({"title": "Zol"}))),
        );
        zol.parent = Some(String::new());
        zol.route = Some("/artists/zol".to_owned());
        let mut album = ContentNode::shell(
            "artists/zol/albums/one",
            NodeKind::Album,
            Some(payload(json!({"title": "One"}))),
        );
        album.parent = Some("artists/zol".to_owned());
        let broken = ContentNode::shell("pages/broken", NodeKind::Page, None);

        let mut routes = BTreeMap::new();
        routes.insert("/".to_owned(), String::new());
        routes.insert("/artists/zol".to_owned(), "artists/zol".to_owned());

        ContentGraph::new(GraphParts {
            nodes: vec![root, zol, album, broken],
            metas: BTreeMap::new(),
            refs: BTreeMap::new(),
            routes,
            root_target: String::new(),
            defaults: Defaults::default(),
            diagnostics: Vec::new(),
        })
    }

    #[test]
    fn test_lookup_by_id_and_route() {
        let graph = graph();
        assert_eq!(graph.node("artists/zol").unwrap().title(), "Zol");
        assert_eq!(graph.node_by_route("/artists/zol/").unwrap().id, "artists/zol");
        assert_eq!(graph.node_by_route("").unwrap().id, "");
        assert!(graph.node_by_route("/pages/broken").is_none());
    }

    #[test]
    fn test_valid_nodes_skip_invalid() {
        let graph = graph();
        let ids: Vec<&str> = graph.valid_nodes().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["", "artists/zol", "artists/zol/albums/one"]);
        assert!(!graph.node("pages/broken").unwrap().is_valid());
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let graph = graph();
        let chain: Vec<&str> = graph.ancestors("artists/zol/albums/one").collect();
        assert_eq!(chain, vec!["artists/zol", ""]);
        assert_eq!(graph.ancestors("").count(), 0);
    }

    #[test]
    fn test_title_falls_back_to_segment() {
        let node = ContentNode::shell("pages/about", NodeKind::Page, Some(Payload::new(Map::new())));
        assert_eq!(node.title(), "about");
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(segments(""), Vec::<String>::new());
        assert_eq!(segments("a/b"), vec!["a", "b"]);
        assert!(is_strictly_under("artists/zol", "artists"));
        assert!(!is_strictly_under("artistsx", "artists"));
        assert!(!is_strictly_under("artists", "artists"));
        assert!(is_strictly_under("artists", ""));
        assert!(is_within("artists", "artists"));
    }

    #[test]
    fn test_ref_kind_names() {
        assert_eq!(RefKind::Tracklist.as_str(), "tracklist");
        assert_eq!(
            serde_json::to_value(RefKind::Subpage).unwrap(),
            json!("subpage")
        );
    }

    static_assertions::assert_impl_all!(ContentGraph: Send, Sync);
}

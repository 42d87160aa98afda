//! Artifact rendering.
//!
//! Turns a resolved [`ContentGraph`] into JSON documents keyed by their
//! path relative to the output directory. Rendering only reads the graph.
//! Object keys are sorted and output is pretty-printed, so an unchanged
//! graph renders to identical bytes.

use std::collections::{BTreeMap, HashSet};

use artnode_schema::{CollectionMeta, Diagnostic, Features, NodeKind};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::EmitError;
use crate::graph::{ContentGraph, ContentNode, RefKind, RefMap, is_strictly_under};
use crate::inherit::inherit;
use crate::link::resolve_target;
use crate::media::AccessDescriptor;
use crate::store::StoreDescriptor;

/// Version stamped into `root.json` and `manifest.json`.
pub const ARTIFACT_VERSION: u32 = 1;

pub const ROOT_ARTIFACT: &str = "root.json";
pub const NAV_ARTIFACT: &str = "nav.json";
pub const MANIFEST_ARTIFACT: &str = "manifest.json";

/// Payload fields that get their own artifact keys instead of `meta`.
const LIFTED_FIELDS: [&str; 8] = [
    "content", "media", "store", "type", "layout", "theme", "effects", "features",
];

/// Rendered artifacts by relative path.
pub type Artifacts = BTreeMap<String, Vec<u8>>;

/// Artifact path of the node document for `id`.
#[must_use]
pub fn node_artifact_path(id: &str) -> String {
    if id.is_empty() {
        "nodes/index.json".to_owned()
    } else {
        format!("nodes/{id}/index.json")
    }
}

/// Artifact path of the collection document for directory `dir`.
#[must_use]
pub fn collection_artifact_path(dir: &str) -> String {
    if dir.is_empty() {
        "collections/index.json".to_owned()
    } else {
        format!("collections/{dir}/index.json")
    }
}

fn to_json<T: Serialize>(artifact: &str, value: &T) -> Result<Vec<u8>, EmitError> {
    let serialize = |source| EmitError::Serialize {
        artifact: artifact.to_owned(),
        source,
    };
    // Going through `Value` sorts struct fields along with map keys.
    let value = serde_json::to_value(value).map_err(serialize)?;
    let mut bytes = serde_json::to_vec_pretty(&value).map_err(serialize)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Hex SHA-256 of artifact bytes.
pub(crate) fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[derive(Serialize)]
struct NodeDocument<'a> {
    id: &'a str,
    path: &'a [String],
    route: Option<&'a str>,
    kind: &'a NodeKind,
    layout: Option<&'a str>,
    theme: Option<&'a str>,
    features: &'a Features,
    effects: &'a [String],
    parent: Option<&'a str>,
    children: &'a [String],
    refs: &'a RefMap,
    meta: Map<String, Value>,
    content: &'a [Value],
    media: &'a [AccessDescriptor],
    #[serde(skip_serializing_if = "Option::is_none")]
    store: Option<&'a StoreDescriptor>,
}

#[derive(Serialize)]
struct RootDocument<'a> {
    version: u32,
    root_route: &'static str,
    root_id: &'a str,
    theme: &'a str,
    routes: &'a BTreeMap<String, String>,
    diagnostics: &'a [Diagnostic],
}

#[derive(Serialize)]
struct CollectionDocument<'a> {
    slug: &'a str,
    display_name: Option<&'a str>,
    layout: String,
    features: Features,
    roster: &'a [String],
    imprints: &'a [String],
    pages: Vec<&'a str>,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
struct NavItem {
    label: String,
    href: String,
    children: Vec<NavItem>,
}

#[derive(Serialize)]
struct NavDocument {
    items: Vec<NavItem>,
}

#[derive(Serialize)]
struct ManifestDocument<'a> {
    version: u32,
    artifacts: BTreeMap<&'a str, String>,
}

/// Renders artifacts from a resolved graph.
pub(crate) struct Renderer<'a> {
    graph: &'a ContentGraph,
    empty_refs: RefMap,
}

impl<'a> Renderer<'a> {
    pub fn new(graph: &'a ContentGraph) -> Self {
        Self {
            graph,
            empty_refs: RefMap::new(),
        }
    }

    /// Render every artifact, manifest included.
    ///
    /// Node documents for which `reuse` returns bytes are taken from there
    /// instead of being rendered again.
    pub fn render<F>(&self, reuse: F) -> Result<Artifacts, EmitError>
    where
        F: Fn(&ContentNode, &str) -> Option<Vec<u8>> + Sync,
    {
        let nodes: Vec<(String, Vec<u8>)> = self
            .graph
            .valid_nodes()
            .collect::<Vec<_>>()
            .par_iter()
            .map(|node| {
                let path = node_artifact_path(&node.id);
                let bytes = match reuse(node, &path) {
                    Some(bytes) => bytes,
                    None => self.node(node, &path)?,
                };
                Ok((path, bytes))
            })
            .collect::<Result<_, EmitError>>()?;

        let mut artifacts: Artifacts = nodes.into_iter().collect();
        for (dir, meta) in self.graph.metas() {
            let path = collection_artifact_path(dir);
            let bytes = self.collection(&path, dir, meta)?;
            artifacts.insert(path, bytes);
        }
        artifacts.insert(ROOT_ARTIFACT.to_owned(), self.root()?);
        artifacts.insert(NAV_ARTIFACT.to_owned(), self.nav()?);

        let manifest = manifest(&artifacts)?;
        artifacts.insert(MANIFEST_ARTIFACT.to_owned(), manifest);
        Ok(artifacts)
    }

    fn node(&self, node: &ContentNode, artifact: &str) -> Result<Vec<u8>, EmitError> {
        let mut meta: Map<String, Value> = node
            .payload
            .fields()
            .iter()
            .filter(|(key, _)| !LIFTED_FIELDS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        match &node.background {
            Some(url) => {
                meta.insert("background".to_owned(), Value::String(url.clone()));
            }
            None => {
                meta.remove("background");
            }
        }

        let document = NodeDocument {
            id: &node.id,
            path: &node.path,
            route: node.route.as_deref(),
            kind: &node.kind,
            layout: node.layout.as_deref(),
            theme: node.theme.as_deref(),
            features: &node.features,
            effects: &node.effects,
            parent: node.parent.as_deref(),
            children: &node.children,
            refs: self.graph.refs(&node.id).unwrap_or(&self.empty_refs),
            meta,
            content: node.payload.blocks(),
            media: &node.media,
            store: node.store.as_ref(),
        };
        to_json(artifact, &document)
    }

    fn root(&self) -> Result<Vec<u8>, EmitError> {
        let graph = self.graph;
        let theme = graph
            .root()
            .and_then(|root| root.theme.as_deref())
            .unwrap_or(graph.defaults().theme.as_str());
        let document = RootDocument {
            version: ARTIFACT_VERSION,
            root_route: "/",
            root_id: graph.root_target(),
            theme,
            routes: graph.routes(),
            diagnostics: graph.diagnostics(),
        };
        to_json(ROOT_ARTIFACT, &document)
    }

    fn collection(
        &self,
        artifact: &str,
        dir: &str,
        meta: &'a CollectionMeta,
    ) -> Result<Vec<u8>, EmitError> {
        let graph = self.graph;
        let own = graph
            .node(dir)
            .filter(|n| n.is_valid())
            .map(|n| &n.payload);
        let inherited = inherit(dir, own, graph.metas(), graph.defaults());

        let mut pages: Vec<&ContentNode> = graph
            .valid_nodes()
            .filter(|n| is_strictly_under(&n.id, dir))
            .filter(|n| !n.parent.as_deref().is_some_and(|p| is_strictly_under(p, dir)))
            .collect();
        pages.sort_by(|a, b| {
            a.order_key(&meta.collection_order)
                .cmp(&b.order_key(&meta.collection_order))
        });

        let slug = meta
            .slug
            .as_deref()
            .unwrap_or_else(|| dir.rsplit('/').next().unwrap_or_default());
        let document = CollectionDocument {
            slug,
            display_name: meta.display_name.as_deref(),
            layout: inherited.layout,
            features: inherited.features,
            roster: graph.refs_of(dir, RefKind::Roster),
            imprints: graph.refs_of(dir, RefKind::Imprint),
            pages: pages.into_iter().map(|n| n.id.as_str()).collect(),
        };
        to_json(artifact, &document)
    }

    fn nav(&self) -> Result<Vec<u8>, EmitError> {
        let graph = self.graph;
        let mut items = Vec::new();
        if let Some(meta) = graph.meta("") {
            let mut visited = HashSet::new();
            for entry in &meta.nav {
                let target = resolve_target(&entry.reference, graph.root_target());
                let Some(mut item) = self.nav_item(&target, entry.label.as_deref()) else {
                    continue;
                };
                if entry.auto_children {
                    visited.insert(target.clone());
                    item.children = self.nav_children(&target, &mut visited);
                }
                items.push(item);
            }
        }
        to_json(NAV_ARTIFACT, &NavDocument { items })
    }

    fn nav_item(&self, id: &str, label: Option<&str>) -> Option<NavItem> {
        let node = self.graph.node(id).filter(|n| n.is_valid())?;
        let href = if id == self.graph.root_target() {
            "/".to_owned()
        } else {
            node.route.clone()?
        };
        let label = label
            .map(str::to_owned)
            .or_else(|| self.graph.meta(id).and_then(|m| m.display_name.clone()))
            .or_else(|| node.payload.title().map(str::to_owned))
            .or_else(|| self.graph.meta(id).and_then(|m| m.slug.clone()))
            .unwrap_or_else(|| node.id.clone());
        Some(NavItem {
            label,
            href,
            children: Vec::new(),
        })
    }

    /// Children from navigable subpage blocks, depth first.
    ///
    /// `visited` is shared across the whole tree, so each node appears at
    /// most once and cyclic subpage chains terminate.
    fn nav_children(&self, id: &str, visited: &mut HashSet<String>) -> Vec<NavItem> {
        let Some(node) = self.graph.node(id) else {
            return Vec::new();
        };
        let mut subpages = Vec::new();
        nav_subpages(node.payload.blocks(), &mut subpages);

        let mut children = Vec::new();
        for (reference, label) in subpages {
            let target = resolve_target(&reference, self.graph.root_target());
            if !visited.insert(target.clone()) {
                continue;
            }
            if let Some(mut item) = self.nav_item(&target, label.as_deref()) {
                item.children = self.nav_children(&target, visited);
                children.push(item);
            }
        }
        children
    }
}

/// Subpage blocks marked `nav: true`, with their labels, in block order.
fn nav_subpages(blocks: &[Value], out: &mut Vec<(String, Option<String>)>) {
    for block in blocks {
        let is_nav = block.get("type").and_then(Value::as_str) == Some("subpage")
            && block.get("nav").and_then(Value::as_bool) == Some(true);
        if is_nav && let Some(reference) = block.get("ref").and_then(Value::as_str) {
            let label = block.get("label").and_then(Value::as_str).map(str::to_owned);
            out.push((artnode_schema::normalize_ref(reference), label));
        }
        if let Some(nested) = block.get("blocks").and_then(Value::as_array) {
            nav_subpages(nested, out);
        }
    }
}

fn manifest(artifacts: &Artifacts) -> Result<Vec<u8>, EmitError> {
    let document = ManifestDocument {
        version: ARTIFACT_VERSION,
        artifacts: artifacts
            .iter()
            .map(|(path, bytes)| (path.as_str(), digest(bytes)))
            .collect(),
    };
    to_json(MANIFEST_ARTIFACT, &document)
}

/// Artifact hashes recorded in a manifest document.
pub(crate) fn parse_manifest(bytes: &[u8]) -> Option<BTreeMap<String, String>> {
    let value: Value = serde_json::from_slice(bytes).ok()?;
    let artifacts = value.get("artifacts")?.as_object()?;
    Some(
        artifacts
            .iter()
            .filter_map(|(path, hash)| Some((path.clone(), hash.as_str()?.to_owned())))
            .collect(),
    )
}

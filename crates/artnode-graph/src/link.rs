//! Graph linking.
//!
//! Runs in two passes over the complete entry set: node shells and
//! containment edges first, then named cross-references resolved by id
//! lookup. Linking is single-threaded; it needs the whole id universe.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use artnode_schema::{CollectionMeta, Diagnostic, NodeKind, normalize_ref};
use artnode_storage::parent_path;
use serde_json::Value;

use crate::graph::{ContentNode, RefKind, RefMap};
use crate::load::Entry;

/// Output of linking, before routes and resolution.
pub(crate) struct Linked {
    /// All node shells sorted by id, invalid ones included.
    pub nodes: Vec<ContentNode>,
    pub metas: BTreeMap<String, CollectionMeta>,
    pub refs: BTreeMap<String, RefMap>,
    /// Raw declared targets by source, dangling ones included.
    pub declared: BTreeMap<String, BTreeSet<String>>,
    /// Diagnostics that belong to no node.
    pub diagnostics: Vec<Diagnostic>,
}

struct Candidate {
    source: String,
    kind: RefKind,
    target: String,
}

/// Resolve a normalized reference, mapping `.` to the root content target.
pub(crate) fn resolve_target(reference: &str, root_target: &str) -> String {
    if reference == "." {
        root_target.to_owned()
    } else {
        reference.to_owned()
    }
}

/// Link validated entries into node shells plus the reference overlay.
pub(crate) fn link(entries: &[Entry], root_target: &str) -> Linked {
    let mut diagnostics = Vec::new();
    let mut nodes = Vec::new();
    let mut metas = BTreeMap::new();
    for entry in entries {
        if let Some(meta) = &entry.meta {
            metas.insert(entry.path.clone(), meta.clone());
        }
        if entry.is_node {
            let mut node =
                ContentNode::shell(&entry.path, entry.kind.clone(), entry.payload.clone());
            node.diagnostics.clone_from(&entry.diagnostics);
            nodes.push(node);
        } else {
            diagnostics.extend(entry.diagnostics.iter().cloned());
        }
    }
    nodes.sort_by(|a, b| a.id.cmp(&b.id));
    let index: HashMap<String, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| (node.id.clone(), i))
        .collect();

    link_containment(&mut nodes, &index, &metas);

    let candidates = collect_candidates(&nodes, &index, &metas, root_target);
    let mut declared: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for candidate in &candidates {
        declared
            .entry(candidate.source.clone())
            .or_default()
            .insert(candidate.target.clone());
    }

    let mut linker = RefLinker {
        nodes: &mut nodes,
        index: &index,
        refs: BTreeMap::new(),
        adjacency: HashMap::new(),
        diagnostics: &mut diagnostics,
    };
    for candidate in candidates {
        linker.accept(candidate);
    }
    let refs = linker.refs;

    check_nav(&mut nodes, &index, &metas, root_target);

    for node in &mut nodes {
        node.diagnostics.sort();
        node.diagnostics.dedup();
    }

    Linked {
        nodes,
        metas,
        refs,
        declared,
        diagnostics,
    }
}

fn nearest_valid_ancestor(
    id: &str,
    nodes: &[ContentNode],
    index: &HashMap<String, usize>,
) -> Option<String> {
    let mut current = parent_path(id);
    while let Some(dir) = current {
        if index.get(dir).is_some_and(|&i| nodes[i].is_valid()) {
            return Some(dir.to_owned());
        }
        current = parent_path(dir);
    }
    None
}

fn link_containment(
    nodes: &mut [ContentNode],
    index: &HashMap<String, usize>,
    metas: &BTreeMap<String, CollectionMeta>,
) {
    let parents: Vec<Option<String>> = nodes
        .iter()
        .map(|node| {
            if node.is_valid() {
                nearest_valid_ancestor(&node.id, nodes, index)
            } else {
                None
            }
        })
        .collect();

    let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
    for (i, parent) in parents.iter().enumerate() {
        if let Some(parent) = parent {
            children.entry(index[parent.as_str()]).or_default().push(i);
        }
    }
    for (i, parent) in parents.into_iter().enumerate() {
        nodes[i].parent = parent;
    }
    for (parent, mut kids) in children {
        let listed = metas
            .get(&nodes[parent].id)
            .map_or(&[][..], |meta| meta.collection_order.as_slice());
        kids.sort_by(|&a, &b| nodes[a].order_key(listed).cmp(&nodes[b].order_key(listed)));
        let ids = kids.into_iter().map(|i| nodes[i].id.clone()).collect();
        nodes[parent].children = ids;
    }
}

/// Nearest valid album node containing each valid track.
fn album_owners(nodes: &[ContentNode], index: &HashMap<String, usize>) -> HashMap<String, String> {
    let mut owners = HashMap::new();
    for track in nodes
        .iter()
        .filter(|n| n.is_valid() && n.kind == NodeKind::Track)
    {
        let mut current = parent_path(&track.id);
        while let Some(dir) = current {
            let album = index
                .get(dir)
                .map(|&i| &nodes[i])
                .filter(|n| n.is_valid() && n.kind == NodeKind::Album);
            if let Some(album) = album {
                owners.insert(track.id.clone(), album.id.clone());
                break;
            }
            current = parent_path(dir);
        }
    }
    owners
}

/// Collect `subpage` references from blocks, descending into nested blocks.
pub(crate) fn subpage_refs(blocks: &[Value], out: &mut Vec<String>) {
    for block in blocks {
        if block.get("type").and_then(Value::as_str) == Some("subpage")
            && let Some(reference) = block.get("ref").and_then(Value::as_str)
        {
            out.push(normalize_ref(reference));
        }
        if let Some(nested) = block.get("blocks").and_then(Value::as_array) {
            subpage_refs(nested, out);
        }
    }
}

fn collect_candidates(
    nodes: &[ContentNode],
    index: &HashMap<String, usize>,
    metas: &BTreeMap<String, CollectionMeta>,
    root_target: &str,
) -> Vec<Candidate> {
    let owners = album_owners(nodes, index);
    let mut contained: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (track, album) in &owners {
        contained.entry(album.as_str()).or_default().push(track.as_str());
    }
    for tracks in contained.values_mut() {
        tracks.sort_unstable();
    }

    let sources: BTreeSet<&str> = nodes
        .iter()
        .filter(|n| n.is_valid())
        .map(|n| n.id.as_str())
        .chain(metas.keys().map(String::as_str))
        .collect();

    let mut candidates = Vec::new();
    for source in sources {
        let mut push = |kind: RefKind, reference: &str| {
            candidates.push(Candidate {
                source: source.to_owned(),
                kind,
                target: resolve_target(reference, root_target),
            });
        };

        let node = index
            .get(source)
            .map(|&i| &nodes[i])
            .filter(|n| n.is_valid());
        if let Some(node) = node {
            let mut subpages = Vec::new();
            subpage_refs(node.payload.blocks(), &mut subpages);
            for reference in &subpages {
                push(RefKind::Subpage, reference.as_str());
            }

            match node.kind {
                NodeKind::Album => {
                    for reference in node.payload.str_list("tracks") {
                        push(RefKind::Tracks, &normalize_ref(&reference));
                    }
                    for track in contained.get(source).into_iter().flatten() {
                        push(RefKind::Tracks, *track);
                    }
                }
                NodeKind::Track => {
                    let explicit = node.payload.str_field("album").map(normalize_ref);
                    match explicit {
                        Some(album) => push(RefKind::Album, &album),
                        None => {
                            if let Some(album) = owners.get(source) {
                                push(RefKind::Album, album.as_str());
                            }
                        }
                    }
                }
                NodeKind::Set => {
                    for reference in node.payload.str_list("tracklist") {
                        push(RefKind::Tracklist, &normalize_ref(&reference));
                    }
                }
                _ => {}
            }
        }

        if let Some(meta) = metas.get(source) {
            for reference in &meta.roster {
                push(RefKind::Roster, reference.as_str());
            }
            for reference in &meta.imprints {
                push(RefKind::Imprint, reference.as_str());
            }
        }
    }
    candidates
}

struct RefLinker<'a> {
    nodes: &'a mut [ContentNode],
    index: &'a HashMap<String, usize>,
    refs: BTreeMap<String, RefMap>,
    adjacency: HashMap<RefKind, HashMap<String, Vec<String>>>,
    diagnostics: &'a mut Vec<Diagnostic>,
}

impl RefLinker<'_> {
    fn accept(&mut self, candidate: Candidate) {
        let Candidate {
            source,
            kind,
            target,
        } = candidate;

        match self.index.get(&target) {
            None => {
                let message = format!("{} reference '{target}' does not exist", kind.as_str());
                self.report(&source, "reference.missing", message);
                return;
            }
            Some(&i) if !self.nodes[i].is_valid() => {
                let message = format!("{} reference '{target}' is invalid", kind.as_str());
                self.report(&source, "reference.invalid", message);
                return;
            }
            Some(_) => {}
        }

        let known = self
            .refs
            .get(&source)
            .and_then(|refs| refs.get(&kind))
            .is_some_and(|targets| targets.contains(&target));
        if known {
            return;
        }

        let graph = self.adjacency.entry(kind).or_default();
        if target == source || reaches(graph, &target, &source) {
            let message = format!(
                "{} reference '{target}' would close a cycle; dropped",
                kind.as_str()
            );
            self.report(&source, "reference.cycle", message);
            return;
        }

        graph.entry(source.clone()).or_default().push(target.clone());
        self.refs
            .entry(source)
            .or_default()
            .entry(kind)
            .or_default()
            .push(target);
    }

    fn report(&mut self, source: &str, rule: &str, message: String) {
        tracing::debug!(source, rule, %message, "Reference dropped");
        let diagnostic = Diagnostic::reference(source, rule, message);
        match self.index.get(source) {
            Some(&i) => self.nodes[i].diagnostics.push(diagnostic),
            None => self.diagnostics.push(diagnostic),
        }
    }
}

/// Whether `to` is reachable from `from` over accepted edges.
fn reaches(graph: &HashMap<String, Vec<String>>, from: &str, to: &str) -> bool {
    let mut stack = vec![from];
    let mut seen = HashSet::new();
    while let Some(current) = stack.pop() {
        if current == to {
            return true;
        }
        if !seen.insert(current) {
            continue;
        }
        if let Some(next) = graph.get(current) {
            stack.extend(next.iter().map(String::as_str));
        }
    }
    false
}

/// Report root-meta nav entries whose targets cannot be served.
fn check_nav(
    nodes: &mut [ContentNode],
    index: &HashMap<String, usize>,
    metas: &BTreeMap<String, CollectionMeta>,
    root_target: &str,
) {
    let Some(meta) = metas.get("") else {
        return;
    };
    let Some(&root) = index.get("") else {
        return;
    };
    for entry in &meta.nav {
        let target = resolve_target(&entry.reference, root_target);
        let rule = match index.get(&target) {
            None => "reference.missing",
            Some(&i) if !nodes[i].is_valid() => "reference.invalid",
            Some(_) => continue,
        };
        nodes[root].diagnostics.push(Diagnostic::reference(
            "",
            rule,
            format!("nav target '{target}' cannot be linked"),
        ));
    }
}

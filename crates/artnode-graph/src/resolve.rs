//! Per-node resolution of presentation, media and store metadata.
//!
//! Runs after linking and routing. Each valid node is resolved on its own,
//! so the pass is parallel over nodes.

use std::collections::{BTreeMap, HashMap};

use artnode_schema::CollectionMeta;
use rayon::prelude::*;

use crate::graph::ContentNode;
use crate::inherit::{Defaults, inherit};
use crate::media::MediaResolver;
use crate::store::resolve_store;

/// Shared inputs of the resolution pass.
pub(crate) struct Resolver<'a> {
    pub metas: &'a BTreeMap<String, CollectionMeta>,
    pub defaults: &'a Defaults,
    pub media: MediaResolver<'a>,
    /// Media files discovered per directory.
    pub files: HashMap<&'a str, &'a [String]>,
}

impl Resolver<'_> {
    /// Resolve every valid node in place.
    pub fn resolve_all(&self, nodes: &mut [ContentNode]) {
        nodes
            .par_iter_mut()
            .filter(|node| node.is_valid())
            .for_each(|node| self.resolve(node));
    }

    fn resolve(&self, node: &mut ContentNode) {
        let inherited = inherit(&node.id, Some(&node.payload), self.metas, self.defaults);

        let files = self.files.get(node.id.as_str()).copied().unwrap_or_default();
        let media = self.media.resolve(&node.id, &node.payload, files);
        node.media = media.assets;
        node.background = media.background;
        node.diagnostics.extend(media.diagnostics);

        let (store, diagnostics) =
            resolve_store(&node.id, node.payload.get("store"), &inherited.features);
        node.store = store;
        node.diagnostics.extend(diagnostics);

        node.layout = Some(inherited.layout);
        node.theme = Some(inherited.theme);
        node.features = inherited.features;
        node.effects = inherited.effects;
    }
}

#[cfg(test)]
mod tests {
    use artnode_schema::{NodeKind, Payload, parse_document};
    use artnode_storage::MockStorage;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::media::{MediaSettings, TokenCache, unix_now};

    fn node(id: &str, yaml: &str) -> ContentNode {
        let payload = Payload::new(parse_document(yaml).unwrap());
        ContentNode::shell(id, NodeKind::Generic, Some(payload))
    }

    #[test]
    fn test_resolves_presentation_media_and_store() {
        let storage = MockStorage::new().with_file("store/shirt/front.jpg", "");
        let settings = MediaSettings::default();
        let tokens = TokenCache::new();
        let mut metas = BTreeMap::new();
        let root_meta = Payload::new(parse_document("theme: dark\nfeatures: [store]").unwrap());
        metas.insert(String::new(), CollectionMeta::from_payload("", &root_meta).0);
        let files = vec!["front.jpg".to_owned()];
        let defaults = Defaults::default();

        let resolver = Resolver {
            metas: &metas,
            defaults: &defaults,
            media: MediaResolver {
                settings: &settings,
                signer: None,
                tokens: &tokens,
                storage: &storage,
                now: unix_now(),
            },
            files: HashMap::from([("store/shirt", files.as_slice())]),
        };

        let mut nodes = vec![
            node(
                "store/shirt",
                "title: Shirt\nstore:\n  type: physical\n  price: {amount: '9.5', currency: EUR}",
            ),
            node("store/mug", "title: Mug\nstore:\n  price: {amount: '9.999', currency: EUR}"),
            ContentNode::shell("store/broken", NodeKind::StoreItem, None),
        ];
        resolver.resolve_all(&mut nodes);

        let shirt = &nodes[0];
        assert_eq!(shirt.layout.as_deref(), Some("default"));
        assert_eq!(shirt.theme.as_deref(), Some("dark"));
        assert_eq!(shirt.media.len(), 1);
        assert!(shirt.store.as_ref().unwrap().enabled);
        assert!(shirt.diagnostics.is_empty());

        let mug = &nodes[1];
        assert!(mug.is_valid());
        assert!(!mug.store.as_ref().unwrap().enabled);
        assert_eq!(mug.diagnostics[0].rule, "store.amount");

        let broken = &nodes[2];
        assert_eq!(broken.layout, None);
        assert_eq!(broken.theme, None);
    }
}

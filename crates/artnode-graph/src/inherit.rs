//! Presentation inheritance.
//!
//! Layout, theme and effects come from the closest level that declares
//! them: the node's index, the meta at its own directory, then ancestor
//! metas, then the configured defaults. Feature flags merge from the root
//! down, closer levels overriding.

use std::collections::BTreeMap;

use artnode_schema::{CollectionMeta, Features, Payload, parse_features};

/// Global fallbacks for presentation attributes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Defaults {
    pub layout: String,
    pub theme: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            layout: "default".to_owned(),
            theme: "default".to_owned(),
        }
    }
}

/// Effective presentation attributes of a node or directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Inherited {
    pub layout: String,
    pub theme: String,
    pub features: Features,
    pub effects: Vec<String>,
}

/// Directories from the content root down to `path` itself.
///
/// `"artists/zol/albums"` gives `["", "artists", "artists/zol", "artists/zol/albums"]`.
pub(crate) fn ancestor_chain(path: &str) -> Vec<String> {
    let mut chain = vec![String::new()];
    let mut current = String::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if !current.is_empty() {
            current.push('/');
        }
        current.push_str(segment);
        chain.push(current.clone());
    }
    chain
}

/// Fold the inheritance chain for the node or directory at `path`.
///
/// `payload` is the node's own index payload, `None` for meta-only
/// directories.
pub(crate) fn inherit(
    path: &str,
    payload: Option<&Payload>,
    metas: &BTreeMap<String, CollectionMeta>,
    defaults: &Defaults,
) -> Inherited {
    let chain = ancestor_chain(path);
    let nearest_first: Vec<&CollectionMeta> =
        chain.iter().rev().filter_map(|dir| metas.get(dir)).collect();

    let own = |name: &str| payload.and_then(|p| p.str_field(name)).map(str::to_owned);

    let layout = own("layout")
        .or_else(|| nearest_first.iter().find_map(|m| m.layout.clone()))
        .unwrap_or_else(|| defaults.layout.clone());
    let theme = own("theme")
        .or_else(|| nearest_first.iter().find_map(|m| m.theme.clone()))
        .unwrap_or_else(|| defaults.theme.clone());
    let effects = payload
        .filter(|p| p.get("effects").is_some())
        .map(|p| p.str_list("effects"))
        .or_else(|| nearest_first.iter().find_map(|m| m.effects.clone()))
        .unwrap_or_default();

    let mut features = Features::new();
    for meta in nearest_first.iter().rev() {
        features.extend(meta.features.iter().map(|(k, v)| (k.clone(), *v)));
    }
    if let Some(Ok(own)) = payload.and_then(|p| p.get("features")).map(parse_features) {
        features.extend(own);
    }

    Inherited {
        layout,
        theme,
        features,
        effects,
    }
}

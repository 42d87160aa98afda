//! Node kinds and kind inference.

use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Kind of a content node.
///
/// The set is open: a declared `type` outside the built-in kinds is kept as
/// [`NodeKind::Custom`]. Schemas are looked up by [`NodeKind::as_str`], so a
/// schema file can describe such kinds by name; kinds nobody describes are
/// validated as `generic`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKind {
    Server,
    Artist,
    Page,
    Album,
    Track,
    Set,
    StoreItem,
    Generic,
    /// Declared kind with no built-in meaning, normalized like built-in names.
    Custom(String),
}

impl NodeKind {
    /// Every built-in kind.
    pub const ALL: [Self; 8] = [
        Self::Server,
        Self::Artist,
        Self::Page,
        Self::Album,
        Self::Track,
        Self::Set,
        Self::StoreItem,
        Self::Generic,
    ];

    /// Schema key of this kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Server => "server",
            Self::Artist => "artist",
            Self::Page => "page",
            Self::Album => "album",
            Self::Track => "track",
            Self::Set => "set",
            Self::StoreItem => "store-item",
            Self::Generic => "generic",
            Self::Custom(name) => name,
        }
    }

    /// Parse a declared `type` value.
    ///
    /// Names are trimmed, lowercased and use `-` between words. A blank name
    /// is `Generic`; a name no built-in kind claims becomes `Custom`.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let name = name.trim().to_ascii_lowercase().replace('_', "-");
        if name.is_empty() {
            return Self::Generic;
        }
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .unwrap_or(Self::Custom(name))
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for NodeKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Infer the kind of the node at `path` from its index document.
///
/// Pure function of path and content. Precedence:
/// 1. explicit `type` field
/// 2. a `tracklist` field (sets)
/// 3. the content root
/// 4. the name of the parent directory
/// 5. `generic`
#[must_use]
pub fn infer_kind(path: &str, document: &Map<String, Value>) -> NodeKind {
    if let Some(declared) = document.get("type").and_then(Value::as_str) {
        return NodeKind::from_name(declared);
    }
    if document.contains_key("tracklist") {
        return NodeKind::Set;
    }
    if path.is_empty() {
        return NodeKind::Server;
    }

    let segments: Vec<&str> = path.split('/').collect();
    let parent = segments.len().checked_sub(2).map(|i| segments[i]);
    match parent {
        Some("tracks") => NodeKind::Track,
        Some("albums") => NodeKind::Album,
        Some("sets") => NodeKind::Set,
        Some("artists") if segments.len() == 2 => NodeKind::Artist,
        Some("pages") => NodeKind::Page,
        Some("store") => NodeKind::StoreItem,
        _ => NodeKind::Generic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(yaml: &str) -> Map<String, Value> {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_from_name_known_and_unknown() {
        assert_eq!(NodeKind::from_name("album"), NodeKind::Album);
        assert_eq!(NodeKind::from_name("Store_Item"), NodeKind::StoreItem);
        assert_eq!(
            NodeKind::from_name(" Holo_Gram "),
            NodeKind::Custom("holo-gram".to_owned())
        );
        assert_eq!(NodeKind::from_name("  "), NodeKind::Generic);
    }

    #[test]
    fn test_explicit_type_wins() {
        let d = doc("type: page\ntracklist: []");
        assert_eq!(infer_kind("artists/zol/tracks/one", &d), NodeKind::Page);
    }

    #[test]
    fn test_tracklist_means_set() {
        assert_eq!(infer_kind("pages/mix", &doc("tracklist: []")), NodeKind::Set);
    }

    #[test]
    fn test_root_is_server() {
        assert_eq!(infer_kind("", &doc("title: Node")), NodeKind::Server);
    }

    #[test]
    fn test_directory_patterns() {
        let d = doc("title: x");
        assert_eq!(infer_kind("artists/zol", &d), NodeKind::Artist);
        assert_eq!(infer_kind("artists/zol/albums/void", &d), NodeKind::Album);
        assert_eq!(
            infer_kind("artists/zol/albums/void/tracks/intro", &d),
            NodeKind::Track
        );
        assert_eq!(infer_kind("artists/zol/sets/boiler", &d), NodeKind::Set);
        assert_eq!(infer_kind("pages/about", &d), NodeKind::Page);
        assert_eq!(infer_kind("store/shirt", &d), NodeKind::StoreItem);
    }

    #[test]
    fn test_artists_only_at_depth_two() {
        let d = doc("title: x");
        assert_eq!(infer_kind("label/artists/zol", &d), NodeKind::Generic);
        assert_eq!(infer_kind("artists", &d), NodeKind::Generic);
    }

    #[test]
    fn test_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_value(NodeKind::StoreItem).unwrap(),
            Value::String("store-item".to_owned())
        );
    }

    #[test]
    fn test_declared_custom_kind_is_kept() {
        let kind = infer_kind("pages/signal", &doc("type: hologram\ntracklist: []"));
        assert_eq!(kind.as_str(), "hologram");
        assert_eq!(serde_json::to_value(&kind).unwrap(), Value::String("hologram".to_owned()));
    }
}

//! Collection meta documents.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::diagnostic::Diagnostic;
use crate::document::{Payload, type_name};

/// Feature flags by name. `false` means explicitly disabled.
pub type Features = BTreeMap<String, bool>;

/// Parse a `features` declaration.
///
/// Accepts a list of names (all enabled) or a `name: bool` mapping.
///
/// # Errors
///
/// Returns a message describing the offending value.
pub fn parse_features(value: &Value) -> Result<Features, String> {
    match value {
        Value::Null => Ok(Features::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(|name| (name.trim().to_owned(), true))
                    .ok_or_else(|| format!("feature names must be strings, found {}", type_name(item)))
            })
            .collect(),
        Value::Object(map) => map
            .iter()
            .map(|(name, enabled)| {
                enabled
                    .as_bool()
                    .map(|enabled| (name.clone(), enabled))
                    .ok_or_else(|| {
                        format!("feature '{name}' must be a boolean, found {}", type_name(enabled))
                    })
            })
            .collect(),
        other => Err(format!(
            "'features' must be a list or a mapping, found {}",
            type_name(other)
        )),
    }
}

/// Normalize a node reference to an id.
///
/// Surrounding whitespace and slashes are dropped, so `/artists/zol/` and
/// `artists/zol` name the same node and `/` names the content root. A lone
/// `.` is kept as-is; its meaning depends on where it is used.
#[must_use]
pub fn normalize_ref(reference: &str) -> String {
    let trimmed = reference.trim();
    if trimmed == "." || trimmed == "./" {
        return ".".to_owned();
    }
    trimmed
        .split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// An entry of the content-root meta's `nav` list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NavEntry {
    pub label: Option<String>,
    /// Normalized target reference.
    pub reference: String,
    /// Expand children from the target's navigable subpage blocks.
    pub auto_children: bool,
}

/// Metadata attached to a directory through its meta document.
///
/// Not a node itself; it augments the node at the same path and feeds
/// inheritance for everything below it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CollectionMeta {
    pub display_name: Option<String>,
    pub slug: Option<String>,
    pub layout: Option<String>,
    pub theme: Option<String>,
    pub effects: Option<Vec<String>>,
    pub features: Features,
    /// Ordered member references.
    pub roster: Vec<String>,
    pub imprints: Vec<String>,
    /// Only honoured at the content root.
    pub root_content: Option<String>,
    pub nav: Vec<NavEntry>,
    /// Child slugs listed first, in this order, among the directory's children.
    pub collection_order: Vec<String>,
}

impl CollectionMeta {
    /// Build from a meta document that already passed the `_meta` schema.
    ///
    /// Returns the meta along with any diagnostics. Structural diagnostics
    /// mean the meta must be discarded; reference diagnostics only drop the
    /// offending entry.
    #[must_use]
    pub fn from_payload(path: &str, payload: &Payload) -> (Self, Vec<Diagnostic>) {
        let mut diagnostics = Vec::new();
        let text = |name: &str| {
            payload
                .str_field(name)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };

        let features = match payload.get("features").map(parse_features) {
            Some(Ok(features)) => features,
            Some(Err(message)) => {
                diagnostics.push(Diagnostic::structural(path, "field.type", message));
                Features::new()
            }
            None => Features::new(),
        };

        let root_content = payload.str_field("root_content").map(normalize_ref);
        let root_content = match root_content {
            Some(target) if !path.is_empty() => {
                diagnostics.push(Diagnostic::reference(
                    path,
                    "meta.root_content",
                    format!("root_content '{target}' is only honoured in the content-root meta"),
                ));
                None
            }
            other => other,
        };

        let refs = |name: &str| {
            payload
                .str_list(name)
                .iter()
                .map(|r| normalize_ref(r))
                .collect::<Vec<_>>()
        };

        let meta = Self {
            display_name: text("display_name"),
            slug: text("slug"),
            layout: text("layout"),
            theme: text("theme"),
            effects: payload.get("effects").map(|_| payload.str_list("effects")),
            features,
            roster: refs("roster"),
            imprints: refs("imprints"),
            root_content,
            nav: parse_nav(path, payload, &mut diagnostics),
            collection_order: payload
                .str_list("collection_order")
                .iter()
                .map(|slug| slug.trim().trim_matches('/'))
                .filter(|slug| !slug.is_empty())
                .map(str::to_owned)
                .collect(),
        };
        (meta, diagnostics)
    }
}

fn parse_nav(path: &str, payload: &Payload, diagnostics: &mut Vec<Diagnostic>) -> Vec<NavEntry> {
    let Some(items) = payload.get("nav").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let reference = item.get("ref").and_then(Value::as_str).map(normalize_ref);
        let Some(reference) = reference else {
            diagnostics.push(Diagnostic::reference(
                path,
                "reference.missing",
                format!("nav[{i}] has no 'ref'"),
            ));
            continue;
        };
        entries.push(NavEntry {
            label: item.get("label").and_then(Value::as_str).map(str::to_owned),
            reference,
            auto_children: item.get("auto_children").and_then(Value::as_str)
                == Some("from_subpages"),
        });
    }
    entries
}

//! Schema definitions and the schema registry.
//!
//! The registry maps a kind name to its [`Schema`]. It is built once from the
//! built-in definitions, optionally overlaid by a YAML schema file, and never
//! mutated afterwards.
//!
//! # Schema file format
//!
//! ```yaml
//! schemas:
//!   album:
//!     year: { type: integer, required: true }
//!     format: { type: enum, values: [lp, ep, single] }
//!     credits: { type: list, items: string }
//!   hologram:
//!     title: { type: string, required: true }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::diagnostic::Diagnostic;
use crate::document::Payload;
use crate::kind::NodeKind;
use crate::validate::check_document;

/// Schema key of collection meta documents.
pub const META_SCHEMA: &str = "_meta";

/// Type of a schema field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldType {
    /// Anything; presence is all that is checked.
    Any,
    String,
    Integer,
    Number,
    Boolean,
    /// One of a fixed set of strings.
    Enum(Vec<String>),
    /// Id of another node.
    Reference,
    List(Box<FieldType>),
    Mapping,
    /// Array of content blocks, each with a string `type`.
    Blocks,
}

impl FieldType {
    /// Human-readable name for diagnostics.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Any => "any".to_owned(),
            Self::String => "string".to_owned(),
            Self::Integer => "integer".to_owned(),
            Self::Number => "number".to_owned(),
            Self::Boolean => "boolean".to_owned(),
            Self::Enum(values) => format!("one of [{}]", values.join(", ")),
            Self::Reference => "reference".to_owned(),
            Self::List(item) => format!("list of {}", item.describe()),
            Self::Mapping => "mapping".to_owned(),
            Self::Blocks => "blocks".to_owned(),
        }
    }

    fn list(item: Self) -> Self {
        Self::List(Box::new(item))
    }

    fn one_of(values: &[&str]) -> Self {
        Self::Enum(values.iter().map(|v| (*v).to_owned()).collect())
    }
}

/// A single field of a schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub ty: FieldType,
    pub required: bool,
}

/// Field definitions for one node kind.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Schema {
    fields: BTreeMap<String, FieldSpec>,
}

impl Schema {
    fn optional(mut self, name: &str, ty: FieldType) -> Self {
        self.fields.insert(
            name.to_owned(),
            FieldSpec {
                ty,
                required: false,
            },
        );
        self
    }

    fn required(mut self, name: &str, ty: FieldType) -> Self {
        self.fields
            .insert(name.to_owned(), FieldSpec { ty, required: true });
        self
    }

    /// Look up a field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    /// Fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    /// Overlay `other` on top of this schema; its fields replace same-named ones.
    fn overlay(&mut self, other: Self) {
        self.fields.extend(other.fields);
    }
}

/// Error loading a schema file.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Failed to read schema file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid schema file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Unknown field type '{ty}' for {kind}.{field}")]
    UnknownType {
        kind: String,
        field: String,
        ty: String,
    },
    #[error("Enum field {kind}.{field} declares no values")]
    EmptyEnum { kind: String, field: String },
}

#[derive(Deserialize)]
struct SchemaFileRaw {
    #[serde(default)]
    schemas: BTreeMap<String, BTreeMap<String, FieldSpecRaw>>,
}

#[derive(Deserialize)]
struct FieldSpecRaw {
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    values: Vec<String>,
    items: Option<String>,
}

fn parse_type(
    kind: &str,
    field: &str,
    name: &str,
    values: &[String],
    items: Option<&str>,
) -> Result<FieldType, SchemaError> {
    let ty = match name {
        "any" => FieldType::Any,
        "string" => FieldType::String,
        "integer" => FieldType::Integer,
        "number" => FieldType::Number,
        "boolean" => FieldType::Boolean,
        "reference" => FieldType::Reference,
        "mapping" => FieldType::Mapping,
        "blocks" => FieldType::Blocks,
        "enum" => {
            if values.is_empty() {
                return Err(SchemaError::EmptyEnum {
                    kind: kind.to_owned(),
                    field: field.to_owned(),
                });
            }
            FieldType::Enum(values.to_vec())
        }
        "list" => {
            let item = match items {
                Some(item) => parse_type(kind, field, item, values, None)?,
                None => FieldType::Any,
            };
            FieldType::list(item)
        }
        other => {
            return Err(SchemaError::UnknownType {
                kind: kind.to_owned(),
                field: field.to_owned(),
                ty: other.to_owned(),
            });
        }
    };
    Ok(ty)
}

/// Fields every node kind understands.
fn common() -> Schema {
    Schema::default()
        .optional("type", FieldType::String)
        .optional("title", FieldType::String)
        .optional("tagline", FieldType::String)
        .optional("background", FieldType::String)
        .optional("preview", FieldType::Mapping)
        .optional("effects", FieldType::list(FieldType::String))
        .optional("content", FieldType::Blocks)
        .optional("media", FieldType::list(FieldType::Any))
        .optional("order", FieldType::Integer)
        .optional("layout", FieldType::String)
        .optional("theme", FieldType::String)
        .optional("features", FieldType::Any)
        .optional("store", FieldType::Mapping)
}

fn builtin_schema(kind: &NodeKind) -> Schema {
    let base = common();
    let titled = |s: Schema| s.required("title", FieldType::String);
    match kind {
        NodeKind::Server => base,
        NodeKind::Artist => titled(base)
            .optional("genres", FieldType::list(FieldType::String))
            .optional("location", FieldType::String)
            .optional("links", FieldType::Mapping),
        NodeKind::Album => titled(base)
            .optional("year", FieldType::Integer)
            .optional(
                "format",
                FieldType::one_of(&["lp", "ep", "single", "compilation"]),
            )
            .optional("release_date", FieldType::String)
            .optional("tracks", FieldType::list(FieldType::Reference)),
        NodeKind::Track => titled(base)
            .optional("album", FieldType::Reference)
            .optional("number", FieldType::Integer)
            .optional("audio", FieldType::String),
        NodeKind::Set => titled(base)
            .optional("tracklist", FieldType::list(FieldType::Reference))
            .optional("venue", FieldType::String)
            .optional("date", FieldType::String),
        NodeKind::StoreItem => titled(base).required("store", FieldType::Mapping),
        NodeKind::Page | NodeKind::Generic | NodeKind::Custom(_) => titled(base),
    }
}

fn builtin_meta_schema() -> Schema {
    Schema::default()
        .optional("display_name", FieldType::String)
        .optional("slug", FieldType::String)
        .optional("layout", FieldType::String)
        .optional("theme", FieldType::String)
        .optional("effects", FieldType::list(FieldType::String))
        .optional("features", FieldType::Any)
        .optional("roster", FieldType::list(FieldType::Reference))
        .optional("imprints", FieldType::list(FieldType::Reference))
        .optional("root_content", FieldType::Reference)
        .optional("nav", FieldType::list(FieldType::Mapping))
        .optional("collection_order", FieldType::list(FieldType::String))
}

/// Immutable mapping from kind name to schema.
#[derive(Clone, Debug)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Schema>,
    generic: Schema,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SchemaRegistry {
    /// Registry with the built-in schemas only.
    #[must_use]
    pub fn builtin() -> Self {
        let mut schemas: HashMap<String, Schema> = NodeKind::ALL
            .into_iter()
            .filter(|kind| *kind != NodeKind::Generic)
            .map(|kind| (kind.as_str().to_owned(), builtin_schema(&kind)))
            .collect();
        schemas.insert(META_SCHEMA.to_owned(), builtin_meta_schema());
        Self {
            schemas,
            generic: builtin_schema(&NodeKind::Generic),
        }
    }

    /// Built-in schemas overlaid with a YAML schema document.
    ///
    /// Fields declared in the document replace same-named built-in fields;
    /// kinds the built-ins don't know are added and selected by nodes that
    /// declare them. Kind names are normalized like declared `type` values.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if the document is malformed or names an
    /// unknown field type.
    pub fn from_yaml(content: &str) -> Result<Self, SchemaError> {
        let mut registry = Self::builtin();
        if content.trim().is_empty() {
            return Ok(registry);
        }

        let raw: SchemaFileRaw = serde_yaml::from_str(content)?;
        for (name, fields) in raw.schemas {
            let kind = NodeKind::from_name(&name);
            let mut overlay = Schema::default();
            for (field, spec) in fields {
                let ty = parse_type(&name, &field, &spec.ty, &spec.values, spec.items.as_deref())?;
                overlay.fields.insert(
                    field,
                    FieldSpec {
                        ty,
                        required: spec.required,
                    },
                );
            }
            if kind == NodeKind::Generic {
                registry.generic.overlay(overlay);
            } else {
                registry
                    .schemas
                    .entry(kind.as_str().to_owned())
                    .or_insert_with(common)
                    .overlay(overlay);
            }
        }

        tracing::debug!(kinds = registry.schemas.len() + 1, "Loaded schema overlay");
        Ok(registry)
    }

    /// Load the registry, overlaying `path` when given.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if the file can't be read or is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, SchemaError> {
        let Some(path) = path else {
            return Ok(Self::builtin());
        };
        let content = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    /// Schema for a kind name, falling back to `generic`.
    #[must_use]
    pub fn schema(&self, kind: &str) -> &Schema {
        self.schemas.get(kind).unwrap_or(&self.generic)
    }

    /// Validate an index document against the schema of `kind`.
    ///
    /// Every violation is collected; the document is only accepted when
    /// there are none.
    ///
    /// # Errors
    ///
    /// Returns all structural diagnostics found.
    pub fn validate(
        &self,
        path: &str,
        kind: &NodeKind,
        document: Map<String, Value>,
    ) -> Result<Payload, Vec<Diagnostic>> {
        let diagnostics = check_document(path, self.schema(kind.as_str()), &document);
        if diagnostics.is_empty() {
            Ok(Payload::new(document))
        } else {
            Err(diagnostics)
        }
    }

    /// Validate a collection meta document.
    ///
    /// # Errors
    ///
    /// Returns all structural diagnostics found.
    pub fn validate_meta(
        &self,
        path: &str,
        document: Map<String, Value>,
    ) -> Result<Payload, Vec<Diagnostic>> {
        let diagnostics = check_document(path, self.schema(META_SCHEMA), &document);
        if diagnostics.is_empty() {
            Ok(Payload::new(document))
        } else {
            Err(diagnostics)
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::document::parse_document;

    fn doc(yaml: &str) -> Map<String, Value> {
        parse_document(yaml).unwrap()
    }

    fn rules(diags: &[Diagnostic]) -> Vec<&str> {
        diags.iter().map(|d| d.rule.as_str()).collect()
    }

    #[test]
    fn test_builtin_has_every_kind() {
        let registry = SchemaRegistry::builtin();
        for kind in NodeKind::ALL {
            assert!(
                registry.schema(kind.as_str()).field("content").is_some(),
                "{kind}"
            );
        }
        assert!(registry.schemas.contains_key(META_SCHEMA));
    }

    #[test]
    fn test_title_required_except_server() {
        let registry = SchemaRegistry::builtin();
        assert!(registry.validate("", &NodeKind::Server, doc("")).is_ok());

        let err = registry
            .validate("pages/about", &NodeKind::Page, doc(""))
            .unwrap_err();
        assert_eq!(rules(&err), vec!["field.required"]);
        assert!(err[0].message.contains("title"));
    }

    #[test]
    fn test_collects_all_violations() {
        let registry = SchemaRegistry::builtin();
        let err = registry
            .validate(
                "artists/zol/albums/void",
                &NodeKind::Album,
                doc("year: soon\nformat: cassette\ntracks: [ok, 3]"),
            )
            .unwrap_err();
        assert_eq!(err.len(), 4);
        assert!(err.iter().all(Diagnostic::is_structural));
    }

    #[test]
    fn test_unknown_fields_pass_through() {
        let registry = SchemaRegistry::builtin();
        let payload = registry
            .validate(
                "pages/about",
                &NodeKind::Page,
                doc("title: About\nmood: brooding"),
            )
            .unwrap();
        assert_eq!(payload.str_field("mood"), Some("brooding"));
    }

    #[test]
    fn test_unknown_kind_name_falls_back_to_generic() {
        let registry = SchemaRegistry::builtin();
        assert_eq!(
            registry.schema("hologram"),
            registry.schema(NodeKind::Generic.as_str())
        );
    }

    #[test]
    fn test_declared_kind_selects_overlay_schema() {
        let registry = SchemaRegistry::from_yaml(
            "schemas:\n  hologram:\n    frequency: { type: integer, required: true }\n",
        )
        .unwrap();
        let document = doc("type: hologram\ntitle: H");
        let kind = crate::kind::infer_kind("pages/signal", &document);
        assert_eq!(kind.as_str(), "hologram");

        let err = registry.validate("pages/signal", &kind, document).unwrap_err();
        assert_eq!(rules(&err), vec!["field.required"]);
        assert!(err[0].message.contains("frequency"));

        let ok = registry.validate(
            "pages/signal",
            &kind,
            doc("type: hologram\ntitle: H\nfrequency: 7"),
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_undescribed_custom_kind_validates_as_generic() {
        let registry = SchemaRegistry::builtin();
        let kind = NodeKind::from_name("hologram");
        assert!(registry.validate("pages/signal", &kind, doc("title: H")).is_ok());
        let err = registry.validate("pages/signal", &kind, doc("")).unwrap_err();
        assert_eq!(rules(&err), vec!["field.required"]);
    }

    #[test]
    fn test_meta_schema() {
        let registry = SchemaRegistry::builtin();
        assert!(
            registry
                .validate_meta("", doc("root_content: artists/zol\nroster: [artists/zol]"))
                .is_ok()
        );
        let err = registry
            .validate_meta("", doc("roster: artists/zol"))
            .unwrap_err();
        assert_eq!(rules(&err), vec!["field.type"]);
    }

    #[test]
    fn test_overlay_replaces_and_adds() {
        let registry = SchemaRegistry::from_yaml(
            r"
schemas:
  album:
    year: { type: integer, required: true }
  hologram:
    frequency: { type: number }
",
        )
        .unwrap();

        let album = registry.schema("album");
        assert!(album.field("year").unwrap().required);
        assert!(album.field("tracks").is_some());

        let hologram = registry.schema("hologram");
        assert_eq!(hologram.field("frequency").unwrap().ty, FieldType::Number);
        assert!(hologram.field("content").is_some());
    }

    #[test]
    fn test_overlay_list_items_and_enum() {
        let registry = SchemaRegistry::from_yaml(
            r"
schemas:
  artist:
    credits: { type: list, items: string }
    status: { type: enum, values: [active, hiatus] }
",
        )
        .unwrap();
        let artist = registry.schema("artist");
        assert_eq!(
            artist.field("credits").unwrap().ty,
            FieldType::List(Box::new(FieldType::String))
        );
        assert_eq!(
            artist.field("status").unwrap().ty.describe(),
            "one of [active, hiatus]"
        );
    }

    #[test]
    fn test_overlay_unknown_type_is_error() {
        let err = SchemaRegistry::from_yaml("schemas:\n  page:\n    x: { type: date }\n")
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownType { .. }));
        assert!(err.to_string().contains("page.x"));
    }

    #[test]
    fn test_overlay_enum_without_values_is_error() {
        let err = SchemaRegistry::from_yaml("schemas:\n  page:\n    x: { type: enum }\n")
            .unwrap_err();
        assert!(matches!(err, SchemaError::EmptyEnum { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let err = SchemaRegistry::load(Some(Path::new("/nonexistent/schema.yaml"))).unwrap_err();
        assert!(matches!(err, SchemaError::Io { .. }));
    }

    #[test]
    fn test_load_without_file_is_builtin() {
        let registry = SchemaRegistry::load(None).unwrap();
        assert!(registry.schema("track").field("album").is_some());
    }
}

//! Node kinds, schemas and document validation for artnode.
//!
//! This crate knows what a valid content node looks like, and nothing about
//! where documents come from:
//!
//! - [`infer_kind`] decides a node's [`NodeKind`] from its path and content
//! - [`SchemaRegistry`] maps kind names to schemas and validates documents,
//!   collecting every violation as a [`Diagnostic`]
//! - [`CollectionMeta`] is the typed view of a directory's meta document
//!
//! # Example
//!
//! ```
//! use artnode_schema::{NodeKind, SchemaRegistry, infer_kind, parse_document};
//!
//! let registry = SchemaRegistry::builtin();
//! let document = parse_document("title: Void\nyear: 2023").unwrap();
//! let kind = infer_kind("artists/zol/albums/void", &document);
//! assert_eq!(kind, NodeKind::Album);
//!
//! let payload = registry.validate("artists/zol/albums/void", &kind, document).unwrap();
//! assert_eq!(payload.title(), Some("Void"));
//! ```

mod diagnostic;
mod document;
mod kind;
mod meta;
mod schema;
mod validate;

pub use diagnostic::{Diagnostic, ErrorClass};
pub use document::{Payload, parse_document, type_name};
pub use kind::{NodeKind, infer_kind};
pub use meta::{CollectionMeta, Features, NavEntry, normalize_ref, parse_features};
pub use schema::{FieldSpec, FieldType, META_SCHEMA, Schema, SchemaError, SchemaRegistry};

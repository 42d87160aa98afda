//! Content graph compiler for artnode.
//!
//! This crate provides:
//! - [`Site`]: full and incremental builds with an atomically published
//!   [`Snapshot`]
//! - [`ContentGraph`]: the resolved node arena with routes, references and
//!   inherited presentation attributes
//! - Media access resolution ([`Signer`], [`Sha256Signer`]) and store
//!   normalization ([`StoreDescriptor`])
//!
//! # Quick Start
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use artnode_graph::{Site, SiteConfig};
//! use artnode_storage_fs::FsStorage;
//!
//! let storage = Arc::new(FsStorage::new(PathBuf::from("content")));
//! let config = SiteConfig {
//!     output_dir: Some(PathBuf::from("dist")),
//!     ..SiteConfig::default()
//! };
//! let site = Site::new(storage, config)?;
//!
//! let report = site.rebuild()?;
//! println!("{} nodes, {} diagnostics", report.nodes, report.diagnostics);
//!
//! // `/` serves the root_content target.
//! let home = site.get_node_by_route("/");
//! # Ok(())
//! # }
//! ```

mod artifact;
mod cancel;
mod emit;
mod error;
mod graph;
mod inherit;
mod link;
mod load;
mod media;
mod pipeline;
mod reindex;
mod resolve;
mod routes;
mod scan;
mod site;
mod store;
mod timeout;

pub use artifact::{
    ARTIFACT_VERSION, Artifacts, MANIFEST_ARTIFACT, NAV_ARTIFACT, ROOT_ARTIFACT,
    collection_artifact_path, node_artifact_path,
};
pub use cancel::CancelToken;
pub use emit::EmitStats;
pub use error::{BuildError, EmitError};
pub use graph::{ContentGraph, ContentNode, NodeStatus, RefKind, RefMap};
pub use inherit::Defaults;
pub use load::Entry;
pub use media::{
    Access, AccessDescriptor, MediaRef, MediaSettings, SignError, SignedToken, Signer,
    Sha256Signer, TokenCache,
};
pub use reindex::Phase;
pub use routes::normalize_route;
pub use scan::{DocumentNames, MARKDOWN_NAME, RawEntry, ScanOutput, Scanner};
pub use site::{BuildReport, Site, SiteConfig, Snapshot};
pub use store::{CommerceType, Price, StoreDescriptor, StoreScope};

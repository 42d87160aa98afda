//! Build control surface.
//!
//! [`Site`] owns the published [`Snapshot`] and runs full and incremental
//! builds against a [`Storage`] backend.
//!
//! # Thread Safety
//!
//! `Site` is designed for concurrent access:
//! - readers clone the current `Arc<Snapshot>` under a short read lock and
//!   never observe a partially built graph
//! - builds are serialized by `build_lock`; a full build requested while
//!   another build runs fails with [`BuildError::Busy`]
//! - change batches arriving during a build are queued and applied by the
//!   thread that holds the lock once it finishes
//!
//! # Example
//!
//! ```ignore
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use artnode_graph::{Site, SiteConfig};
//! use artnode_storage_fs::FsStorage;
//!
//! let storage = Arc::new(FsStorage::new(PathBuf::from("content")));
//! let site = Site::new(storage, SiteConfig::default())?;
//! let report = site.rebuild()?;
//! let home = site.get_node_by_route("/");
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock, TryLockError};
use std::time::{Duration, Instant};

use artnode_schema::{Diagnostic, SchemaRegistry};
use artnode_storage::Storage;

use crate::artifact::{Artifacts, Renderer, node_artifact_path};
use crate::cancel::CancelToken;
use crate::emit::{EmitStats, diff, emit_dir};
use crate::error::BuildError;
use crate::graph::{ContentGraph, ContentNode, is_within};
use crate::inherit::Defaults;
use crate::load::{Entry, Loader};
use crate::media::{Access, MediaResolver, MediaSettings, Signer, TokenCache, unix_now};
use crate::pipeline::{Compiled, Compiler};
use crate::reindex::{
    Phase, PhaseCell, PhaseGuard, closure, render_inputs_unchanged, rescan_roots,
};
use crate::scan::{DocumentNames, ScanOutput, Scanner};

/// Configuration for [`Site`].
#[derive(Clone, Debug)]
pub struct SiteConfig {
    pub names: DocumentNames,
    pub defaults: Defaults,
    pub media: MediaSettings,
    /// Deadline for reading a single document.
    pub read_timeout: Duration,
    /// Build worker threads; `0` uses one per CPU.
    pub workers: usize,
    /// Directory artifacts are written to.
    ///
    /// If `None`, artifacts are kept in memory only.
    pub output_dir: Option<PathBuf>,
    pub registry: SchemaRegistry,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            names: DocumentNames::default(),
            defaults: Defaults::default(),
            media: MediaSettings::default(),
            read_timeout: Duration::from_secs(5),
            workers: 0,
            output_dir: None,
            registry: SchemaRegistry::builtin(),
        }
    }
}

/// A published build: the graph, its artifacts, and what the next
/// incremental build needs to start from.
#[derive(Debug, Default)]
pub struct Snapshot {
    graph: ContentGraph,
    artifacts: Artifacts,
    entries: Vec<Entry>,
    scan_diagnostics: Vec<Diagnostic>,
    declared: BTreeMap<String, BTreeSet<String>>,
    generation: u64,
}

impl Snapshot {
    #[must_use]
    pub fn graph(&self) -> &ContentGraph {
        &self.graph
    }

    /// Rendered artifacts by path relative to the output directory.
    #[must_use]
    pub fn artifacts(&self) -> &Artifacts {
        &self.artifacts
    }

    #[must_use]
    pub fn artifact(&self, path: &str) -> Option<&[u8]> {
        self.artifacts.get(path).map(Vec::as_slice)
    }

    /// Number of builds published so far; `0` before the first one.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Summary of a finished build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildReport {
    pub generation: u64,
    pub nodes: usize,
    pub valid: usize,
    pub diagnostics: usize,
    pub written: usize,
    pub unchanged: usize,
    pub removed: usize,
    pub elapsed: Duration,
    /// Size of the affected closure; `None` for full builds.
    pub closure: Option<usize>,
}

/// Compiles a content tree and serves the latest published graph.
pub struct Site {
    storage: Arc<dyn Storage>,
    config: SiteConfig,
    signer: Option<Arc<dyn Signer>>,
    tokens: TokenCache,
    pool: rayon::ThreadPool,
    /// Serializes builds.
    build_lock: Mutex<()>,
    /// Current snapshot (atomically swappable).
    current: RwLock<Arc<Snapshot>>,
    /// Changed paths not yet built.
    pending: Mutex<BTreeSet<String>>,
    phase: PhaseCell,
    cancel: CancelToken,
}

impl Site {
    /// Create a site. Nothing is built until [`Site::rebuild`] runs.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::WorkerPool`] if the worker pool cannot start.
    pub fn new(storage: Arc<dyn Storage>, config: SiteConfig) -> Result<Self, BuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .thread_name(|i| format!("artnode-build-{i}"))
            .build()?;
        Ok(Self {
            storage,
            config,
            signer: None,
            tokens: TokenCache::new(),
            pool,
            build_lock: Mutex::new(()),
            current: RwLock::new(Arc::new(Snapshot::default())),
            pending: Mutex::new(BTreeSet::new()),
            phase: PhaseCell::default(),
            cancel: CancelToken::new(),
        })
    }

    /// Use `signer` for assets with signed access.
    ///
    /// Without a signer, signed assets are omitted with a diagnostic.
    #[must_use]
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Current snapshot.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read().unwrap())
    }

    /// Valid node served at `route`.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn get_node_by_route(&self, route: &str) -> Option<ContentNode> {
        self.snapshot().graph.node_by_route(route).cloned()
    }

    /// Node by id, valid or not.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn get_node(&self, id: &str) -> Option<ContentNode> {
        self.snapshot().graph.node(id).cloned()
    }

    /// Diagnostics of the current snapshot, sorted.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.snapshot().graph.diagnostics().to_vec()
    }

    /// Handle that cancels the in-flight build.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Stage of the in-flight build, [`Phase::Idle`] when none runs.
    #[must_use]
    pub fn reindex_phase(&self) -> Phase {
        self.phase.get()
    }

    /// Rebuild everything from storage and publish the result.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Busy`] if another build is running, or the
    /// build-fatal error that stopped this one. On error the previous
    /// snapshot stays published.
    ///
    /// # Panics
    ///
    /// Panics if internal locks are poisoned.
    pub fn rebuild(&self) -> Result<BuildReport, BuildError> {
        let guard = match self.build_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(BuildError::Busy),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        self.cancel.reset();
        // A full scan covers everything queued so far.
        self.pending.lock().unwrap().clear();
        let report = self.build(None);
        drop(guard);

        let queued = report.is_ok() && !self.pending.lock().unwrap().is_empty();
        if queued && let Err(e) = self.on_change(std::iter::empty::<String>()) {
            tracing::warn!(error = %e, "Failed to apply changes queued during rebuild");
        }
        report
    }

    /// Apply changed file paths (tree paths relative to the content root).
    ///
    /// Returns `Ok(None)` if a build is already running; the paths are then
    /// coalesced into the batch that build picks up when it finishes.
    /// Before the first successful build this runs a full build.
    ///
    /// # Errors
    ///
    /// Returns the build-fatal error of the incremental build. The batch is
    /// kept and retried with the next change.
    ///
    /// # Panics
    ///
    /// Panics if internal locks are poisoned.
    pub fn on_change<I, S>(&self, paths: I) -> Result<Option<BuildReport>, BuildError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending
            .lock()
            .unwrap()
            .extend(paths.into_iter().map(Into::into));

        let mut last = None;
        loop {
            let guard = match self.build_lock.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::WouldBlock) => {
                    tracing::debug!("Build in flight; changes coalesced");
                    return Ok(last);
                }
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            };

            let batch = std::mem::take(&mut *self.pending.lock().unwrap());
            if batch.is_empty() {
                return Ok(last);
            }
            self.cancel.reset();

            let full = self.snapshot().generation == 0;
            let result = if full {
                self.build(None)
            } else {
                self.build(Some(&batch))
            };
            match result {
                Ok(report) => last = Some(report),
                Err(e) => {
                    self.pending.lock().unwrap().extend(batch);
                    return Err(e);
                }
            }
            drop(guard);

            if self.pending.lock().unwrap().is_empty() {
                return Ok(last);
            }
        }
    }

    /// Run one build. The caller holds `build_lock`.
    fn build(&self, changed: Option<&BTreeSet<String>>) -> Result<BuildReport, BuildError> {
        let start = Instant::now();
        let previous = self.snapshot();
        let phase = self.phase.enter(Phase::Scanning);

        let (snapshot, stats, closure_len) = self
            .pool
            .install(|| self.build_snapshot(&previous, changed, &phase))
            .inspect_err(|e| tracing::warn!(error = %e, "Build failed"))?;

        let report = BuildReport {
            generation: snapshot.generation,
            nodes: snapshot.graph.nodes().len(),
            valid: snapshot.graph.valid_nodes().count(),
            diagnostics: snapshot.graph.diagnostics().len(),
            written: stats.written,
            unchanged: stats.unchanged,
            removed: stats.removed,
            elapsed: start.elapsed(),
            closure: closure_len,
        };
        *self.current.write().unwrap() = Arc::new(snapshot);

        tracing::info!(
            generation = report.generation,
            nodes = report.nodes,
            valid = report.valid,
            diagnostics = report.diagnostics,
            written = report.written,
            removed = report.removed,
            closure = ?report.closure,
            elapsed_ms = report.elapsed.as_millis(),
            "Build published"
        );
        Ok(report)
    }

    fn build_snapshot(
        &self,
        previous: &Snapshot,
        changed: Option<&BTreeSet<String>>,
        phase: &PhaseGuard<'_>,
    ) -> Result<(Snapshot, EmitStats, Option<usize>), BuildError> {
        let roots = changed
            .map(rescan_roots)
            .filter(|roots| !roots.iter().any(String::is_empty));

        let (entries, scan_diagnostics) = match &roots {
            Some(roots) => self.rescan(previous, roots),
            None => {
                let scanned = Scanner::new(self.storage.as_ref(), &self.config.names).scan();
                let entries = self.loader().load_all(&scanned.entries);
                (entries, scanned.diagnostics)
            }
        };
        self.cancel.check()?;

        self.tokens.purge(unix_now());
        let compiler = Compiler {
            defaults: &self.config.defaults,
            media: MediaResolver {
                settings: &self.config.media,
                signer: self.signer.as_ref(),
                tokens: &self.tokens,
                storage: self.storage.as_ref(),
                now: unix_now(),
            },
            cancel: &self.cancel,
        };
        let Compiled { graph, declared } = compiler.compile(&entries, &scan_diagnostics, phase)?;

        let affected = roots.as_ref().map(|roots| {
            closure(roots, &previous.entries, &entries, &previous.declared, &declared)
        });

        phase.advance(Phase::Emitting);
        let artifacts = Renderer::new(&graph).render(|node, path| {
            let affected = affected.as_ref()?;
            let signed = node.media.iter().any(|m| m.access == Access::Signed);
            if affected.contains(&node.id)
                || signed
                || !render_inputs_unchanged(&previous.graph, &graph, node)
            {
                return None;
            }
            previous.artifacts.get(path).cloned()
        })?;
        self.cancel.check()?;

        let stats = match &self.config.output_dir {
            Some(dir) => emit_dir(dir, &artifacts)?,
            None => diff(&previous.artifacts, &artifacts),
        };

        let snapshot = Snapshot {
            graph,
            artifacts,
            entries,
            scan_diagnostics,
            declared,
            generation: previous.generation + 1,
        };
        Ok((snapshot, stats, affected.map(|a| a.len())))
    }

    /// Rescan `roots` and merge the result with the previous entries.
    fn rescan(&self, previous: &Snapshot, roots: &[String]) -> (Vec<Entry>, Vec<Diagnostic>) {
        let inside = |path: &str| roots.iter().any(|root| is_within(path, root));
        let scanner = Scanner::new(self.storage.as_ref(), &self.config.names);

        let scanned = roots
            .iter()
            .map(|root| scanner.scan_subtree(root))
            .fold(ScanOutput::default(), |mut acc, out| {
                acc.entries.extend(out.entries);
                acc.diagnostics.extend(out.diagnostics);
                acc
            });
        let fresh = self.loader().load_all(&scanned.entries);
        tracing::debug!(
            roots = roots.len(),
            rescanned = fresh.len(),
            "Rescanned changed subtrees"
        );

        let mut entries: Vec<Entry> = previous
            .entries
            .iter()
            .filter(|e| !inside(&e.path))
            .cloned()
            .chain(fresh)
            .collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));

        let mut diagnostics: Vec<Diagnostic> = previous
            .scan_diagnostics
            .iter()
            .filter(|d| !inside(&d.path))
            .cloned()
            .chain(scanned.diagnostics)
            .collect();
        diagnostics.sort();
        (entries, diagnostics)
    }

    fn loader(&self) -> Loader<'_> {
        Loader::new(&self.storage, &self.config.registry, self.config.read_timeout)
    }

    /// Artifact bytes of the node at `id` in the current snapshot.
    ///
    /// # Panics
    ///
    /// Panics if the internal `RwLock` is poisoned.
    #[must_use]
    pub fn node_artifact(&self, id: &str) -> Option<Vec<u8>> {
        self.snapshot()
            .artifacts
            .get(&node_artifact_path(id))
            .cloned()
    }
}

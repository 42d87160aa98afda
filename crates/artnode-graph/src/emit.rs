//! Writing artifacts to disk.
//!
//! Output layout mirrors the artifact paths under the output directory:
//!
//! ```text
//! {output}/
//! +-- manifest.json          # written last; lists every artifact hash
//! +-- root.json
//! +-- nav.json
//! +-- nodes/index.json       # content root
//! +-- nodes/<id>/index.json
//! +-- collections/...
//! ```
//!
//! Each file is written to a sibling temp file and renamed into place.
//! Files whose bytes are already on disk are left alone. Files listed in the
//! previous manifest but no longer produced are removed.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path};

use rayon::prelude::*;

use crate::artifact::{Artifacts, MANIFEST_ARTIFACT, parse_manifest};
use crate::error::EmitError;

/// What an emission changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EmitStats {
    pub written: usize,
    pub unchanged: usize,
    pub removed: usize,
}

/// Compare two artifact sets without touching disk.
pub(crate) fn diff(previous: &Artifacts, next: &Artifacts) -> EmitStats {
    let mut stats = EmitStats::default();
    for (path, bytes) in next {
        if previous.get(path) == Some(bytes) {
            stats.unchanged += 1;
        } else {
            stats.written += 1;
        }
    }
    stats.removed = previous.keys().filter(|p| !next.contains_key(*p)).count();
    stats
}

/// Write `artifacts` into `dir`.
///
/// # Errors
///
/// Returns [`EmitError::Io`] if a file cannot be written. Files already
/// renamed into place stay; the manifest is only replaced after every other
/// artifact succeeded.
pub(crate) fn emit_dir(dir: &Path, artifacts: &Artifacts) -> Result<EmitStats, EmitError> {
    let previous = fs::read(dir.join(MANIFEST_ARTIFACT))
        .ok()
        .and_then(|bytes| parse_manifest(&bytes))
        .unwrap_or_default();

    let outcomes: Vec<bool> = artifacts
        .par_iter()
        .filter(|(path, _)| path.as_str() != MANIFEST_ARTIFACT)
        .map(|(path, bytes)| write_if_changed(dir, path, bytes))
        .collect::<Result<_, _>>()?;

    let mut stats = EmitStats::default();
    for written in outcomes {
        if written {
            stats.written += 1;
        } else {
            stats.unchanged += 1;
        }
    }

    stats.removed = remove_stale(dir, &previous, artifacts);

    if let Some(manifest) = artifacts.get(MANIFEST_ARTIFACT) {
        if write_if_changed(dir, MANIFEST_ARTIFACT, manifest)? {
            stats.written += 1;
        } else {
            stats.unchanged += 1;
        }
    }

    tracing::debug!(
        dir = %dir.display(),
        written = stats.written,
        unchanged = stats.unchanged,
        removed = stats.removed,
        "Artifacts emitted"
    );
    Ok(stats)
}

/// Write one artifact unless identical bytes are already there.
///
/// Returns whether the file was written.
fn write_if_changed(dir: &Path, relative: &str, bytes: &[u8]) -> Result<bool, EmitError> {
    let path = dir.join(relative);
    if fs::read(&path).is_ok_and(|existing| existing == bytes) {
        return Ok(false);
    }

    let io_error = |source| EmitError::Io {
        path: path.clone(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    let mut tmp = path.clone().into_os_string();
    tmp.push(".tmp");
    fs::write(&tmp, bytes).map_err(io_error)?;
    fs::rename(&tmp, &path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        io_error(e)
    })?;
    Ok(true)
}

/// Remove files listed in `previous` that are no longer produced.
fn remove_stale(dir: &Path, previous: &BTreeMap<String, String>, artifacts: &Artifacts) -> usize {
    let mut removed = 0;
    for relative in previous.keys().filter(|p| !artifacts.contains_key(*p)) {
        if !is_safe_relative(relative) {
            tracing::warn!(path = relative, "Ignoring unsafe manifest entry");
            continue;
        }
        let path = dir.join(relative);
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove stale artifact");
                continue;
            }
        }
        prune_empty_parents(dir, &path);
    }
    removed
}

/// Remove empty directories between `path` and `dir`, bottom up.
fn prune_empty_parents(dir: &Path, path: &Path) {
    let mut current = path.parent();
    while let Some(parent) = current {
        if parent == dir || !parent.starts_with(dir) {
            break;
        }
        // Fails on non-empty directories, which ends the walk.
        if fs::remove_dir(parent).is_err() {
            break;
        }
        current = parent.parent();
    }
}

fn is_safe_relative(relative: &str) -> bool {
    Path::new(relative)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
}

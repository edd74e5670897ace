use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::descriptor::ClassDescriptor;
use crate::graph::{normalize_path, paths_match};

use super::record::{FileRecord, RepositoryState};

/// Difference between the files on disk now and the files the last run recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
    /// Outputs every one of whose sources was removed. A partial run adds the outputs it
    /// stopped producing.
    pub stale_outputs: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    /// Added and modified paths, sorted.
    pub fn changed(&self) -> Vec<String> {
        let mut all: Vec<String> = self.added.iter().chain(&self.modified).cloned().collect();
        all.sort();
        all
    }
}

/// Fingerprint of one file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFingerprint {
    /// Root-relative, `/`-separated.
    pub path: String,
    pub fingerprint: String,
    pub size: u64,
}

/// Compare current fingerprints (path -> hash) against the prior state. Pure; every list
/// in the result is sorted. Comparing a state against its own fingerprints yields an
/// empty change set.
pub fn compute_changes(current: &BTreeMap<String, String>, prior: &RepositoryState) -> ChangeSet {
    let mut changes = ChangeSet::default();
    for (path, hash) in current {
        match prior.files.get(path) {
            None => changes.added.push(path.clone()),
            Some(record) if record.fingerprint != *hash => changes.modified.push(path.clone()),
            Some(_) => {}
        }
    }
    changes.removed = prior
        .files
        .keys()
        .filter(|p| !current.contains_key(*p))
        .cloned()
        .collect();

    let removed: BTreeSet<&str> = changes.removed.iter().map(String::as_str).collect();
    changes.stale_outputs = prior
        .outputs
        .iter()
        .filter(|(_, sources)| !sources.is_empty() && sources.iter().all(|s| removed.contains(s.as_str())))
        .map(|(id, _)| id.clone())
        .collect();
    changes
}

/// SHA-256 of `bytes`, lowercase hex.
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Hash every file in parallel. Paths are made relative to `root`. Unreadable files are
/// skipped with a warning; the result is sorted by path.
pub fn fingerprint_files(root: &Path, paths: &[PathBuf]) -> Vec<FileFingerprint> {
    let mut out: Vec<FileFingerprint> = paths
        .par_iter()
        .filter_map(|path| match std::fs::read(path) {
            Ok(bytes) => Some(FileFingerprint {
                path: relative_path(root, path),
                fingerprint: fingerprint_bytes(&bytes),
                size: bytes.len() as u64,
            }),
            Err(e) => {
                tracing::warn!(path = %path.display(), "cannot fingerprint: {e}");
                None
            }
        })
        .collect();
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

/// `path` relative to `root` with `/` separators; unchanged when outside `root`.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    normalize_path(&rel.to_string_lossy())
}

/// Replace the file table with the current fingerprints.
///
/// A file's descriptors come from `extracted` when present, otherwise they are carried
/// over from the prior record if the fingerprint is unchanged. Files no longer present
/// are dropped.
pub fn record_files(
    state: &mut RepositoryState,
    current: &[FileFingerprint],
    extracted: &HashMap<String, Vec<ClassDescriptor>>,
    now: u64,
) {
    let mut files: BTreeMap<String, FileRecord> = BTreeMap::new();
    for fp in current {
        let classes = match extracted.get(&fp.path) {
            Some(classes) => classes.clone(),
            None => state
                .files
                .get(&fp.path)
                .filter(|r| r.fingerprint == fp.fingerprint)
                .map(|r| r.classes.clone())
                .unwrap_or_default(),
        };
        let processed_at = match state.files.get(&fp.path) {
            Some(r) if r.fingerprint == fp.fingerprint && !extracted.contains_key(&fp.path) => r.processed_at,
            _ => now,
        };
        files.insert(
            fp.path.clone(),
            FileRecord {
                path: fp.path.clone(),
                fingerprint: fp.fingerprint.clone(),
                processed_at,
                size: fp.size,
                classes,
            },
        );
    }
    state.files = files;
}

/// Group descriptors by the recorded path of the file that declares them.
pub fn group_by_file(paths: &[String], classes: &[ClassDescriptor]) -> HashMap<String, Vec<ClassDescriptor>> {
    let mut grouped: HashMap<String, Vec<ClassDescriptor>> = HashMap::new();
    for class in classes {
        if let Some(path) = paths.iter().find(|p| paths_match(p, &class.file)) {
            grouped.entry(path.clone()).or_default().push(class.clone());
        }
    }
    grouped
}

/// Record which sources `output` was produced from, replacing any previous entry.
pub fn record_outputs(state: &mut RepositoryState, output: &str, sources: impl IntoIterator<Item = String>) {
    state
        .outputs
        .insert(output.to_owned(), sources.into_iter().collect());
}

/// Drop output entries, e.g. once stale outputs have been deleted downstream.
pub fn forget_outputs(state: &mut RepositoryState, outputs: &[String]) {
    for id in outputs {
        state.outputs.remove(id);
    }
}

/// Outputs produced from any of `paths`, sorted.
pub fn affected_outputs(state: &RepositoryState, paths: &[String]) -> BTreeSet<String> {
    state
        .outputs
        .iter()
        .filter(|(_, sources)| sources.iter().any(|s| paths.iter().any(|p| paths_match(s, p))))
        .map(|(id, _)| id.clone())
        .collect()
}

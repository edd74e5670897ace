use std::collections::{BTreeMap, BTreeSet};

use crate::descriptor::ClassDescriptor;

/// Current state format version. Bump when any persisted struct layout changes:
/// bincode carries no field names, so an old file would otherwise decode into garbage.
pub const STATE_VERSION: u32 = 1;

/// What the last run saw of one source file.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FileRecord {
    pub path: String,
    /// SHA-256 of the file contents, lowercase hex.
    pub fingerprint: String,
    /// Unix seconds.
    pub processed_at: u64,
    pub size: u64,
    /// Types extracted from the file on that run, so the graph can be rebuilt without
    /// the descriptors of unchanged files.
    pub classes: Vec<ClassDescriptor>,
}

/// The only entity persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RepositoryState {
    /// Always written first so a mismatch is detectable before decoding the rest.
    pub version: u32,
    pub last_full_run: Option<u64>,
    pub last_partial_run: Option<u64>,
    /// Source path -> record.
    pub files: BTreeMap<String, FileRecord>,
    /// Output id -> source paths it was produced from.
    pub outputs: BTreeMap<String, BTreeSet<String>>,
}

impl Default for RepositoryState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            last_full_run: None,
            last_partial_run: None,
            files: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }
}

impl RepositoryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every descriptor recorded across all files, in path order.
    pub fn descriptors(&self) -> Vec<ClassDescriptor> {
        self.files
            .values()
            .flat_map(|r| r.classes.iter().cloned())
            .collect()
    }

    /// Current fingerprints keyed by path, the shape `compute_changes` compares.
    pub fn fingerprints(&self) -> BTreeMap<String, String> {
        self.files
            .iter()
            .map(|(path, r)| (path.clone(), r.fingerprint.clone()))
            .collect()
    }
}

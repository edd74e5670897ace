pub mod changes;
pub mod record;

use std::io::Write;
use std::path::{Path, PathBuf};

pub use changes::{ChangeSet, compute_changes};
pub use record::{FileRecord, RepositoryState, STATE_VERSION};

/// State directory name (created in the project root).
pub const STATE_DIR: &str = ".code-flow";
/// State file name within STATE_DIR.
pub const STATE_FILE: &str = "state.bin";

/// Hard failures of the state store. Callers treat every variant as "run a full scan";
/// a partially decoded state is never returned.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("state file {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("state file {path} has format version {found}, expected {expected}")]
    SchemaMismatch { path: PathBuf, found: u32, expected: u32 },
    #[error("state I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot encode state: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("cannot replace state file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// `<project_root>/.code-flow/state.bin`
pub fn state_path(project_root: &Path) -> PathBuf {
    project_root.join(STATE_DIR).join(STATE_FILE)
}

/// Load the persisted state.
///
/// `Ok(None)` when no state exists yet. The version tag is decoded on its own first, so
/// an older layout is reported as a schema mismatch rather than as corruption.
pub fn load_state(project_root: &Path) -> Result<Option<RepositoryState>, StateError> {
    let path = state_path(project_root);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let config = bincode::config::standard();
    let (found, _) = bincode::serde::decode_from_slice::<u32, _>(&bytes, config).map_err(|e| StateError::Corrupt {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    if found != STATE_VERSION {
        return Err(StateError::SchemaMismatch {
            path,
            found,
            expected: STATE_VERSION,
        });
    }

    let (state, read) =
        bincode::serde::decode_from_slice::<RepositoryState, _>(&bytes, config).map_err(|e| StateError::Corrupt {
            path: path.clone(),
            reason: e.to_string(),
        })?;
    if read != bytes.len() {
        return Err(StateError::Corrupt {
            path,
            reason: format!("{} trailing bytes", bytes.len() - read),
        });
    }
    tracing::debug!(files = state.files.len(), outputs = state.outputs.len(), "loaded state");
    Ok(Some(state))
}

/// Save the state atomically.
///
/// Writes to a temp file in the state directory, flushes it, then renames it over the
/// previous file; a concurrent reader sees the old state or the new one, never a mix.
pub fn save_state(project_root: &Path, state: &RepositoryState) -> Result<(), StateError> {
    let dir = project_root.join(STATE_DIR);
    std::fs::create_dir_all(&dir)?;

    let target = state_path(project_root);
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    bincode::serde::encode_into_std_write(state, &mut tmp, bincode::config::standard())?;
    tmp.as_file().flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(&target)?;

    tracing::debug!(path = %target.display(), files = state.files.len(), "saved state");
    Ok(())
}

/// Unix seconds now.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use crate::state::changes::{FileFingerprint, record_files, record_outputs};

    fn sample_state() -> RepositoryState {
        let mut state = RepositoryState::new();
        let class = serde_json::from_str(r#"{"name":"A","namespace":"App","file":"a.cs"}"#).unwrap();
        let extracted = std::collections::HashMap::from([("a.cs".to_string(), vec![class])]);
        record_files(
            &mut state,
            &[FileFingerprint {
                path: "a.cs".into(),
                fingerprint: "ab".repeat(32),
                size: 12,
            }],
            &extracted,
            1_700_000_000,
        );
        record_outputs(&mut state, "SUMMARY.md", ["a.cs".to_string()]);
        state.last_full_run = Some(1_700_000_000);
        state
    }

    #[test]
    fn test_roundtrip_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = sample_state();
        save_state(dir.path(), &state).unwrap();

        let loaded = load_state(dir.path()).unwrap().expect("state should load");
        assert_eq!(loaded, state);
        assert_eq!(loaded.outputs["SUMMARY.md"], BTreeSet::from(["a.cs".to_string()]));
        assert_eq!(loaded.files["a.cs"].classes[0].key(), "App.A");
    }

    #[test]
    fn test_save_replaces_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        save_state(dir.path(), &sample_state()).unwrap();
        let empty = RepositoryState::new();
        save_state(dir.path(), &empty).unwrap();
        assert_eq!(load_state(dir.path()).unwrap(), Some(empty));
        // Only the state file remains: temp files are renamed, not left behind.
        let entries = std::fs::read_dir(dir.path().join(STATE_DIR)).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_load_missing_state_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_state(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_state_is_error() {
        let dir = tempfile::tempdir().unwrap();
        save_state(dir.path(), &sample_state()).unwrap();
        let path = state_path(dir.path());
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
        assert!(matches!(load_state(dir.path()), Err(StateError::Corrupt { .. })));

        std::fs::write(&path, b"").unwrap();
        assert!(matches!(load_state(dir.path()), Err(StateError::Corrupt { .. })));
    }

    #[test]
    fn test_version_mismatch_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = sample_state();
        state.version = STATE_VERSION + 1;
        save_state(dir.path(), &state).unwrap();
        match load_state(dir.path()) {
            Err(StateError::SchemaMismatch { found, expected, .. }) => {
                assert_eq!(found, STATE_VERSION + 1);
                assert_eq!(expected, STATE_VERSION);
            }
            other => panic!("expected schema mismatch, got {other:?}"),
        }
    }
}

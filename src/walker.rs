use std::path::{Path, PathBuf};

use crate::config::CodeFlowConfig;
use crate::state::STATE_DIR;

/// Build output directories never worth fingerprinting.
const HARD_EXCLUDED_DIRS: &[&str] = &["bin", "obj", "node_modules", STATE_DIR];

/// Walk a project directory and collect tracked source files, sorted.
///
/// Respects `.gitignore` rules, always excludes build output directories, applies any
/// additional exclusions from `config.exclude`, and keeps only files whose extension is
/// in `config.extensions()`.
pub fn walk_project(root: &Path, config: &CodeFlowConfig) -> anyhow::Result<Vec<PathBuf>> {
    if !root.is_dir() {
        anyhow::bail!("{} is not a directory", root.display());
    }
    let extensions = config.extensions();
    let patterns: Vec<glob::Pattern> = config
        .exclude
        .iter()
        .flatten()
        .filter_map(|p| match glob::Pattern::new(p) {
            Ok(pattern) => Some(pattern),
            Err(err) => {
                tracing::warn!(pattern = %p, "ignoring invalid exclude pattern: {err}");
                None
            }
        })
        .collect();

    let walker = ignore::WalkBuilder::new(root)
        .standard_filters(true)
        // Read .gitignore files even when the directory is not inside a git repository.
        .require_git(false)
        .build();

    let mut files = Vec::new();
    for result in walker {
        let entry = match result {
            Ok(e) => e,
            Err(err) => {
                tracing::warn!("{err}");
                continue;
            }
        };

        let path = entry.path();
        if entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false) {
            continue;
        }

        let rel = path.strip_prefix(root).unwrap_or(path);
        if is_hard_excluded(rel) || is_excluded_by_patterns(rel, &patterns) {
            continue;
        }

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !extensions.iter().any(|e| e == ext) {
            continue;
        }

        tracing::trace!(path = %path.display(), "tracked");
        files.push(path.to_path_buf());
    }

    files.sort();
    tracing::debug!(files = files.len(), root = %root.display(), "walked project");
    Ok(files)
}

/// Returns true if any directory component of `rel` is a build output directory.
fn is_hard_excluded(rel: &Path) -> bool {
    let mut components: Vec<&str> = rel.components().filter_map(|c| c.as_os_str().to_str()).collect();
    // Last component is the file name itself.
    components.pop();
    components.iter().any(|c| HARD_EXCLUDED_DIRS.contains(c))
}

/// Returns true if `rel` (or any of its components) matches an exclusion pattern.
fn is_excluded_by_patterns(rel: &Path, patterns: &[glob::Pattern]) -> bool {
    let rel_str = crate::graph::normalize_path(&rel.to_string_lossy());
    patterns.iter().any(|p| {
        p.matches(&rel_str)
            || rel
                .components()
                .filter_map(|c| c.as_os_str().to_str())
                .any(|s| p.matches(s))
    })
}

// Source file discovery under a namespace root

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{PrismError, Result};

/// A candidate source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path relative to the namespace root, always `/`-separated
    pub relative_path: String,
    pub path: PathBuf,
}

impl SourceFile {
    /// Read the file as text; invalid UTF-8 is replaced rather than rejected
    pub fn read(&self) -> Result<String> {
        let bytes = std::fs::read(&self.path).map_err(|source| PrismError::SourceUnreadable {
            path: self.path.clone(),
            source,
        })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Enumerate indexable files under `root`, sorted by relative path.
/// A missing root yields no files.
pub fn scan(root: &Path, config: &Config) -> Vec<SourceFile> {
    if !root.is_dir() {
        debug!("Source root {} does not exist", root.display());
        return Vec::new();
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative_path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if config.should_index_file(&relative_path) {
            files.push(SourceFile {
                relative_path,
                path: entry.path().to_path_buf(),
            });
        }
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    debug!("Found {} source files under {}", files.len(), root.display());
    files
}

/// Digest of the scanned tree: relative paths, sizes and modification times.
/// Any added, removed, resized or touched file changes it.
pub fn tree_digest(files: &[SourceFile]) -> String {
    let mut hasher = blake3::Hasher::new();
    for file in files {
        hasher.update(file.relative_path.as_bytes());
        hasher.update(&[0]);
        if let Ok(metadata) = std::fs::metadata(&file.path) {
            hasher.update(&metadata.len().to_le_bytes());
            let modified = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_nanos())
                .unwrap_or_default();
            hasher.update(&modified.to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}

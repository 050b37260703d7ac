//! Content hash of a utility's file set, used to detect local drift and to
//! compare against the published descriptor.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::descriptor::DESCRIPTOR_FILE;
use crate::error::{Result, TwigError};

/// Directories never part of a utility's content.
pub const IGNORED_DIRS: &[&str] = &["node_modules", ".git"];

/// Relative `/`-separated paths of every file under `root`, sorted. The
/// root-level descriptor is excluded since it carries the hash itself.
pub fn list_files(root: &Path) -> Result<Vec<String>> {
    let mut out = Vec::new();
    let mut stack = vec![(root.to_path_buf(), String::new())];
    while let Some((dir, prefix)) = stack.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|e| TwigError::io("list utility files", &dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| TwigError::io("list utility files", &dir, e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            let file_type = entry
                .file_type()
                .map_err(|e| TwigError::io("list utility files", &entry.path(), e))?;
            let rel = if prefix.is_empty() { name.clone() } else { format!("{}/{}", prefix, name) };
            if file_type.is_dir() {
                if !IGNORED_DIRS.contains(&name.as_str()) {
                    stack.push((entry.path(), rel));
                }
            } else if file_type.is_file() && rel != DESCRIPTOR_FILE {
                out.push(rel);
            }
        }
    }
    out.sort();
    Ok(out)
}

/// SHA-256 over (path, NUL, u64 LE length, bytes) for each listed file.
pub fn hash_files(root: &Path, files: &[String]) -> Result<String> {
    let mut hasher = Sha256::new();
    for rel in files {
        let path = root.join(rel);
        let bytes = std::fs::read(&path).map_err(|e| TwigError::io("hash utility", &path, e))?;
        hasher.update(rel.as_bytes());
        hasher.update([0u8]);
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(&bytes);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Hash of everything currently under `root`.
pub fn hash_utility(root: &Path) -> Result<String> {
    let files = list_files(root)?;
    hash_files(root, &files)
}

//! Project discovery: the manifest plus every utility found under the root.

use std::path::{Path, PathBuf};

use crate::descriptor::{UtilityDescriptor, DESCRIPTOR_FILE};
use crate::error::{Result, TwigError};
use crate::hash;
use crate::manifest::Manifest;

/// Directories never descended into while looking for utilities.
const SKIPPED_DIRS: &[&str] = &["node_modules", ".git", "target"];
/// Prefix of pull staging directories.
pub const STAGING_PREFIX: &str = ".twig-";

/// A utility found on disk.
#[derive(Clone, Debug)]
pub struct UtilityDescription {
    pub descriptor: UtilityDescriptor,
    pub path: PathBuf,
    /// Content files relative to `path`, sorted, descriptor excluded.
    pub files: Vec<String>,
}

impl UtilityDescription {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(UtilityDescription {
            descriptor: UtilityDescriptor::load(path)?,
            path: path.to_path_buf(),
            files: hash::list_files(path)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Recompute the content hash and persist it when it changed.
    /// Returns true on change.
    pub fn refresh_hash(&mut self) -> Result<bool> {
        self.files = hash::list_files(&self.path)?;
        let current = hash::hash_files(&self.path, &self.files)?;
        if current == self.descriptor.hash {
            return Ok(false);
        }
        self.descriptor.hash = current;
        self.descriptor.save(&self.path)?;
        Ok(true)
    }

    /// Files to publish: content plus the descriptor.
    pub fn publish_files(&self) -> Vec<String> {
        let mut files = self.files.clone();
        files.push(DESCRIPTOR_FILE.to_string());
        files
    }
}

#[derive(Clone, Debug)]
pub struct ProjectContext {
    pub root: PathBuf,
    pub manifest: Manifest,
    pub utilities: Vec<UtilityDescription>,
}

impl ProjectContext {
    pub fn assemble(root: &Path) -> Result<Self> {
        let manifest = Manifest::load(root)?;
        let utilities = scan_utilities(root)?;
        Ok(ProjectContext {
            root: root.to_path_buf(),
            manifest,
            utilities,
        })
    }

    /// Re-observe utilities on disk; in-memory manifest edits are kept.
    pub fn rescan_utilities(&mut self) -> Result<()> {
        self.utilities = scan_utilities(&self.root)?;
        Ok(())
    }

    pub fn select_utility_by_name(&self, name: &str) -> Option<&UtilityDescription> {
        self.utilities.iter().find(|u| u.descriptor.name == name)
    }

    pub fn select_utility_by_name_mut(&mut self, name: &str) -> Option<&mut UtilityDescription> {
        self.utilities.iter_mut().find(|u| u.descriptor.name == name)
    }

    pub fn require_utility(&self, operation: &str, name: &str) -> Result<&UtilityDescription> {
        self.select_utility_by_name(name)
            .ok_or_else(|| TwigError::not_found(operation, format!("could not find utility with name {}", name)))
    }

    /// Utilities located at or below `dir`.
    pub fn utilities_under(&self, dir: &Path) -> Vec<&UtilityDescription> {
        self.utilities.iter().filter(|u| u.path.starts_with(dir)).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.utilities.iter().map(|u| u.descriptor.name.clone()).collect()
    }
}

fn is_skipped(name: &str) -> bool {
    SKIPPED_DIRS.contains(&name) || name.starts_with(STAGING_PREFIX)
}

/// Top-down walk; the first directory holding a descriptor is a utility root
/// and is not descended into. Duplicate names are a configuration error.
pub fn scan_utilities(root: &Path) -> Result<Vec<UtilityDescription>> {
    let mut found: Vec<UtilityDescription> = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        if dir.join(DESCRIPTOR_FILE).is_file() {
            let utility = UtilityDescription::load(&dir)?;
            if let Some(other) = found.iter().find(|u| u.descriptor.name == utility.descriptor.name) {
                return Err(TwigError::config(
                    "scan utilities",
                    Some("name"),
                    format!(
                        "utility \"{}\" exists twice: {} and {}",
                        utility.descriptor.name,
                        other.path.display(),
                        utility.path.display()
                    ),
                ));
            }
            found.push(utility);
            continue;
        }
        let entries = std::fs::read_dir(&dir).map_err(|e| TwigError::io("scan utilities", &dir, e))?;
        let mut children = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir && !is_skipped(&name) {
                children.push(entry.path());
            }
        }
        // reverse so the stack pops children in name order
        children.sort();
        stack.extend(children.into_iter().rev());
    }
    found.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(found)
}

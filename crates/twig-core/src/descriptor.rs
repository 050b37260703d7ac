//! Per-utility descriptor (`utils.json`) and the dependency records shared with
//! the project manifest.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TwigError};
use crate::version::Version;

/// Fixed descriptor file name at every utility root.
pub const DESCRIPTOR_FILE: &str = "utils.json";

/// Which remote version `pull` selects relative to the current one.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UpdatePolicy {
    Major,
    #[default]
    Minor,
    Batch,
    Fixed,
}

impl UpdatePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdatePolicy::Major => "major",
            UpdatePolicy::Minor => "minor",
            UpdatePolicy::Batch => "batch",
            UpdatePolicy::Fixed => "fixed",
        }
    }
}

impl std::str::FromStr for UpdatePolicy {
    type Err = TwigError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "major" => Ok(UpdatePolicy::Major),
            "minor" => Ok(UpdatePolicy::Minor),
            "batch" => Ok(UpdatePolicy::Batch),
            "fixed" => Ok(UpdatePolicy::Fixed),
            other => Err(TwigError::validation(
                "parse update policy",
                other,
                "expected one of major, minor, batch, fixed",
            )),
        }
    }
}

/// One dependency edge: where it lives remotely, which version, how to update it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DependencyDescription {
    pub owner: String,
    pub repo: String,
    pub version: String,
    #[serde(default)]
    pub update_policy: UpdatePolicy,
}

/// Declaration order is kept: later entries win when maps are merged.
pub type DependencyMap = IndexMap<String, DependencyDescription>;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UtilityDescriptor {
    pub name: String,
    #[serde(default)]
    pub owner: String,
    pub version: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub public_repo: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub deps: DependencyMap,
}

impl UtilityDescriptor {
    pub fn new(name: &str, owner: &str, version: &str) -> Self {
        UtilityDescriptor {
            name: name.to_string(),
            owner: owner.to_string(),
            version: version.to_string(),
            hash: String::new(),
            private: false,
            public_repo: false,
            description: String::new(),
            deps: DependencyMap::new(),
        }
    }

    /// Read `<dir>/utils.json`.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(DESCRIPTOR_FILE);
        let raw = std::fs::read_to_string(&path).map_err(|e| TwigError::io("read descriptor", &path, e))?;
        Self::from_slice(raw.as_bytes()).map_err(|e| match e {
            TwigError::Validation { reason, .. } => TwigError::io("parse descriptor", &path, reason),
            other => other,
        })
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| TwigError::validation("parse descriptor", "utils.json", &e.to_string()))
    }

    /// Write `<dir>/utils.json`. Returns false when the file already held
    /// exactly this content.
    pub fn save(&self, dir: &Path) -> Result<bool> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| TwigError::validation("serialize descriptor", &self.name, &e.to_string()))?;
        write_if_changed(&dir.join(DESCRIPTOR_FILE), &content)
    }

    /// The stored version, validated.
    pub fn parsed_version(&self) -> Result<Version> {
        Version::parse(&self.version).ok_or_else(|| {
            TwigError::validation(
                "read utility version",
                &self.version,
                &format!("utility \"{}\" has an invalid version", self.name),
            )
        })
    }
}

/// Write `content` (plus a trailing newline) unless the file already matches.
pub(crate) fn write_if_changed(path: &Path, content: &str) -> Result<bool> {
    let mut content = content.to_string();
    if !content.ends_with('\n') {
        content.push('\n');
    }
    if let Ok(existing) = std::fs::read_to_string(path) {
        if existing == content {
            return Ok(false);
        }
    }
    std::fs::write(path, content).map_err(|e| TwigError::io("write file", path, e))?;
    Ok(true)
}

/// `[_-a-zA-Z]` followed by at least four `[_-a-zA-Z0-9]`.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let first_ok = matches!(chars.next(), Some(c) if c == '_' || c == '-' || c.is_ascii_alphabetic());
    first_ok && name.chars().count() >= 5 && chars.all(is_word_char)
}

pub fn is_valid_owner(owner: &str) -> bool {
    !owner.is_empty() && owner.chars().all(is_word_char)
}

fn is_word_char(c: char) -> bool {
    c == '_' || c == '-' || c.is_ascii_alphanumeric()
}

pub fn validate_name(operation: &str, name: &str) -> Result<()> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(TwigError::validation(
            operation,
            name,
            "utility names start with a letter, '_' or '-' and have at least 5 characters from [_-a-zA-Z0-9]",
        ))
    }
}

//! The project manifest: the `twig` section of `package.json`. Every other
//! key of the file is carried through untouched.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::descriptor::{write_if_changed, DependencyDescription, DependencyMap};
use crate::error::{Result, TwigError};

pub const MANIFEST_FILE: &str = "package.json";
pub const NAMESPACE: &str = "twig";
pub const DEFAULT_DEST: &str = "./utils";

/// Install rule for utilities whose name starts with `prefix`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Grouping {
    pub prefix: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub installation_destination: String,
    #[serde(default)]
    pub remove_prefix_on_pull: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct TwigSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    #[serde(default)]
    pub dependencies: DependencyMap,
    #[serde(default)]
    pub grouping: Vec<Grouping>,
}

#[derive(Clone, Debug)]
pub struct Manifest {
    path: PathBuf,
    raw: Map<String, Value>,
    has_section: bool,
    loaded: Option<TwigSection>,
    pub section: TwigSection,
}

/// Walk up from `start` to the first directory holding `package.json`.
pub fn find_project_root(start: &Path) -> Result<PathBuf> {
    let mut dir = Some(start);
    while let Some(d) = dir {
        if d.join(MANIFEST_FILE).is_file() {
            return Ok(d.to_path_buf());
        }
        dir = d.parent();
    }
    Err(TwigError::config(
        "find project root",
        Some(MANIFEST_FILE),
        format!("no {} found in {} or any parent directory", MANIFEST_FILE, start.display()),
    ))
}

impl Manifest {
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(MANIFEST_FILE);
        let text = std::fs::read_to_string(&path)
            .map_err(|e| TwigError::config("read manifest", Some(MANIFEST_FILE), format!("{}: {}", path.display(), e)))?;
        let raw: Map<String, Value> = serde_json::from_str(&text)
            .map_err(|e| TwigError::config("read manifest", Some(MANIFEST_FILE), e))?;
        let (section, has_section) = match raw.get(NAMESPACE) {
            Some(v) => (
                serde_json::from_value(v.clone())
                    .map_err(|e| TwigError::config("read manifest", Some(NAMESPACE), e))?,
                true,
            ),
            None => (TwigSection::default(), false),
        };
        Ok(Manifest {
            path,
            raw,
            has_section,
            loaded: has_section.then(|| section.clone()),
            section,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_section(&self) -> bool {
        self.has_section
    }

    /// Install a default section unless one exists. Returns whether it did.
    pub fn ensure_section(&mut self, default_owner: Option<&str>) -> bool {
        if self.has_section {
            return false;
        }
        self.section = TwigSection {
            org: default_owner.map(String::from),
            dest: Some(DEFAULT_DEST.to_string()),
            ..TwigSection::default()
        };
        self.has_section = true;
        true
    }

    pub fn dependency(&self, name: &str) -> Option<&DependencyDescription> {
        self.section.dependencies.get(name)
    }

    pub fn set_dependency(&mut self, name: &str, dep: DependencyDescription) {
        self.section.dependencies.insert(name.to_string(), dep);
        self.has_section = true;
    }

    pub fn remove_dependency(&mut self, name: &str) -> Option<DependencyDescription> {
        self.section.dependencies.shift_remove(name)
    }

    /// First grouping rule whose prefix the utility name starts with.
    pub fn grouping_for(&self, name: &str) -> Option<&Grouping> {
        self.section.grouping.iter().find(|g| name.starts_with(&g.prefix))
    }

    /// Persist the section. A manifest whose section is unchanged since load
    /// is left alone, formatting included. Returns whether the file was written.
    pub fn save(&self) -> Result<bool> {
        let unchanged = match &self.loaded {
            Some(loaded) => *loaded == self.section,
            None => !self.has_section,
        };
        if unchanged {
            return Ok(false);
        }
        let mut raw = self.raw.clone();
        let section = serde_json::to_value(&self.section)
            .map_err(|e| TwigError::config("write manifest", Some(NAMESPACE), e))?;
        raw.insert(NAMESPACE.to_string(), section);
        let text = serde_json::to_string_pretty(&Value::Object(raw))
            .map_err(|e| TwigError::config("write manifest", Some(MANIFEST_FILE), e))?;
        write_if_changed(&self.path, &text)
    }
}

//! Shared fixtures: a project in a temp dir and a seeded in-memory registry.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use twig_core::descriptor::{DependencyDescription, UpdatePolicy, UtilityDescriptor};
use twig_core::hash;
use twig_core::prompt::{NoPrompt, Prompter};
use twig_core::sync::LockManager;
use twig_core::{MemoryRegistry, ProjectContext, SessionOptions, SyncSession};

pub const OWNER: &str = "acme";

pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub registry: Arc<MemoryRegistry>,
}

impl Fixture {
    /// Project whose manifest installs into `./utils` under owner `acme`,
    /// declaring `deps` as main dependencies.
    pub fn new(deps: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let declared: serde_json::Map<String, serde_json::Value> = deps
            .iter()
            .map(|(name, version)| (name.to_string(), serde_json::to_value(dep(name, version)).unwrap()))
            .collect();
        let manifest = serde_json::json!({
            "name": "app",
            "version": "1.0.0",
            "twig": { "org": OWNER, "dest": "./utils", "dependencies": declared, "grouping": [] }
        });
        fs::write(
            dir.path().join("package.json"),
            serde_json::to_string_pretty(&manifest).unwrap() + "\n",
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("utils")).unwrap();
        Fixture {
            dir,
            registry: Arc::new(MemoryRegistry::new()),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn utility_dir(&self, name: &str) -> PathBuf {
        self.root().join("utils").join(name)
    }

    /// A fresh session, as one CLI invocation would build it.
    pub fn session(&self) -> SyncSession {
        self.session_with(Arc::new(NoPrompt), Some(OWNER))
    }

    pub fn session_with(&self, prompter: Arc<dyn Prompter>, default_owner: Option<&str>) -> SyncSession {
        SyncSession::new(
            self.registry.clone(),
            prompter,
            Arc::new(LockManager::new()),
            ProjectContext::assemble(self.root()).unwrap(),
            SessionOptions {
                default_owner: default_owner.map(String::from),
                pull_batch: 4,
                push_batch: 2,
            },
        )
    }

    /// Replace the `twig` section of the manifest.
    pub fn set_section(&self, section: serde_json::Value) {
        let manifest = serde_json::json!({ "name": "app", "version": "1.0.0", "twig": section });
        fs::write(
            self.root().join("package.json"),
            serde_json::to_string_pretty(&manifest).unwrap() + "\n",
        )
        .unwrap();
    }

    /// Write a utility into `utils/<name>` with a correct hash.
    pub fn local(&self, name: &str, version: &str, files: &[(&str, &str)], deps: &[(&str, &str)]) -> UtilityDescriptor {
        write_utility(&self.utility_dir(name), OWNER, name, version, files, deps)
    }

    /// Publish `version` of `name` with the given content.
    pub fn remote(&self, name: &str, version: &str, files: &[(&str, &str)], deps: &[(&str, &str)]) {
        self.remote_as(OWNER, name, version, files, deps);
    }

    /// Publish under another owner's repository.
    pub fn remote_as(&self, owner: &str, name: &str, version: &str, files: &[(&str, &str)], deps: &[(&str, &str)]) {
        let scratch = tempfile::tempdir().unwrap();
        let descriptor = write_utility(scratch.path(), owner, name, version, files, deps);
        let encoded = serde_json::to_vec_pretty(&descriptor).unwrap();
        let mut content: Vec<(&str, &[u8])> = files.iter().map(|(p, c)| (*p, c.as_bytes())).collect();
        content.push(("utils.json", encoded.as_slice()));
        self.registry.publish(owner, name, version, &content);
    }

    pub fn manifest_text(&self) -> String {
        fs::read_to_string(self.root().join("package.json")).unwrap()
    }
}

pub fn dep(name: &str, version: &str) -> DependencyDescription {
    DependencyDescription {
        owner: OWNER.into(),
        repo: name.into(),
        version: version.into(),
        update_policy: UpdatePolicy::Minor,
    }
}

fn write_utility(
    dir: &Path,
    owner: &str,
    name: &str,
    version: &str,
    files: &[(&str, &str)],
    deps: &[(&str, &str)],
) -> UtilityDescriptor {
    fs::create_dir_all(dir).unwrap();
    for (rel, content) in files {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    let mut descriptor = UtilityDescriptor::new(name, owner, version);
    for (d, v) in deps {
        descriptor.deps.insert(d.to_string(), dep(d, v));
    }
    descriptor.hash = hash::hash_utility(dir).unwrap();
    descriptor.save(dir).unwrap();
    descriptor
}

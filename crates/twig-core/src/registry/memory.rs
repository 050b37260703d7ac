//! In-memory registry for tests and dry runs.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::RemoteRegistry;
use crate::error::{Result, TwigError};
use crate::version::{self, Version};

type Files = BTreeMap<String, Vec<u8>>;

const DEFAULT_BRANCH: &str = "main";

#[derive(Default)]
struct Repo {
    public: bool,
    branches: BTreeMap<String, Files>,
}

#[derive(Default)]
pub struct MemoryRegistry {
    repos: Mutex<HashMap<(String, String), Repo>>,
    fail_uploads: AtomicBool,
    /// Branch another client publishes just before our next upload lands.
    racing_publish: Mutex<Option<(String, String, String, Files)>>,
    uploads: AtomicUsize,
    downloads: AtomicUsize,
    deleted_branches: AtomicUsize,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn repos(&self) -> MutexGuard<'_, HashMap<(String, String), Repo>> {
        self.repos.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn key(owner: &str, repo: &str) -> (String, String) {
        (owner.to_string(), repo.to_string())
    }

    /// Seed a branch directly, bypassing the upload counters.
    pub fn publish(&self, owner: &str, repo: &str, branch: &str, files: &[(&str, &[u8])]) {
        let mut repos = self.repos();
        let entry = repos.entry(Self::key(owner, repo)).or_default();
        entry.branches.entry(DEFAULT_BRANCH.to_string()).or_default();
        entry.branches.insert(
            branch.to_string(),
            files.iter().map(|(p, b)| (p.to_string(), b.to_vec())).collect(),
        );
    }

    /// Make the next uploads create a partial branch and then fail.
    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    /// Have another client publish `branch` right before the next upload.
    pub fn publish_before_next_upload(&self, owner: &str, repo: &str, branch: &str, files: &[(&str, &[u8])]) {
        let files = files.iter().map(|(p, b)| (p.to_string(), b.to_vec())).collect();
        if let Ok(mut slot) = self.racing_publish.lock() {
            *slot = Some((owner.to_string(), repo.to_string(), branch.to_string(), files));
        }
    }

    fn pending_publish(&self) -> Option<(String, String, String, Files)> {
        self.racing_publish.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Raw content of one file on a branch.
    pub fn branch_file(&self, owner: &str, repo: &str, branch: &str, path: &str) -> Option<Vec<u8>> {
        self.repos()
            .get(&Self::key(owner, repo))
            .and_then(|r| r.branches.get(branch))
            .and_then(|f| f.get(path))
            .cloned()
    }

    pub fn has_branch(&self, owner: &str, repo: &str, branch: &str) -> bool {
        self.repos()
            .get(&Self::key(owner, repo))
            .map(|r| r.branches.contains_key(branch))
            .unwrap_or(false)
    }

    pub fn has_repository(&self, owner: &str, repo: &str) -> bool {
        self.repos().contains_key(&Self::key(owner, repo))
    }

    pub fn is_public(&self, owner: &str, repo: &str) -> Option<bool> {
        self.repos().get(&Self::key(owner, repo)).map(|r| r.public)
    }

    pub fn branch_files(&self, owner: &str, repo: &str, branch: &str) -> Option<Vec<String>> {
        self.repos()
            .get(&Self::key(owner, repo))
            .and_then(|r| r.branches.get(branch))
            .map(|f| f.keys().cloned().collect())
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn deleted_branch_count(&self) -> usize {
        self.deleted_branches.load(Ordering::SeqCst)
    }
}

impl RemoteRegistry for MemoryRegistry {
    fn list_versions(&self, owner: &str, repo: &str) -> Result<Vec<Version>> {
        let repos = self.repos();
        Ok(match repos.get(&Self::key(owner, repo)) {
            Some(r) => version::parse_sorted(r.branches.keys().map(String::as_str)),
            None => Vec::new(),
        })
    }

    fn get_file(&self, owner: &str, repo: &str, branch: &str, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .repos()
            .get(&Self::key(owner, repo))
            .and_then(|r| r.branches.get(branch))
            .and_then(|f| f.get(path))
            .cloned())
    }

    fn ensure_repository(&self, owner: &str, repo: &str, public: bool) -> Result<()> {
        let mut repos = self.repos();
        repos.entry(Self::key(owner, repo)).or_insert_with(|| {
            let mut r = Repo {
                public,
                ..Repo::default()
            };
            r.branches.insert(DEFAULT_BRANCH.to_string(), Files::new());
            r
        });
        Ok(())
    }

    fn delete_branch(&self, owner: &str, repo: &str, branch: &str) -> Result<()> {
        let mut repos = self.repos();
        if let Some(r) = repos.get_mut(&Self::key(owner, repo)) {
            if r.branches.remove(branch).is_some() {
                self.deleted_branches.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(())
    }

    fn upload_directory(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        dir: &Path,
        files: &[String],
        reset: bool,
    ) -> Result<()> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let mut content = Files::new();
        for rel in files {
            let path = dir.join(rel);
            let bytes = std::fs::read(&path).map_err(|e| TwigError::io("upload", &path, e))?;
            content.insert(rel.clone(), bytes);
        }
        let mut repos = self.repos();
        if let Some((o, rp, b, f)) = self.pending_publish() {
            let entry = repos.entry(Self::key(&o, &rp)).or_default();
            entry.branches.entry(DEFAULT_BRANCH.to_string()).or_default();
            entry.branches.insert(b, f);
        }
        let r = repos
            .get_mut(&Self::key(owner, repo))
            .ok_or_else(|| TwigError::not_found("upload", format!("{}/{}", owner, repo)))?;
        if !reset && r.branches.contains_key(branch) {
            return Err(TwigError::conflict(
                "create ref",
                format!("branch {} of {}/{} already exists", branch, owner, repo),
            ));
        }
        if self.fail_uploads.load(Ordering::SeqCst) {
            // half-published: the ref exists but the commit never landed
            r.branches.insert(branch.to_string(), Files::new());
            return Err(TwigError::transport("create commit", None, Some(502), "injected failure"));
        }
        r.branches.insert(branch.to_string(), content);
        Ok(())
    }

    fn download_into(&self, owner: &str, repo: &str, version: &str, dest: &Path) -> Result<()> {
        let files = self
            .repos()
            .get(&Self::key(owner, repo))
            .and_then(|r| r.branches.get(version))
            .cloned()
            .ok_or_else(|| TwigError::not_found("download", format!("{}/{}@{}", owner, repo, version)))?;
        self.downloads.fetch_add(1, Ordering::SeqCst);
        for (rel, bytes) in files {
            let path = dest.join(&rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| TwigError::io("download", parent, e))?;
            }
            std::fs::write(&path, bytes).map_err(|e| TwigError::io("download", &path, e))?;
        }
        Ok(())
    }
}

//! State scoped to one top-level command: the project view, caches, locks
//! and the collaborators every engine needs.

use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dashmap::{DashMap, DashSet};

use crate::config::Config;
use crate::error::Result;
use crate::identifier::UtilityLocation;
use crate::project::{ProjectContext, UtilityDescription};
use crate::prompt::{Prompter, SerializedPrompter};
use crate::registry::RemoteRegistry;
use crate::sync::{self, LockManager};
use crate::version::Version;

#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// Owner for bare names when the manifest has no `org`.
    pub default_owner: Option<String>,
    pub pull_batch: usize,
    pub push_batch: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        let factor = sync::parallelism();
        SessionOptions {
            default_owner: None,
            pull_batch: factor * 4,
            push_batch: factor * 2,
        }
    }
}

impl From<&Config> for SessionOptions {
    fn from(cfg: &Config) -> Self {
        SessionOptions {
            default_owner: cfg.default_owner.clone(),
            pull_batch: cfg.pull_batch_size(),
            push_batch: cfg.push_batch_size(),
        }
    }
}

pub struct SyncSession {
    registry: Arc<dyn RemoteRegistry>,
    prompter: SerializedPrompter,
    locks: Arc<LockManager>,
    context: RwLock<ProjectContext>,
    processed: DashSet<String>,
    versions: DashMap<String, Vec<Version>>,
    pub(crate) identifiers: DashMap<String, UtilityLocation>,
    pub options: SessionOptions,
}

impl SyncSession {
    pub fn new(
        registry: Arc<dyn RemoteRegistry>,
        prompter: Arc<dyn Prompter>,
        locks: Arc<LockManager>,
        context: ProjectContext,
        options: SessionOptions,
    ) -> Self {
        SyncSession {
            registry,
            prompter: SerializedPrompter::new(prompter, Arc::clone(&locks)),
            locks,
            context: RwLock::new(context),
            processed: DashSet::new(),
            versions: DashMap::new(),
            identifiers: DashMap::new(),
            options,
        }
    }

    pub fn registry(&self) -> &dyn RemoteRegistry {
        self.registry.as_ref()
    }

    pub fn prompter(&self) -> &dyn Prompter {
        &self.prompter
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn context(&self) -> RwLockReadGuard<'_, ProjectContext> {
        self.context.read().unwrap_or_else(|p| p.into_inner())
    }

    pub fn context_mut(&self) -> RwLockWriteGuard<'_, ProjectContext> {
        self.context.write().unwrap_or_else(|p| p.into_inner())
    }

    pub fn root(&self) -> PathBuf {
        self.context().root.clone()
    }

    /// Snapshot of a local utility, if present.
    pub fn utility(&self, name: &str) -> Option<UtilityDescription> {
        self.context().select_utility_by_name(name).cloned()
    }

    /// Write back a utility refreshed outside the lock.
    pub fn store_utility(&self, utility: &UtilityDescription) {
        let mut ctx = self.context_mut();
        if let Some(slot) = ctx.select_utility_by_name_mut(utility.name()) {
            *slot = utility.clone();
        }
    }

    pub fn rescan(&self) -> Result<()> {
        self.context_mut().rescan_utilities()
    }

    /// Change the installed tree and rescan it while holding the context
    /// exclusively, so no scan ever walks a half-replaced utility.
    pub fn with_layout<T>(&self, change: impl FnOnce() -> Result<T>) -> Result<T> {
        let mut ctx = self.context_mut();
        let changed = change();
        ctx.rescan_utilities()?;
        changed
    }

    /// Atomically claim `name` for this run. False if already claimed.
    pub fn mark_processed(&self, name: &str) -> bool {
        self.processed.insert(name.to_string())
    }

    /// Remote versions, fetched once per session.
    pub fn versions(&self, owner: &str, repo: &str) -> Result<Vec<Version>> {
        let key = format!("{}/{}", owner, repo);
        if let Some(hit) = self.versions.get(&key) {
            return Ok(hit.clone());
        }
        let fetched = self.registry.list_versions(owner, repo)?;
        self.versions.insert(key, fetched.clone());
        Ok(fetched)
    }

    /// Remote versions, bypassing the cache.
    pub fn fresh_versions(&self, owner: &str, repo: &str) -> Result<Vec<Version>> {
        let fetched = self.registry.list_versions(owner, repo)?;
        self.versions.insert(format!("{}/{}", owner, repo), fetched.clone());
        Ok(fetched)
    }

    pub fn save_manifest(&self) -> Result<bool> {
        self.context().manifest.save()
    }
}

//! Registry tokens per owner: a pluggable store plus a lazily populated cache.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{Result, TwigError};
use crate::logger;
use crate::prompt::Prompter;
use crate::sync::LockManager;

pub const TOKENS_FILE: &str = "tokens.json";
const TOKEN_LOCK: &str = "token";

pub trait TokenStore: Send + Sync {
    fn get(&self, owner: &str) -> Result<Option<String>>;
    fn put(&self, owner: &str, token: &str) -> Result<()>;
}

/// Anything that can hand the registry a bearer token for an owner.
pub trait TokenProvider: Send + Sync {
    fn token_for(&self, owner: &str) -> Result<Option<String>>;
}

/// Same token (or none) for every owner.
pub struct StaticToken(pub Option<String>);

impl TokenProvider for StaticToken {
    fn token_for(&self, _owner: &str) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}

/// `{ "<owner>": "<token>" }` in `<twig home>/tokens.json`.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(home: &Path) -> Self {
        FileTokenStore {
            path: home.join(TOKENS_FILE),
        }
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.is_file() {
            return Ok(BTreeMap::new());
        }
        let raw = std::fs::read_to_string(&self.path).map_err(|e| TwigError::io("read tokens", &self.path, e))?;
        serde_json::from_str(&raw).map_err(|e| TwigError::config("read tokens", Some(TOKENS_FILE), e))
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, owner: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.remove(owner))
    }

    fn put(&self, owner: &str, token: &str) -> Result<()> {
        let mut all = self.read_all()?;
        all.insert(owner.to_string(), token.to_string());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TwigError::io("write tokens", parent, e))?;
        }
        let content = serde_json::to_string_pretty(&all).map_err(|e| TwigError::config("write tokens", None, e))?;
        std::fs::write(&self.path, content).map_err(|e| TwigError::io("write tokens", &self.path, e))
    }
}

/// Resolution order: cache, env token, store, prompt. The whole lookup runs
/// under one named lock so concurrent pulls ask at most once per owner.
pub struct CredentialCache {
    cache: DashMap<String, Option<String>>,
    env_token: Option<String>,
    store: Arc<dyn TokenStore>,
    prompter: Arc<dyn Prompter>,
    locks: Arc<LockManager>,
}

impl CredentialCache {
    pub fn new(
        env_token: Option<String>,
        store: Arc<dyn TokenStore>,
        prompter: Arc<dyn Prompter>,
        locks: Arc<LockManager>,
    ) -> Self {
        CredentialCache {
            cache: DashMap::new(),
            env_token,
            store,
            prompter,
            locks,
        }
    }

    fn resolve(&self, owner: &str) -> Result<Option<String>> {
        if let Some(token) = &self.env_token {
            return Ok(Some(token.clone()));
        }
        if let Some(token) = self.store.get(owner)? {
            return Ok(Some(token));
        }
        if !self.prompter.is_interactive() {
            return Ok(None);
        }
        let answer = self
            .prompter
            .ask(&format!("Access token for \"{}\" (empty to continue without one):", owner))?;
        let token = answer.trim().to_string();
        if token.is_empty() {
            return Ok(None);
        }
        if self.prompter.confirm("Save this token for later runs? (y/N)")? {
            self.store.put(owner, &token)?;
            logger::log(&format!("token for \"{}\" saved", owner));
        }
        Ok(Some(token))
    }
}

impl TokenProvider for CredentialCache {
    fn token_for(&self, owner: &str) -> Result<Option<String>> {
        self.locks.with_lock(TOKEN_LOCK, || {
            if let Some(hit) = self.cache.get(owner) {
                return Ok(hit.clone());
            }
            let token = self.resolve(owner)?;
            self.cache.insert(owner.to_string(), token.clone());
            Ok(token)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{NoPrompt, Scripted};

    #[test]
    fn test_file_store_round_trip() {
        let home = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(home.path());
        assert_eq!(store.get("acme").unwrap(), None);
        store.put("acme", "t0k").unwrap();
        store.put("other", "x").unwrap();
        assert_eq!(store.get("acme").unwrap().as_deref(), Some("t0k"));
    }

    #[test]
    fn test_prompts_once_per_owner() {
        let home = tempfile::tempdir().unwrap();
        let prompter = Arc::new(Scripted::new(["secret", "n"]));
        let cache = CredentialCache::new(
            None,
            Arc::new(FileTokenStore::new(home.path())),
            prompter.clone(),
            Arc::new(LockManager::new()),
        );
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| assert_eq!(cache.token_for("acme").unwrap().as_deref(), Some("secret")));
            }
        });
        assert_eq!(prompter.asked().len(), 2);
        assert!(!home.path().join(TOKENS_FILE).exists());
    }

    #[test]
    fn test_non_interactive_without_token_is_anonymous() {
        let home = tempfile::tempdir().unwrap();
        let cache = CredentialCache::new(
            None,
            Arc::new(FileTokenStore::new(home.path())),
            Arc::new(NoPrompt),
            Arc::new(LockManager::new()),
        );
        assert_eq!(cache.token_for("acme").unwrap(), None);
    }
}

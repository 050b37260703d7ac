//! Optional config from .twigrc or ~/.twigrc (JSON), overridden by env.

use std::path::{Path, PathBuf};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const DEFAULT_RETRY_COUNT: usize = 2;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 250;
const MAX_PARALLELISM: usize = 64;

/// Effective settings for one invocation.
#[derive(Clone, Debug)]
pub struct Config {
    pub api_url: String,
    pub default_owner: Option<String>,
    /// CPU-derived parallelism factor; batch sizes are multiples of it.
    pub concurrency: usize,
    pub home: PathBuf,
    pub token: Option<String>,
    pub http_retries: usize,
    pub http_retry_backoff_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_url: DEFAULT_API_URL.to_string(),
            default_owner: None,
            concurrency: num_cpus::get().clamp(1, MAX_PARALLELISM),
            home: default_home(),
            token: None,
            http_retries: DEFAULT_RETRY_COUNT,
            http_retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
        }
    }
}

impl Config {
    /// Top-level dependencies resolved concurrently per pull batch.
    pub fn pull_batch_size(&self) -> usize {
        self.concurrency * 4
    }

    /// Utilities handled concurrently per push/check batch.
    pub fn push_batch_size(&self) -> usize {
        self.concurrency * 2
    }
}

/// TWIG_HOME, else ~/.twig.
pub fn default_home() -> PathBuf {
    if let Some(dir) = env_nonempty("TWIG_HOME") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".twig")
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Load config from .twigrc in dir, then ~/.twigrc, then apply env.
/// Missing or invalid file = defaults.
pub fn load_config(dir: &Path) -> Config {
    let mut cfg = Config::default();
    let mut candidates = vec![dir.join(".twigrc")];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".twigrc"));
    }
    for path in &candidates {
        if path.is_file() {
            if let Ok(s) = std::fs::read_to_string(path) {
                if let Ok(v) = serde_json::from_str::<serde_json::Value>(&s) {
                    apply_file(&mut cfg, &v);
                }
            }
            break;
        }
    }
    apply_env(&mut cfg);
    cfg
}

fn apply_file(cfg: &mut Config, v: &serde_json::Value) {
    if let Some(url) = v.get("apiUrl").and_then(|x| x.as_str()) {
        cfg.api_url = url.trim_end_matches('/').to_string();
    }
    if let Some(owner) = v.get("defaultOwner").and_then(|x| x.as_str()) {
        if !owner.is_empty() {
            cfg.default_owner = Some(owner.to_string());
        }
    }
    if let Some(n) = v.get("concurrency").and_then(|x| x.as_u64()) {
        cfg.concurrency = (n as usize).clamp(1, MAX_PARALLELISM);
    }
    if let Some(home) = v.get("home").and_then(|x| x.as_str()) {
        cfg.home = PathBuf::from(home);
    }
}

fn apply_env(cfg: &mut Config) {
    if let Some(url) = env_nonempty("TWIG_API_URL") {
        cfg.api_url = url.trim_end_matches('/').to_string();
    }
    if let Some(home) = env_nonempty("TWIG_HOME") {
        cfg.home = PathBuf::from(home);
    }
    if let Some(n) = env_nonempty("TWIG_CONCURRENCY").and_then(|v| v.parse::<usize>().ok()) {
        cfg.concurrency = n.clamp(1, MAX_PARALLELISM);
    }
    cfg.token = env_nonempty("TWIG_TOKEN").or_else(|| env_nonempty("GITHUB_TOKEN"));
    if let Some(n) = env_nonempty("TWIG_HTTP_RETRIES").and_then(|v| v.parse::<usize>().ok()) {
        cfg.http_retries = n;
    }
    if let Some(ms) = env_nonempty("TWIG_HTTP_RETRY_BACKOFF_MS").and_then(|v| v.parse::<u64>().ok()) {
        cfg.http_retry_backoff_ms = ms;
    }
}

//! Bounded HTTP client: one Agent for connection reuse, capped concurrency,
//! retries with backoff on 5xx/429 and transport errors.

use std::io::Read;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::config::Config;
use crate::error::{Result, TwigError};

const REQUEST_TIMEOUT_MS: u64 = 30_000;
const MAX_CONCURRENCY_CAP: usize = 32;
const MAX_BACKOFF_MS: u64 = 5_000;
const GITHUB_API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("twig/", env!("CARGO_PKG_VERSION"));

/// Semaphore-style limit: wait until a slot is free, then hold until guard is dropped.
struct ConcurrencyLimit {
    mutex: Mutex<usize>,
    condvar: Condvar,
    max: usize,
}

impl ConcurrencyLimit {
    fn new(max: usize) -> Self {
        Self {
            mutex: Mutex::new(0),
            condvar: Condvar::new(),
            max,
        }
    }

    fn acquire(&self) -> ConcurrencyGuard<'_> {
        let mut guard = self.mutex.lock().unwrap_or_else(|p| p.into_inner());
        while *guard >= self.max {
            guard = self.condvar.wait(guard).unwrap_or_else(|p| p.into_inner());
        }
        *guard += 1;
        ConcurrencyGuard(self)
    }
}

struct ConcurrencyGuard<'a>(&'a ConcurrencyLimit);

impl Drop for ConcurrencyGuard<'_> {
    fn drop(&mut self) {
        let mut guard = self.0.mutex.lock().unwrap_or_else(|p| p.into_inner());
        *guard = guard.saturating_sub(1);
        self.0.condvar.notify_one();
    }
}

pub struct HttpClient {
    agent: ureq::Agent,
    limit: ConcurrencyLimit,
    retries: usize,
    backoff_ms: u64,
}

impl HttpClient {
    pub fn new(max_concurrent: usize, retries: usize, backoff_ms: u64) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(REQUEST_TIMEOUT_MS))
            .user_agent(USER_AGENT)
            .build();
        Self {
            agent,
            limit: ConcurrencyLimit::new(max_concurrent.clamp(1, MAX_CONCURRENCY_CAP)),
            retries,
            backoff_ms,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.concurrency * 2, cfg.http_retries, cfg.http_retry_backoff_ms)
    }

    /// GET and return the body. Non-2xx becomes a Transport error carrying the status.
    pub fn get(&self, operation: &str, url: &str, token: Option<&str>) -> Result<Vec<u8>> {
        self.send(operation, "GET", url, token, None)
    }

    pub fn get_json(&self, operation: &str, url: &str, token: Option<&str>) -> Result<serde_json::Value> {
        let body = self.get(operation, url, token)?;
        parse_json(operation, url, &body)
    }

    pub fn post_json(
        &self,
        operation: &str,
        url: &str,
        token: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let out = self.send(operation, "POST", url, token, Some(body))?;
        parse_json(operation, url, &out)
    }

    pub fn patch_json(
        &self,
        operation: &str,
        url: &str,
        token: Option<&str>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let out = self.send(operation, "PATCH", url, token, Some(body))?;
        parse_json(operation, url, &out)
    }

    pub fn delete(&self, operation: &str, url: &str, token: Option<&str>) -> Result<()> {
        self.send(operation, "DELETE", url, token, None).map(|_| ())
    }

    fn send(
        &self,
        operation: &str,
        method: &str,
        url: &str,
        token: Option<&str>,
        body: Option<&serde_json::Value>,
    ) -> Result<Vec<u8>> {
        let payload = body.map(|b| b.to_string());
        let _guard = self.limit.acquire();
        let resp = self.send_with_retry(operation, url, || {
            let mut req = self
                .agent
                .request(method, url)
                .set("Accept", "application/vnd.github+json")
                .set("X-GitHub-Api-Version", GITHUB_API_VERSION);
            if let Some(token) = token.filter(|t| !t.is_empty()) {
                req = req.set("Authorization", &format!("Bearer {}", token));
            }
            match &payload {
                Some(p) => req.set("Content-Type", "application/json").send_string(p),
                None => req.call(),
            }
        })?;
        let hint = resp
            .header("Content-Length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        let mut buf = Vec::with_capacity(hint);
        resp.into_reader()
            .read_to_end(&mut buf)
            .map_err(|e| TwigError::transport(operation, Some(url), None, e))?;
        Ok(buf)
    }

    fn send_with_retry<F>(&self, operation: &str, url: &str, mut send: F) -> Result<ureq::Response>
    where
        F: FnMut() -> std::result::Result<ureq::Response, ureq::Error>,
    {
        let mut attempt = 0usize;
        let mut backoff = self.backoff_ms;
        loop {
            attempt += 1;
            match send() {
                Ok(resp) => return Ok(resp),
                Err(ureq::Error::Status(code, resp)) => {
                    if attempt <= self.retries && (code >= 500 || code == 429) {
                        std::thread::sleep(Duration::from_millis(backoff));
                        backoff = backoff.saturating_mul(2).min(MAX_BACKOFF_MS);
                        continue;
                    }
                    let detail = resp
                        .into_string()
                        .ok()
                        .and_then(|s| api_message(&s))
                        .unwrap_or_else(|| format!("HTTP {}", code));
                    return Err(TwigError::transport(operation, Some(url), Some(code), detail));
                }
                Err(e) => {
                    if attempt <= self.retries {
                        std::thread::sleep(Duration::from_millis(backoff));
                        backoff = backoff.saturating_mul(2).min(MAX_BACKOFF_MS);
                        continue;
                    }
                    return Err(TwigError::transport(operation, Some(url), None, e));
                }
            }
        }
    }
}

fn parse_json(operation: &str, url: &str, body: &[u8]) -> Result<serde_json::Value> {
    if body.is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| TwigError::transport(operation, Some(url), None, e))
}

/// `{"message": "..."}` from an API error body.
fn api_message(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("message")?
        .as_str()
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_message_extraction() {
        assert_eq!(api_message(r#"{"message":"Not Found"}"#).as_deref(), Some("Not Found"));
        assert_eq!(api_message("<html>"), None);
    }

    #[test]
    fn test_empty_body_is_null() {
        assert_eq!(parse_json("x", "u", b"").unwrap(), serde_json::Value::Null);
        assert!(parse_json("x", "u", b"{").is_err());
    }

    #[test]
    fn test_limit_releases_on_drop() {
        let limit = ConcurrencyLimit::new(1);
        {
            let _a = limit.acquire();
        }
        let _b = limit.acquire();
    }
}

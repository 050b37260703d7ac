//! GitHub REST implementation of [`RemoteRegistry`].

use std::io::{BufReader, Cursor};
use std::path::{Component, Path};
use std::sync::Arc;

use base64::Engine;
use serde_json::{json, Value};

use super::RemoteRegistry;
use crate::credentials::TokenProvider;
use crate::error::{Result, TwigError};
use crate::http_client::HttpClient;
use crate::version::{self, Version};

const PAGE_SIZE: usize = 100;

pub struct GithubRegistry {
    api_url: String,
    client: HttpClient,
    tokens: Arc<dyn TokenProvider>,
}

impl GithubRegistry {
    pub fn new(api_url: &str, client: HttpClient, tokens: Arc<dyn TokenProvider>) -> Self {
        GithubRegistry {
            api_url: api_url.trim_end_matches('/').to_string(),
            client,
            tokens,
        }
    }

    fn repo_url(&self, owner: &str, repo: &str) -> String {
        format!("{}/repos/{}/{}", self.api_url, owner, repo)
    }

    fn token(&self, owner: &str) -> Result<Option<String>> {
        self.tokens.token_for(owner)
    }

    /// Sha of the `heads/<branch>` ref, `None` when the branch is missing.
    fn ref_sha(&self, owner: &str, repo: &str, branch: &str, token: Option<&str>) -> Result<Option<String>> {
        let url = format!("{}/git/ref/heads/{}", self.repo_url(owner, repo), branch);
        match self.client.get_json("read branch ref", &url, token) {
            Ok(v) => Ok(v.pointer("/object/sha").and_then(Value::as_str).map(String::from)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn default_branch(&self, owner: &str, repo: &str, token: Option<&str>) -> Result<String> {
        let v = self.client.get_json("read repository", &self.repo_url(owner, repo), token)?;
        Ok(v.get("default_branch")
            .and_then(Value::as_str)
            .unwrap_or("main")
            .to_string())
    }

    fn create_blob(&self, base: &str, bytes: &[u8], token: Option<&str>) -> Result<String> {
        let body = json!({
            "content": base64::engine::general_purpose::STANDARD.encode(bytes),
            "encoding": "base64",
        });
        let v = self.client.post_json("create blob", &format!("{}/git/blobs", base), token, &body)?;
        required_sha("create blob", &v)
    }
}

fn contents_url(repo_url: &str, path: &str, branch: &str) -> String {
    format!("{}/contents/{}?ref={}", repo_url, path.trim_start_matches('/'), branch)
}

fn required_sha(operation: &str, v: &Value) -> Result<String> {
    v.get("sha")
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| TwigError::transport(operation, None, None, "response without sha"))
}

/// Branch names from one page of `GET /repos/{o}/{r}/branches`.
pub fn branch_names(page: &Value) -> Vec<String> {
    page.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|b| b.get("name").and_then(Value::as_str).map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// Decode the base64 `content` field of a contents response. GitHub wraps
/// the payload at 60 columns.
pub fn decode_content(v: &Value) -> Result<Vec<u8>> {
    let raw = v
        .get("content")
        .and_then(Value::as_str)
        .ok_or_else(|| TwigError::transport("read file", None, None, "response without content"))?;
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| TwigError::transport("read file", None, None, e))
}

/// Unpack a gzipped tarball into `dest`, stripping the single top-level
/// directory GitHub wraps archives in.
pub fn extract_tarball(bytes: &[u8], dest: &Path) -> Result<()> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    let dec = GzDecoder::new(BufReader::new(Cursor::new(bytes)));
    let mut archive = Archive::new(dec);
    std::fs::create_dir_all(dest).map_err(|e| TwigError::io("extract archive", dest, e))?;

    let entries = archive.entries().map_err(|e| TwigError::io("extract archive", dest, e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| TwigError::io("extract archive", dest, e))?;
        let path = entry
            .path()
            .map_err(|e| TwigError::io("extract archive", dest, e))?
            .into_owned();
        let parts: Vec<_> = path.components().collect();
        if parts.len() < 2 || parts.iter().any(|c| !matches!(c, Component::Normal(_))) {
            continue;
        }
        let out_path = parts[1..].iter().fold(dest.to_path_buf(), |acc, c| acc.join(c));
        let kind = entry.header().entry_type();
        if kind.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| TwigError::io("extract archive", &out_path, e))?;
        } else if kind.is_file() {
            if let Some(p) = out_path.parent() {
                std::fs::create_dir_all(p).map_err(|e| TwigError::io("extract archive", p, e))?;
            }
            entry
                .unpack(&out_path)
                .map_err(|e| TwigError::io("extract archive", &out_path, e))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn file_mode(path: &Path) -> &'static str {
    use std::os::unix::fs::PermissionsExt;
    match std::fs::metadata(path) {
        Ok(m) if m.permissions().mode() & 0o111 != 0 => "100755",
        _ => "100644",
    }
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> &'static str {
    "100644"
}

impl RemoteRegistry for GithubRegistry {
    fn list_versions(&self, owner: &str, repo: &str) -> Result<Vec<Version>> {
        let token = self.token(owner)?;
        let mut names = Vec::new();
        for page in 1.. {
            let url = format!("{}/branches?per_page={}&page={}", self.repo_url(owner, repo), PAGE_SIZE, page);
            let v = match self.client.get_json("list versions", &url, token.as_deref()) {
                Ok(v) => v,
                Err(e) if e.is_not_found() => return Ok(Vec::new()),
                Err(e) => return Err(e),
            };
            let batch = branch_names(&v);
            let done = batch.len() < PAGE_SIZE;
            names.extend(batch);
            if done {
                break;
            }
        }
        Ok(version::parse_sorted(names.iter().map(String::as_str)))
    }

    fn get_file(&self, owner: &str, repo: &str, branch: &str, path: &str) -> Result<Option<Vec<u8>>> {
        let token = self.token(owner)?;
        let url = contents_url(&self.repo_url(owner, repo), path, branch);
        match self.client.get_json("read file", &url, token.as_deref()) {
            Ok(v) => decode_content(&v).map(Some),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn ensure_repository(&self, owner: &str, repo: &str, public: bool) -> Result<()> {
        let token = self.token(owner)?;
        match self.client.get("read repository", &self.repo_url(owner, repo), token.as_deref()) {
            Ok(_) => return Ok(()),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        let body = json!({ "name": repo, "private": !public, "auto_init": true });
        let org_url = format!("{}/orgs/{}/repos", self.api_url, owner);
        match self.client.post_json("create repository", &org_url, token.as_deref(), &body) {
            Ok(_) => Ok(()),
            // not an organization: create under the authenticated user
            Err(e) if e.is_not_found() => self
                .client
                .post_json("create repository", &format!("{}/user/repos", self.api_url), token.as_deref(), &body)
                .map(|_| ()),
            Err(e) => Err(e),
        }
    }

    fn delete_branch(&self, owner: &str, repo: &str, branch: &str) -> Result<()> {
        let token = self.token(owner)?;
        let url = format!("{}/git/refs/heads/{}", self.repo_url(owner, repo), branch);
        match self.client.delete("delete branch", &url, token.as_deref()) {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
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
        let token = self.token(owner)?;
        let token = token.as_deref();
        let base = self.repo_url(owner, repo);

        let default_branch = self.default_branch(owner, repo, token)?;
        let parent = self
            .ref_sha(owner, repo, &default_branch, token)?
            .ok_or_else(|| TwigError::not_found("upload", format!("{}/{}@{}", owner, repo, default_branch)))?;

        let mut tree = Vec::with_capacity(files.len());
        for rel in files {
            let path = dir.join(rel);
            let bytes = std::fs::read(&path).map_err(|e| TwigError::io("upload", &path, e))?;
            let sha = self.create_blob(&base, &bytes, token)?;
            tree.push(json!({ "path": rel, "mode": file_mode(&path), "type": "blob", "sha": sha }));
        }
        let tree = self
            .client
            .post_json("create tree", &format!("{}/git/trees", base), token, &json!({ "tree": tree }))?;
        let tree_sha = required_sha("create tree", &tree)?;

        let commit = json!({
            "message": format!("publish {}", branch),
            "tree": tree_sha,
            "parents": [parent],
        });
        let commit = self
            .client
            .post_json("create commit", &format!("{}/git/commits", base), token, &commit)?;
        let commit_sha = required_sha("create commit", &commit)?;

        let new_ref = json!({ "ref": format!("refs/heads/{}", branch), "sha": commit_sha });
        match self
            .client
            .post_json("create ref", &format!("{}/git/refs", base), token, &new_ref)
        {
            Ok(_) => Ok(()),
            Err(e) if e.status() == Some(422) && !reset => Err(TwigError::conflict(
                "create ref",
                format!("branch {} of {}/{} was published by someone else", branch, owner, repo),
            )),
            Err(e) if e.status() == Some(422) => self
                .client
                .patch_json(
                    "update ref",
                    &format!("{}/git/refs/heads/{}", base, branch),
                    token,
                    &json!({ "sha": commit_sha, "force": true }),
                )
                .map(|_| ()),
            Err(e) => Err(e),
        }
    }

    fn download_into(&self, owner: &str, repo: &str, version: &str, dest: &Path) -> Result<()> {
        let token = self.token(owner)?;
        let url = format!("{}/tarball/{}", self.repo_url(owner, repo), version);
        let bytes = self.client.get("download", &url, token.as_deref())?;
        extract_tarball(&bytes, dest)
    }
}

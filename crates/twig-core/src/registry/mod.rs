//! Remote registry access. Every utility is a repository; every published
//! version is a branch named exactly after the version string, and that
//! branch's `utils.json` is the authoritative remote record.

use std::path::Path;

use crate::descriptor::{UtilityDescriptor, DESCRIPTOR_FILE};
use crate::error::Result;
use crate::version::Version;

pub mod github;
pub mod memory;

pub use github::GithubRegistry;
pub use memory::MemoryRegistry;

pub trait RemoteRegistry: Send + Sync {
    /// Branches that parse as versions, ascending. A repository that does
    /// not exist yields an empty list: it was never published.
    fn list_versions(&self, owner: &str, repo: &str) -> Result<Vec<Version>>;

    /// File content at `branch`, `None` when the file or branch is missing.
    fn get_file(&self, owner: &str, repo: &str, branch: &str, path: &str) -> Result<Option<Vec<u8>>>;

    fn remote_descriptor(&self, owner: &str, repo: &str, version: &str) -> Result<Option<UtilityDescriptor>> {
        match self.get_file(owner, repo, version, DESCRIPTOR_FILE)? {
            // a corrupt remote descriptor is treated like a missing one
            Some(bytes) => Ok(UtilityDescriptor::from_slice(&bytes).ok()),
            None => Ok(None),
        }
    }

    /// Create the repository with an initialized default branch if missing.
    fn ensure_repository(&self, owner: &str, repo: &str, public: bool) -> Result<()>;

    fn delete_branch(&self, owner: &str, repo: &str, branch: &str) -> Result<()>;

    /// Publish exactly `files` (relative to `dir`) as one commit on a new
    /// `branch`. An existing branch is a conflict error unless `reset` is set,
    /// in which case its whole file set is replaced.
    fn upload_directory(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        dir: &Path,
        files: &[String],
        reset: bool,
    ) -> Result<()>;

    /// Materialize the files of `version` into the empty directory `dest`.
    fn download_into(&self, owner: &str, repo: &str, version: &str, dest: &Path) -> Result<()>;
}

//! Authoring commands that work on the local project: creating, checking,
//! hiding and removing utilities, plus the remote listing helpers.

use std::path::Path;

use rayon::prelude::*;

use crate::descriptor::{validate_name, UtilityDescriptor, DESCRIPTOR_FILE};
use crate::error::{Result, TwigError};
use crate::hash;
use crate::identifier::{self, parse_identifier};
use crate::logger;
use crate::project::UtilityDescription;
use crate::session::SyncSession;
use crate::version::Version;

pub const INITIAL_VERSION: &str = "0.1.0";
const README_FILE: &str = "README.md";

/// Result of re-hashing one utility.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckReport {
    pub name: String,
    pub previous_hash: String,
    pub current_hash: String,
}

impl CheckReport {
    pub fn changed(&self) -> bool {
        self.previous_hash != self.current_hash
    }
}

/// Turn `cwd` into a utility named after `input` (`name` or `owner/name`).
pub fn init(session: &SyncSession, cwd: &Path, input: &str, description: &str, public: bool) -> Result<UtilityDescriptor> {
    let id = parse_identifier(input)?;
    validate_name("init", id.name())?;

    if cwd.join(DESCRIPTOR_FILE).exists() {
        return Err(TwigError::validation(
            "init",
            &cwd.display().to_string(),
            "directory is already a utility",
        ));
    }
    {
        let ctx = session.context();
        let nested = ctx.utilities_under(cwd);
        if !nested.is_empty() {
            let listing: Vec<String> = nested
                .iter()
                .map(|u| format!("{}: {}", u.name(), u.path.display()))
                .collect();
            return Err(TwigError::validation(
                "init",
                &cwd.display().to_string(),
                &format!("this directory contains utilities:\n{}", listing.join("\n")),
            ));
        }
        if ctx.select_utility_by_name(id.name()).is_some() {
            return Err(TwigError::validation("init", id.name(), "name taken by a different utility"));
        }
    }

    let ownership = identifier::resolve_ownership(session, input)?;

    let readme = cwd.join(README_FILE);
    if !readme.exists() {
        std::fs::write(&readme, format!("# {}\n", ownership.repo)).map_err(|e| TwigError::io("init", &readme, e))?;
    }

    let mut descriptor = UtilityDescriptor::new(&ownership.repo, &ownership.owner, INITIAL_VERSION);
    descriptor.description = description.to_string();
    descriptor.public_repo = public;
    descriptor.hash = hash::hash_utility(cwd)?;
    descriptor.save(cwd)?;
    logger::log(&format!("initialized {}/{} at {}", descriptor.owner, descriptor.name, cwd.display()));

    session.rescan()?;
    Ok(descriptor)
}

fn check_one(utility: &mut UtilityDescription) -> Result<CheckReport> {
    let previous_hash = utility.descriptor.hash.clone();
    utility.refresh_hash()?;
    let report = CheckReport {
        name: utility.name().to_string(),
        previous_hash,
        current_hash: utility.descriptor.hash.clone(),
    };
    if report.changed() {
        logger::log(&format!("{} hash mismatch, updating on disk config file...", report.name));
    } else {
        logger::log(&format!("utility \"{}\" hash match!. no changes detected", report.name));
    }
    Ok(report)
}

pub fn check(session: &SyncSession, input: &str) -> Result<CheckReport> {
    let name = identifier::local_name(&session.context(), "check", input)?;
    let mut ctx = session.context_mut();
    let utility = ctx
        .select_utility_by_name_mut(&name)
        .ok_or_else(|| TwigError::not_found("check", format!("could not find utility with name {}", name)))?;
    check_one(utility)
}

/// Check every utility in parallel.
pub fn check_all(session: &SyncSession) -> Result<Vec<CheckReport>> {
    let mut ctx = session.context_mut();
    ctx.utilities.par_iter_mut().map(check_one).collect()
}

fn set_private(session: &SyncSession, operation: &str, input: &str, private: bool) -> Result<bool> {
    let name = identifier::local_name(&session.context(), operation, input)?;
    let mut ctx = session.context_mut();
    let Some(utility) = ctx.select_utility_by_name_mut(&name) else {
        return Err(TwigError::not_found(operation, format!("could not find utility with name {}", name)));
    };
    if utility.descriptor.private == private {
        return Ok(false);
    }
    utility.descriptor.private = private;
    utility.descriptor.save(&utility.path)?;
    logger::log(&format!(
        "{} is now {}",
        name,
        if private { "private" } else { "public" }
    ));
    Ok(true)
}

/// Mark a utility private so pull and push leave it alone.
pub fn hide(session: &SyncSession, input: &str) -> Result<bool> {
    set_private(session, "hide", input, true)
}

pub fn reveal(session: &SyncSession, input: &str) -> Result<bool> {
    set_private(session, "reveal", input, false)
}

/// Delete a utility directory and its manifest entry.
pub fn remove(session: &SyncSession, input: &str) -> Result<()> {
    let name = identifier::local_name(&session.context(), "remove", input)?;
    let path = session
        .utility(&name)
        .map(|u| u.path)
        .ok_or_else(|| TwigError::not_found("remove", format!("could not find utility with name {}", name)))?;
    session.with_layout(|| std::fs::remove_dir_all(&path).map_err(|e| TwigError::io("remove utility", &path, e)))?;
    session.context_mut().manifest.remove_dependency(&name);
    logger::log(&format!("removed {} from {}", name, path.display()));
    Ok(())
}

pub fn list(session: &SyncSession) -> Vec<String> {
    session.context().names()
}

/// Remote versions ascending, each rendered as a string; the local version
/// (if any) is wrapped in brackets.
pub fn list_versions(session: &SyncSession, input: &str) -> Result<Vec<String>> {
    let ownership = identifier::resolve_ownership(session, input)?;
    let versions = session.fresh_versions(&ownership.owner, &ownership.repo)?;
    let local: Option<Version> = session
        .utility(&ownership.repo)
        .and_then(|u| Version::parse(&u.descriptor.version));
    Ok(versions
        .iter()
        .map(|v| match &local {
            Some(l) if l == v => format!("[{}]", v),
            _ => v.to_string(),
        })
        .collect())
}

/// Write a default `twig` section into the manifest unless one exists.
pub fn config(session: &SyncSession) -> Result<bool> {
    let owner = session.options.default_owner.clone();
    let added = session.context_mut().manifest.ensure_section(owner.as_deref());
    if !added {
        logger::log("twig section already present in package.json, leaving it unchanged");
        return Ok(false);
    }
    session.save_manifest()?;
    logger::log("added twig section to package.json");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ProjectContext;
    use crate::prompt::{NoPrompt, Scripted};
    use crate::registry::MemoryRegistry;
    use crate::session::{SessionOptions, SyncSession};
    use crate::sync::LockManager;
    use std::fs;
    use std::sync::Arc;

    fn session(root: &Path, prompter: Arc<dyn crate::prompt::Prompter>) -> SyncSession {
        SyncSession::new(
            Arc::new(MemoryRegistry::new()),
            prompter,
            Arc::new(LockManager::new()),
            ProjectContext::assemble(root).unwrap(),
            SessionOptions {
                default_owner: Some("acme".into()),
                ..SessionOptions::default()
            },
        )
    }

    fn project() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("package.json"), r#"{"name":"app","version":"1.0.0"}"#).unwrap();
        tmp
    }

    #[test]
    fn test_init_writes_descriptor_and_readme() {
        let tmp = project();
        let dir = tmp.path().join("utils/strings");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("index.ts"), "export {}\n").unwrap();
        let s = session(tmp.path(), Arc::new(NoPrompt));

        let d = init(&s, &dir, "strings", "string helpers", true).unwrap();
        assert_eq!(d.owner, "acme");
        assert_eq!(d.version, INITIAL_VERSION);
        assert!(d.public_repo);
        assert_eq!(fs::read_to_string(dir.join("README.md")).unwrap(), "# strings\n");
        assert_eq!(d.hash, hash::hash_utility(&dir).unwrap());
        assert_eq!(list(&s), vec!["strings"]);

        // already a utility
        assert!(init(&s, &dir, "strings", "", false).is_err());
        // name taken
        let other = tmp.path().join("utils/other");
        fs::create_dir_all(&other).unwrap();
        assert!(init(&s, &other, "strings", "", false).is_err());
        // contains utilities
        assert!(init(&s, &tmp.path().join("utils"), "grouped", "", false).is_err());
        // invalid
        assert!(init(&s, &other, "abc", "", false).is_err());
    }

    #[test]
    fn test_check_hide_reveal_remove() {
        let tmp = project();
        let dir = tmp.path().join("utils/strings");
        fs::create_dir_all(&dir).unwrap();
        let s = session(tmp.path(), Arc::new(NoPrompt));
        init(&s, &dir, "acme/strings", "", false).unwrap();

        assert!(!check(&s, "strings").unwrap().changed());
        fs::write(dir.join("more.ts"), "1").unwrap();
        assert!(check(&s, "strings").unwrap().changed());
        assert!(check_all(&s).unwrap().iter().all(|r| !r.changed()));
        assert!(check(&s, "missing").unwrap_err().is_not_found());

        assert!(hide(&s, "strings").unwrap());
        assert!(!hide(&s, "strings").unwrap());
        assert!(UtilityDescriptor::load(&dir).unwrap().private);
        assert!(reveal(&s, "strings").unwrap());
        assert!(!UtilityDescriptor::load(&dir).unwrap().private);

        remove(&s, "strings").unwrap();
        assert!(!dir.exists());
        assert!(list(&s).is_empty());
    }

    #[test]
    fn test_config_never_overwrites() {
        let tmp = project();
        let s = session(tmp.path(), Arc::new(Scripted::default()));
        assert!(config(&s).unwrap());
        let written = fs::read_to_string(tmp.path().join("package.json")).unwrap();
        assert!(written.contains("\"twig\""));
        assert!(written.contains("./utils"));
        assert!(written.contains("acme"));

        let again = session(tmp.path(), Arc::new(Scripted::default()));
        assert!(!config(&again).unwrap());
        assert_eq!(fs::read_to_string(tmp.path().join("package.json")).unwrap(), written);
    }
}

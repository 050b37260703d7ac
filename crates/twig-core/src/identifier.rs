//! Turning `<name>` or `<owner>/<name>` into an owner and an install location.

use std::path::{Path, PathBuf};

use crate::descriptor::{is_valid_name, is_valid_owner};
use crate::error::{Result, TwigError};
use crate::logger;
use crate::project::ProjectContext;
use crate::session::SyncSession;

const IDENTIFIER_LOCK: &str = "identifier";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Identifier {
    Bare(String),
    Qualified { owner: String, name: String },
}

impl Identifier {
    pub fn name(&self) -> &str {
        match self {
            Identifier::Bare(name) => name,
            Identifier::Qualified { name, .. } => name,
        }
    }
}

pub fn parse_identifier(input: &str) -> Result<Identifier> {
    let invalid = || {
        TwigError::validation(
            "parse identifier",
            input,
            "expected <utility name> or <owner name>/<utility name>",
        )
    };
    match input.split_once('/') {
        None if is_valid_name(input) => Ok(Identifier::Bare(input.to_string())),
        Some((owner, name)) if is_valid_owner(owner) && is_valid_name(name) => Ok(Identifier::Qualified {
            owner: owner.to_string(),
            name: name.to_string(),
        }),
        _ => Err(invalid()),
    }
}

/// Who owns a utility and whether the local copy agrees.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ownership {
    pub owner: String,
    pub repo: String,
    /// An explicit owner differed from the local record and the user accepted it.
    pub owner_switched: bool,
    pub exists_locally: bool,
    /// The owner was typed as part of the identifier.
    pub explicit_owner: bool,
}

/// Where a utility lives (or will live) inside the project.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UtilityLocation {
    pub owner: String,
    pub repo: String,
    pub owner_switched: bool,
    pub exists_locally: bool,
    /// Relative to the project root.
    pub parent_dir: PathBuf,
    pub dir_name: String,
}

impl UtilityLocation {
    pub fn install_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.parent_dir).join(&self.dir_name)
    }

    pub fn qualified(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// Owner for a utility with no local record: manifest `org`, then the
/// configured default owner, then the user.
pub fn fallback_owner(session: &SyncSession, name: &str) -> Result<String> {
    let org = session.context().manifest.section.org.clone().filter(|o| !o.is_empty());
    if let Some(owner) = org.or_else(|| session.options.default_owner.clone()) {
        logger::log(&format!("using default owner {} for {}", owner, name));
        return Ok(owner);
    }
    let question = format!("Owner (user or organization) of \"{}\":", name);
    let answer = session.prompter().ask(&question)?;
    let owner = answer.trim().to_string();
    if !is_valid_owner(&owner) {
        return Err(TwigError::validation("read owner", &owner, "owner names use [_-a-zA-Z0-9]"));
    }
    Ok(owner)
}

/// Resolve the owner only; no installation location is required.
pub fn resolve_ownership(session: &SyncSession, input: &str) -> Result<Ownership> {
    let id = parse_identifier(input)?;
    let local = session.utility(id.name());
    match id {
        Identifier::Qualified { owner, name } => {
            let mut out = Ownership {
                owner: owner.clone(),
                repo: name.clone(),
                owner_switched: false,
                exists_locally: local.is_some(),
                explicit_owner: true,
            };
            if let Some(local) = local {
                let current = local.descriptor.owner;
                if !current.is_empty() && current != owner {
                    let question = format!(
                        "utility \"{}\" is owned by \"{}\" in this project, switch it to \"{}\"? (y/N)",
                        name, current, owner
                    );
                    if session.prompter().confirm(&question)? {
                        out.owner_switched = true;
                    } else {
                        out.owner = current;
                    }
                }
            }
            Ok(out)
        }
        Identifier::Bare(name) => {
            let (owner, exists_locally) = match local {
                Some(local) => {
                    if local.descriptor.owner.is_empty() {
                        return Err(TwigError::config(
                            "resolve owner",
                            Some("owner"),
                            format!(
                                "utility {} has no owner, add one to {}",
                                name,
                                local.path.join(crate::descriptor::DESCRIPTOR_FILE).display()
                            ),
                        ));
                    }
                    (local.descriptor.owner, true)
                }
                None => {
                    let grouped = session
                        .context()
                        .manifest
                        .grouping_for(&name)
                        .and_then(|g| g.owner.clone());
                    match grouped {
                        Some(owner) => (owner, false),
                        None => (fallback_owner(session, &name)?, false),
                    }
                }
            };
            Ok(Ownership {
                owner,
                repo: name,
                owner_switched: false,
                exists_locally,
                explicit_owner: false,
            })
        }
    }
}

/// Full resolution, memoized per session by input string.
pub fn resolve_identifier(session: &SyncSession, input: &str) -> Result<UtilityLocation> {
    session.locks().with_lock(IDENTIFIER_LOCK, || {
        if let Some(hit) = session.identifiers.get(input) {
            return Ok(hit.clone());
        }
        let ownership = resolve_ownership(session, input)?;
        let location = locate(session, ownership)?;
        session.identifiers.insert(input.to_string(), location.clone());
        Ok(location)
    })
}

fn relative_to(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).map(Path::to_path_buf).unwrap_or_else(|_| path.to_path_buf())
}

fn locate(session: &SyncSession, ownership: Ownership) -> Result<UtilityLocation> {
    let Ownership {
        mut owner,
        repo,
        owner_switched,
        exists_locally,
        explicit_owner,
    } = ownership;
    let root = session.root();

    let local_path = session.utility(&repo).map(|u| u.path);
    let (parent_dir, dir_name) = match local_path {
        Some(path) => {
            let parent = path.parent().map(|p| relative_to(&root, p)).unwrap_or_default();
            let dir = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| repo.clone());
            (parent, dir)
        }
        None => placement(session, &repo, &mut owner, explicit_owner)?,
    };

    check_install_parent(&root, &parent_dir)?;
    Ok(UtilityLocation {
        owner,
        repo,
        owner_switched,
        exists_locally,
        parent_dir,
        dir_name,
    })
}

/// Grouping rule, then manifest `dest`, then ask.
fn placement(session: &SyncSession, repo: &str, owner: &mut String, explicit_owner: bool) -> Result<(PathBuf, String)> {
    let (group, dest) = {
        let ctx = session.context();
        (ctx.manifest.grouping_for(repo).cloned(), ctx.manifest.section.dest.clone())
    };
    if let Some(group) = group {
        if !explicit_owner {
            if let Some(group_owner) = group.owner {
                *owner = group_owner;
            }
        }
        let dir_name = match repo.strip_prefix(&group.prefix) {
            Some(stripped) if group.remove_prefix_on_pull && !stripped.is_empty() => stripped.to_string(),
            _ => repo.to_string(),
        };
        return Ok((PathBuf::from(group.installation_destination), dir_name));
    }
    let parent = match dest.filter(|d| !d.is_empty()) {
        Some(dest) => dest,
        None => session
            .prompter()
            .ask("Installation directory, relative to the project root:")?
            .trim()
            .to_string(),
    };
    Ok((PathBuf::from(parent), repo.to_string()))
}

fn check_install_parent(root: &Path, parent_dir: &Path) -> Result<()> {
    let full = root.join(parent_dir);
    if !full.exists() {
        return Err(TwigError::config(
            "resolve installation path",
            Some("dest"),
            format!("installation path {} does not exist", full.display()),
        ));
    }
    if !full.is_dir() {
        return Err(TwigError::config(
            "resolve installation path",
            Some("dest"),
            format!("installation path {} is not a directory", full.display()),
        ));
    }
    Ok(())
}

/// Name of a local utility or an error suitable for `check`/`hide`/... .
pub fn local_name(ctx: &ProjectContext, operation: &str, input: &str) -> Result<String> {
    let id = parse_identifier(input)?;
    ctx.require_utility(operation, id.name()).map(|u| u.descriptor.name.clone())
}

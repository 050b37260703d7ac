//! Pull engine: decide per utility whether to fetch, keep, or flag it, then
//! recurse into the pulled utility's own dependencies.

use std::path::{Path, PathBuf};

use crate::descriptor::{DependencyDescription, DependencyMap, UpdatePolicy, UtilityDescriptor};
use crate::error::{Result, TwigError};
use crate::identifier::{self, UtilityLocation};
use crate::logger;
use crate::project::{UtilityDescription, STAGING_PREFIX};
use crate::resolver;
use crate::session::SyncSession;
use crate::sync;
use crate::version::{compare, Op, Version};

#[derive(Clone, Debug)]
pub struct PullRequest {
    /// `<name>` or `<owner>/<name>`.
    pub identifier: String,
    /// Requested version; also the reference point for `minor` and `batch`.
    pub version: Option<String>,
    pub update_policy: UpdatePolicy,
    /// Declared directly in the manifest (recorded there on success).
    pub main_dep: bool,
    /// Overwrite local copies whose content does not match any published record.
    pub force: bool,
}

impl PullRequest {
    pub fn new(identifier: &str) -> Self {
        PullRequest {
            identifier: identifier.to_string(),
            version: None,
            update_policy: UpdatePolicy::default(),
            main_dep: true,
            force: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PullOutcome {
    NotFoundRemotely,
    /// Local utility is hidden; left alone.
    Private,
    Pulled(Version),
    UpToDate(Version),
    /// The local version was never published.
    DivergedUnpublished(Version),
    /// Local is newer than what the policy selects.
    DivergedAhead { local: Version, remote: Version },
    /// Local content differs from every published record; not overwritten.
    LocalChanges { local: Version, remote: Version },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PullAllReport {
    pub removed: Vec<String>,
    pub kept: Vec<String>,
}

/// Pick the version `policy` allows, relative to `target`.
pub fn select_version(versions: &[Version], policy: UpdatePolicy, target: &Version) -> Option<Version> {
    let latest = versions.last()?;
    let pick = match policy {
        UpdatePolicy::Fixed => return versions.iter().find(|v| compare(v, Op::Eq, target)).cloned(),
        UpdatePolicy::Major => None,
        UpdatePolicy::Minor => versions.iter().filter(|v| v.major <= target.major).last(),
        UpdatePolicy::Batch => versions
            .iter()
            .filter(|v| (v.major == target.major && v.minor <= target.minor) || v.major < target.major)
            .last(),
    };
    Some(pick.unwrap_or(latest).clone())
}

pub fn pull_utility(session: &SyncSession, req: &PullRequest) -> Result<PullOutcome> {
    let location = identifier::resolve_identifier(session, &req.identifier)?;
    let versions = session.versions(&location.owner, &location.repo)?;
    let Some(latest) = versions.last().cloned() else {
        logger::log_error(&format!(
            "remote utility {} was not found and has no versions",
            req.identifier
        ));
        return Ok(PullOutcome::NotFoundRemotely);
    };
    logger::log(&format!("latest version of {} is {}", location.qualified(), latest));

    let local = session.utility(&location.repo);
    if let Some(local) = &local {
        if local.descriptor.private {
            logger::log(&format!("{} exists in the project and is private", req.identifier));
            return Ok(PullOutcome::Private);
        }
    }

    let requested = req.version.as_deref().map(|v| Version::parse_or_err(v, "pull")).transpose()?;

    let mut local = match local {
        Some(local) if !location.owner_switched => local,
        _ => {
            let target = requested.unwrap_or(latest);
            if !versions.iter().any(|v| compare(v, Op::Eq, &target)) {
                return Err(TwigError::not_found(
                    "pull",
                    format!("version {} of {} does not exist remotely", target, location.qualified()),
                ));
            }
            logger::log(&format!("{} is not in the project, pulling {}", req.identifier, target));
            download(session, &location, &target)?;
            return finish(session, req, &location, PullOutcome::Pulled(target));
        }
    };

    local.refresh_hash()?;
    session.store_utility(&local);
    let local_version = local.descriptor.parsed_version()?;

    if !versions.iter().any(|v| compare(v, Op::Eq, &local_version)) {
        if compare(&local_version, Op::Gt, &latest) {
            logger::warn(&format!(
                "{}: local version {} is greater than remote latest {}, please push updates",
                location.repo, local_version, latest
            ));
            return Ok(PullOutcome::DivergedAhead {
                local: local_version,
                remote: latest,
            });
        }
        logger::warn(&format!(
            "utility {} at {} has version {} which does not exist remotely, please push",
            location.repo,
            local.path.display(),
            local_version
        ));
        return Ok(PullOutcome::DivergedUnpublished(local_version));
    }

    let target = requested.unwrap_or_else(|| local_version.clone());
    let selected = match select_version(&versions, req.update_policy, &target) {
        Some(v) => v,
        None => {
            return Err(TwigError::not_found(
                "pull",
                format!("version {} of {} is not found remotely", target, location.qualified()),
            ))
        }
    };
    logger::log(&format!(
        "selected {} for {} under {} policy",
        selected,
        location.repo,
        req.update_policy.as_str()
    ));

    let should_download = if req.update_policy == UpdatePolicy::Fixed {
        !compare(&selected, Op::Eq, &local_version)
    } else if compare(&selected, Op::Gt, &local_version) {
        true
    } else if compare(&selected, Op::Lt, &local_version) {
        logger::warn(&format!(
            "{}: local version {} is greater than the selected remote {}, please push updates",
            location.repo, local_version, selected
        ));
        return Ok(PullOutcome::DivergedAhead {
            local: local_version,
            remote: selected,
        });
    } else {
        false
    };

    if !should_download {
        logger::log(&format!("{} is up to date at {}", location.repo, selected));
        return finish(session, req, &location, PullOutcome::UpToDate(selected));
    }

    if !req.force && !matches_published(session, &location, &local, &local_version)? {
        logger::warn(&format!(
            "{} has local changes not published as {}; not replacing it with {} (use --force)",
            location.repo, local_version, selected
        ));
        return Ok(PullOutcome::LocalChanges {
            local: local_version,
            remote: selected,
        });
    }

    download(session, &location, &selected)?;
    finish(session, req, &location, PullOutcome::Pulled(selected))
}

/// Whether the local content is exactly what was published as `version`.
fn matches_published(
    session: &SyncSession,
    location: &UtilityLocation,
    local: &UtilityDescription,
    version: &Version,
) -> Result<bool> {
    let remote = session
        .registry()
        .remote_descriptor(&location.owner, &location.repo, version.as_str())?;
    Ok(matches!(remote, Some(remote) if remote.hash == local.descriptor.hash))
}

/// Record a main dependency and recurse into the utility's own deps.
fn finish(session: &SyncSession, req: &PullRequest, location: &UtilityLocation, outcome: PullOutcome) -> Result<PullOutcome> {
    let selected = match &outcome {
        PullOutcome::Pulled(v) | PullOutcome::UpToDate(v) => v.clone(),
        _ => return Ok(outcome),
    };
    let dir = location.install_dir(&session.root());
    let descriptor = UtilityDescriptor::load(&dir)?;
    process_dependencies(session, &descriptor.deps, false, req.force)?;

    if req.main_dep {
        session.context_mut().manifest.set_dependency(
            &location.repo,
            DependencyDescription {
                owner: location.owner.clone(),
                repo: location.repo.clone(),
                version: selected.to_string(),
                update_policy: req.update_policy,
            },
        );
    }
    Ok(outcome)
}

fn staging_dir(parent: &Path, dir_name: &str) -> PathBuf {
    parent.join(format!("{}staging-{}-{}", STAGING_PREFIX, dir_name, std::process::id()))
}

/// Fetch `version` into a staging directory, then swap it into place.
fn download(session: &SyncSession, location: &UtilityLocation, version: &Version) -> Result<()> {
    let root = session.root();
    let parent = root.join(&location.parent_dir);
    let dest = location.install_dir(&root);
    let staging = staging_dir(&parent, &location.dir_name);
    logger::log(&format!(
        "pulling {}@{} into {}",
        location.qualified(),
        version,
        dest.display()
    ));

    if staging.exists() {
        std::fs::remove_dir_all(&staging).map_err(|e| TwigError::io("clear staging", &staging, e))?;
    }
    std::fs::create_dir_all(&staging).map_err(|e| TwigError::io("create staging", &staging, e))?;
    let staged = session
        .registry()
        .download_into(&location.owner, &location.repo, version.as_str(), &staging)
        .and_then(|()| claim_owner(&staging, &location.owner));
    if let Err(e) = staged {
        let _ = std::fs::remove_dir_all(&staging);
        return Err(e);
    }
    // sibling pulls in the batch rescan too; they must not see `dest` mid-swap
    session.with_layout(|| {
        swap_into_place(&staging, &dest).map_err(|e| {
            let _ = std::fs::remove_dir_all(&staging);
            e
        })
    })
}

/// Downloaded descriptors without an owner get the one they were pulled from.
fn claim_owner(dir: &Path, owner: &str) -> Result<()> {
    let mut descriptor = UtilityDescriptor::load(dir)?;
    if descriptor.owner.is_empty() {
        descriptor.owner = owner.to_string();
        descriptor.save(dir)?;
    }
    Ok(())
}

fn swap_into_place(staging: &Path, dest: &Path) -> Result<()> {
    if dest.exists() {
        std::fs::remove_dir_all(dest).map_err(|e| TwigError::io("replace utility", dest, e))?;
    }
    std::fs::rename(staging, dest).map_err(|e| TwigError::io("replace utility", dest, e))
}

/// Pull each dependency at most once per session, in bounded batches.
/// Per-utility failures are reported and skipped; fatal ones stop the run.
pub fn process_dependencies(session: &SyncSession, deps: &DependencyMap, main: bool, force: bool) -> Result<()> {
    let entries: Vec<(&String, &DependencyDescription)> = deps.iter().collect();
    sync::run_in_batches(&entries, session.options.pull_batch, |(name, dep)| {
        if !session.mark_processed(name) {
            return Ok(());
        }
        let req = PullRequest {
            identifier: format!("{}/{}", dep.owner, dep.repo),
            version: Some(dep.version.clone()),
            update_policy: dep.update_policy,
            main_dep: main,
            force,
        };
        match pull_utility(session, &req) {
            Ok(_) => Ok(()),
            Err(e) if !e.is_fatal() => {
                logger::log_error(&e.to_string());
                Ok(())
            }
            Err(e) => Err(e),
        }
    })
    .map(|_| ())
}

/// Pull every declared dependency, then garbage-collect utilities nothing
/// reaches anymore, but only those whose content matches a published record.
/// `force` reaches every pull, transitive ones included.
pub fn pull_all(session: &SyncSession, keep_excess: bool, force: bool) -> Result<PullAllReport> {
    let declared = session.context().manifest.section.dependencies.clone();
    process_dependencies(session, &declared, true, force)?;

    let mut report = PullAllReport::default();
    if keep_excess {
        return Ok(report);
    }

    session.rescan()?;
    let excess: Vec<UtilityDescription> = {
        let ctx = session.context();
        let reachable = resolver::collect_dependencies_list(&ctx, &ctx.manifest.section.dependencies);
        ctx.utilities
            .iter()
            .filter(|u| !reachable.contains_key(u.name()))
            .cloned()
            .collect()
    };

    let verdicts = sync::run_in_batches(&excess, session.options.pull_batch, |utility| {
        let removable = excess_is_published(session, utility)?;
        if removable {
            std::fs::remove_dir_all(&utility.path).map_err(|e| TwigError::io("remove utility", &utility.path, e))?;
            logger::log(&format!("removed {}, it is no longer required", utility.name()));
        }
        Ok((utility.name().to_string(), removable))
    })?;
    for (name, removed) in verdicts {
        if removed {
            report.removed.push(name);
        } else {
            report.kept.push(name);
        }
    }
    session.rescan()?;
    Ok(report)
}

fn excess_is_published(session: &SyncSession, utility: &UtilityDescription) -> Result<bool> {
    let d = &utility.descriptor;
    let id = format!("{}/{}", d.owner, d.name);
    if d.owner.is_empty() {
        logger::warn(&format!("{} is not required by any dependency and has no owner; keeping it", d.name));
        return Ok(false);
    }
    let versions = session.versions(&d.owner, &d.name)?;
    if !versions.iter().any(|v| v.as_str() == d.version) {
        logger::warn(&format!(
            "{} is not registered on main dependencies, and its current version does not exist remotely; push to register it, or remove it manually",
            id
        ));
        return Ok(false);
    }
    let Some(remote) = session.registry().remote_descriptor(&d.owner, &d.name, &d.version)? else {
        logger::warn(&format!(
            "{} is not registered on main dependencies and the remote record of {} is missing; keeping it",
            id, d.version
        ));
        return Ok(false);
    };
    let mut current = utility.clone();
    current.refresh_hash()?;
    if current.descriptor.hash != remote.hash {
        logger::warn(&format!(
            "{} is not registered on main dependencies and has unpublished changes; keeping it",
            id
        ));
        return Ok(false);
    }
    Ok(true)
}

//! Push engine: publish a local utility as a new remote version, or explain
//! why it must not be.

use crate::descriptor::{validate_name, DependencyDescription, UpdatePolicy};
use crate::error::{Result, TwigError};
use crate::identifier::{self, Ownership};
use crate::logger;
use crate::project::UtilityDescription;
use crate::resolver;
use crate::session::SyncSession;
use crate::sync;
use crate::version::{compare, Op, Version};

#[derive(Clone, Debug)]
pub struct PushRequest {
    pub name: String,
    pub main_dep: bool,
    /// Policy recorded in the manifest; `None` keeps the existing one.
    pub update_policy: Option<UpdatePolicy>,
}

impl PushRequest {
    pub fn new(name: &str) -> Self {
        PushRequest {
            name: name.to_string(),
            main_dep: true,
            update_policy: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    Private,
    Published(Version),
    UpToDate(Version),
    RemoteAhead { local: Version, remote: Version },
    /// Same version as the remote, different content.
    ContentChangedWithoutBump(Version),
}

pub fn push_utility(session: &SyncSession, req: &PushRequest) -> Result<PushOutcome> {
    let name = identifier::parse_identifier(&req.name)?.name().to_string();
    validate_name("push", &name)?;

    // everything that can refuse the push runs before the owner is asked for
    // or anything on disk is touched
    let mut utility = session.context().require_utility("push", &name)?.clone();
    if utility.descriptor.private {
        logger::warn(&format!("utility {} is private, it cannot be uploaded", utility.name()));
        return Ok(PushOutcome::Private);
    }
    let local = utility.descriptor.parsed_version()?;

    let ownership = identifier::resolve_ownership(session, &req.name)?;
    if utility.refresh_hash()? {
        logger::log(&format!("{} hash updated to {}", utility.name(), utility.descriptor.hash));
    }
    session.store_utility(&utility);

    let versions = session.fresh_versions(&ownership.owner, &ownership.repo)?;
    let outcome = match versions.last() {
        None => {
            logger::log(&format!("{} has no remote versions, publishing {}", ownership.repo, local));
            publish(session, &ownership, &utility, &local, false)?
        }
        Some(latest) if compare(&local, Op::Gt, latest) => {
            logger::log(&format!("publishing {} {} (remote latest {})", ownership.repo, local, latest));
            publish(session, &ownership, &utility, &local, false)?
        }
        Some(latest) if compare(&local, Op::Lt, latest) => {
            logger::warn(&format!(
                "remote version of {} ({}) is ahead of local {}, pull first",
                ownership.repo, latest, local
            ));
            return Ok(PushOutcome::RemoteAhead {
                local,
                remote: latest.clone(),
            });
        }
        Some(_) => {
            let remote = session
                .registry()
                .remote_descriptor(&ownership.owner, &ownership.repo, local.as_str())?;
            match remote {
                None => {
                    logger::warn(&format!(
                        "remote record of {} {} is missing or unreadable, publishing it again",
                        ownership.repo, local
                    ));
                    publish(session, &ownership, &utility, &local, true)?
                }
                Some(remote) if remote.hash != utility.descriptor.hash => {
                    logger::warn(&format!(
                        "{}: contents changed but version {} was not bumped, update the version and try again",
                        ownership.repo, local
                    ));
                    return Ok(PushOutcome::ContentChangedWithoutBump(local));
                }
                Some(_) => {
                    logger::log(&format!("{} is up to date at {}", ownership.repo, local));
                    PushOutcome::UpToDate(local)
                }
            }
        }
    };

    if req.main_dep {
        record_dependency(session, req, &ownership, &outcome);
    }
    Ok(outcome)
}

fn record_dependency(session: &SyncSession, req: &PushRequest, ownership: &Ownership, outcome: &PushOutcome) {
    let version = match outcome {
        PushOutcome::Published(v) | PushOutcome::UpToDate(v) => v,
        _ => return,
    };
    let mut ctx = session.context_mut();
    let policy = req
        .update_policy
        .or_else(|| ctx.manifest.dependency(&ownership.repo).map(|d| d.update_policy))
        .unwrap_or_default();
    ctx.manifest.set_dependency(
        &ownership.repo,
        DependencyDescription {
            owner: ownership.owner.clone(),
            repo: ownership.repo.clone(),
            version: version.to_string(),
            update_policy: policy,
        },
    );
}

/// Upload `utility` as branch `version`; only `reset` may replace a branch
/// that already exists. A failed upload removes whatever part of the branch
/// was created before the error is returned.
fn publish(
    session: &SyncSession,
    ownership: &Ownership,
    utility: &UtilityDescription,
    version: &Version,
    reset: bool,
) -> Result<PushOutcome> {
    let registry = session.registry();
    let (owner, repo) = (&ownership.owner, &ownership.repo);
    registry.ensure_repository(owner, repo, utility.descriptor.public_repo)?;

    let files = utility.publish_files();
    if let Err(e) = registry.upload_directory(owner, repo, version.as_str(), &utility.path, &files, reset) {
        if e.is_conflict() {
            // the branch belongs to whoever published it first
            logger::log_error(&format!(
                "{}/{} {} was published concurrently, pull it and bump the version",
                owner, repo, version
            ));
            return Err(e);
        }
        logger::log_error(&format!("upload of {}/{} {} failed, removing the branch", owner, repo, version));
        if let Err(cleanup) = registry.delete_branch(owner, repo, version.as_str()) {
            logger::log_error(&format!("could not remove branch {} of {}/{}: {}", version, owner, repo, cleanup));
        }
        return Err(e);
    }
    logger::log(&format!("published {}/{} {}", owner, repo, version));
    Ok(PushOutcome::Published(version.clone()))
}

/// Push every local utility. One declared in the manifest, or not required
/// by any declared utility, is recorded as a main dependency.
pub fn push_all(session: &SyncSession) -> Result<Vec<(String, PushOutcome)>> {
    let requests: Vec<PushRequest> = {
        let ctx = session.context();
        let declared = &ctx.manifest.section.dependencies;
        let reachable = resolver::collect_dependencies_list(&ctx, declared);
        ctx.utilities
            .iter()
            .map(|u| PushRequest {
                name: u.name().to_string(),
                main_dep: declared.contains_key(u.name()) || !reachable.contains_key(u.name()),
                update_policy: None,
            })
            .collect()
    };

    let results = sync::run_in_batches(&requests, session.options.push_batch, |req| {
        match push_utility(session, req) {
            Ok(outcome) => Ok(Some((req.name.clone(), outcome))),
            Err(e) if !e.is_fatal() => {
                logger::log_error(&e.to_string());
                Ok(None)
            }
            Err(e) => Err(e),
        }
    })?;
    Ok(results.into_iter().flatten().collect())
}

/// Delete a published version: the branch named after it.
pub fn delete_version(session: &SyncSession, input: &str, version: &str) -> Result<()> {
    let version = Version::parse_or_err(version, "delete version")?;
    let ownership = identifier::resolve_ownership(session, input)?;
    let versions = session.fresh_versions(&ownership.owner, &ownership.repo)?;
    if !versions.iter().any(|v| compare(v, Op::Eq, &version)) {
        return Err(TwigError::not_found(
            "delete version",
            format!("version {} of {}/{} does not exist remotely", version, ownership.owner, ownership.repo),
        ));
    }
    session
        .registry()
        .delete_branch(&ownership.owner, &ownership.repo, version.as_str())?;
    logger::log(&format!("deleted {} of {}/{}", version, ownership.owner, ownership.repo));
    Ok(())
}

//! Thin CLI layer: parse args, styled output, and call into twig-core.
//! Crash-proof: panic caught and reported; all errors return Result.

mod prompt;

use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use prompt::TerminalPrompter;
use twig_core::commands;
use twig_core::credentials::{CredentialCache, FileTokenStore};
use twig_core::http_client::HttpClient;
use twig_core::prompt::SerializedPrompter;
use twig_core::sync::LockManager;
use twig_core::{
    find_project_root, load_config, logger, GithubRegistry, ProjectContext, PullOutcome, PullRequest,
    PushOutcome, PushRequest, SessionOptions, SyncSession, UpdatePolicy,
};

// ---- UI helpers (no-op when stdout isn't a TTY) ----

fn use_color() -> bool {
    std::io::stdout().is_terminal() && env::var("NO_COLOR").unwrap_or_default().is_empty()
}

fn success(msg: &str) {
    if use_color() {
        println!("{}", msg.green());
    } else {
        println!("{}", msg);
    }
}

fn error(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.red());
    } else {
        eprintln!("{}", msg);
    }
}

fn warning(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.yellow());
    } else {
        eprintln!("{}", msg);
    }
}

fn info(msg: &str) {
    if use_color() {
        println!("{}", msg.cyan());
    } else {
        println!("{}", msg);
    }
}

fn dim(msg: &str) {
    if use_color() {
        println!("{}", msg.dimmed());
    } else {
        println!("{}", msg);
    }
}

fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⠈⠐⠠⠰⠸⠹")
        .template("{spinner:.dim} {msg}")
    {
        bar.set_style(style);
    }
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

fn name_arg(help: &'static str) -> Arg {
    Arg::new("name").required(true).help(help)
}

fn cli() -> Command {
    Command::new("twig")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Decentralized utility manager: utilities versioned as branches of remote repositories")
        .after_help(
            "Examples:\n  twig init strings -d \"string helpers\"\n  twig pull acme/strings\n  twig pull\n  twig push strings\n  twig list-versions strings",
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Minimal output; show spinner when busy"),
        )
        .subcommand(
            Command::new("init")
                .about("Turn the current directory into a utility")
                .arg(name_arg("<name> or <owner>/<name>"))
                .arg(
                    Arg::new("description")
                        .short('d')
                        .long("description")
                        .default_value("")
                        .help("Utility description"),
                )
                .arg(
                    Arg::new("public")
                        .long("public")
                        .action(ArgAction::SetTrue)
                        .help("Create the remote repository as public"),
                ),
        )
        .subcommand(
            Command::new("pull")
                .about("Pull one utility, or every dependency declared in package.json")
                .arg(Arg::new("name").required(false).help("<name> or <owner>/<name>; omit to pull all"))
                .arg(
                    Arg::new("version")
                        .short('v')
                        .long("version")
                        .help("Exact version to pull (pins the fixed policy)"),
                )
                .arg(
                    Arg::new("force")
                        .short('f')
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Replace local copies that have unpublished changes"),
                )
                .arg(
                    Arg::new("keep-excess-utilities")
                        .short('k')
                        .long("keep-excess-utilities")
                        .action(ArgAction::SetTrue)
                        .help("Do not remove utilities no longer required"),
                ),
        )
        .subcommand(
            Command::new("push")
                .about("Publish one utility, or every utility in the project")
                .arg(Arg::new("name").required(false).help("Utility name; omit to push all")),
        )
        .subcommand(
            Command::new("check")
                .about("Recompute content hashes and report changes")
                .arg(Arg::new("name").required(false).help("Utility name; omit to check all")),
        )
        .subcommand(Command::new("list").about("List utilities in the project"))
        .subcommand(
            Command::new("list-versions")
                .about("List remote versions; the local one is bracketed")
                .arg(name_arg("<name> or <owner>/<name>")),
        )
        .subcommand(
            Command::new("hide")
                .about("Mark a utility private so pull and push skip it")
                .arg(name_arg("Utility name")),
        )
        .subcommand(
            Command::new("reveal")
                .about("Clear the private flag of a utility")
                .arg(name_arg("Utility name")),
        )
        .subcommand(
            Command::new("remove")
                .about("Delete a utility and its package.json entry")
                .arg(name_arg("Utility name")),
        )
        .subcommand(
            Command::new("delete-version")
                .about("Delete a published version")
                .arg(name_arg("<name> or <owner>/<name>"))
                .arg(Arg::new("version").required(true).help("Version to delete")),
        )
        .subcommand(Command::new("config").about("Add a default twig section to package.json"))
}

fn build_session(cwd: &Path, terminal: Arc<TerminalPrompter>) -> Result<SyncSession, String> {
    let root = find_project_root(cwd).map_err(|e| e.to_string())?;
    let cfg = load_config(&root);
    logger::init(&cfg.home);

    let locks = Arc::new(LockManager::new());
    let serialized = Arc::new(SerializedPrompter::new(terminal.clone(), Arc::clone(&locks)));
    let tokens = Arc::new(CredentialCache::new(
        cfg.token.clone(),
        Arc::new(FileTokenStore::new(&cfg.home)),
        serialized,
        Arc::clone(&locks),
    ));
    let registry = Arc::new(GithubRegistry::new(&cfg.api_url, HttpClient::from_config(&cfg), tokens));
    let context = ProjectContext::assemble(&root).map_err(|e| e.to_string())?;
    Ok(SyncSession::new(registry, terminal, locks, context, SessionOptions::from(&cfg)))
}

fn report_pull(name: &str, outcome: &PullOutcome) {
    match outcome {
        PullOutcome::Pulled(v) => success(&format!("Pulled {}@{}.", name, v)),
        PullOutcome::UpToDate(v) => dim(&format!("{} is up to date ({}).", name, v)),
        PullOutcome::NotFoundRemotely => warning(&format!("{} was not found remotely.", name)),
        PullOutcome::Private => dim(&format!("{} is private; skipped.", name)),
        PullOutcome::DivergedUnpublished(v) => {
            warning(&format!("{}@{} does not exist remotely; push it first.", name, v))
        }
        PullOutcome::DivergedAhead { local, remote } => warning(&format!(
            "{}: local {} is ahead of remote {}; push updates.",
            name, local, remote
        )),
        PullOutcome::LocalChanges { local, remote } => warning(&format!(
            "{}: local {} has unpublished changes; not replaced with {} (use --force).",
            name, local, remote
        )),
    }
}

fn report_push(name: &str, outcome: &PushOutcome) {
    match outcome {
        PushOutcome::Published(v) => success(&format!("Published {}@{}.", name, v)),
        PushOutcome::UpToDate(v) => dim(&format!("{} is up to date ({}).", name, v)),
        PushOutcome::Private => dim(&format!("{} is private; not uploaded.", name)),
        PushOutcome::RemoteAhead { local, remote } => warning(&format!(
            "{}: remote {} is ahead of local {}; pull first.",
            name, remote, local
        )),
        PushOutcome::ContentChangedWithoutBump(v) => warning(&format!(
            "{}: contents changed but version {} was not bumped.",
            name, v
        )),
    }
}

fn pull(session: &SyncSession, sub: &ArgMatches) -> Result<(), String> {
    let Some(name) = sub.get_one::<String>("name") else {
        let report = twig_core::pull_all(session, sub.get_flag("keep-excess-utilities"), sub.get_flag("force"))
            .map_err(|e| e.to_string())?;
        for removed in &report.removed {
            dim(&format!("Removed {} (no longer required).", removed));
        }
        for kept in &report.kept {
            warning(&format!("Kept {}: not required but could not be verified against the remote.", kept));
        }
        success("Pull done.");
        return Ok(());
    };

    let version = sub.get_one::<String>("version").cloned();
    let update_policy = if version.is_some() {
        UpdatePolicy::Fixed
    } else {
        let short = name.rsplit('/').next().unwrap_or(name);
        session
            .context()
            .manifest
            .dependency(short)
            .map(|d| d.update_policy)
            .unwrap_or_default()
    };
    let req = PullRequest {
        identifier: name.clone(),
        version,
        update_policy,
        main_dep: true,
        force: sub.get_flag("force"),
    };
    let outcome = twig_core::pull_utility(session, &req).map_err(|e| e.to_string())?;
    report_pull(name, &outcome);
    Ok(())
}

fn push(session: &SyncSession, sub: &ArgMatches) -> Result<(), String> {
    match sub.get_one::<String>("name") {
        Some(name) => {
            let outcome = twig_core::push_utility(session, &PushRequest::new(name)).map_err(|e| e.to_string())?;
            report_push(name, &outcome);
        }
        None => {
            let results = twig_core::push_all(session).map_err(|e| e.to_string())?;
            for (name, outcome) in &results {
                report_push(name, outcome);
            }
        }
    }
    Ok(())
}

fn check(session: &SyncSession, sub: &ArgMatches) -> Result<(), String> {
    let reports = match sub.get_one::<String>("name") {
        Some(name) => vec![commands::check(session, name).map_err(|e| e.to_string())?],
        None => commands::check_all(session).map_err(|e| e.to_string())?,
    };
    for r in &reports {
        if r.changed() {
            info(&format!("{}: hash updated", r.name));
        } else {
            dim(&format!("{}: no changes", r.name));
        }
    }
    Ok(())
}

fn run() -> Result<(), String> {
    let matches = cli().get_matches();
    let quiet = matches.get_flag("quiet");
    if quiet {
        env::set_var("TWIG_QUIET", "1");
    }

    let Some((command, sub)) = matches.subcommand() else {
        if use_color() {
            println!("{}", "twig".bright_cyan().bold());
        } else {
            println!("twig");
        }
        dim("Decentralized utility manager. Run `twig --help` for details.");
        return Ok(());
    };

    let cwd = env::current_dir().map_err(|e| format!("Cannot read current directory: {}", e))?;
    let terminal = Arc::new(TerminalPrompter::new());
    let session = build_session(&cwd, terminal.clone())?;

    let busy = if quiet && matches!(command, "pull" | "push") {
        let bar = spinner(if command == "pull" { "Pulling…" } else { "Pushing…" });
        terminal.attach(Some(bar.clone()));
        Some(bar)
    } else {
        None
    };

    let result = match command {
        "init" => {
            let name = sub.get_one::<String>("name").map(String::as_str).unwrap_or_default();
            let description = sub.get_one::<String>("description").map(String::as_str).unwrap_or_default();
            commands::init(&session, &cwd, name, description.trim(), sub.get_flag("public"))
                .map(|d| success(&format!("Initialized {}/{} at version {}.", d.owner, d.name, d.version)))
                .map_err(|e| e.to_string())
        }
        "pull" => pull(&session, sub),
        "push" => push(&session, sub),
        "check" => check(&session, sub),
        "list" => {
            let names = commands::list(&session);
            if names.is_empty() {
                dim("No utilities in this project.");
            }
            for name in names {
                println!("  {}", name);
            }
            Ok(())
        }
        "list-versions" => {
            let name = sub.get_one::<String>("name").map(String::as_str).unwrap_or_default();
            commands::list_versions(&session, name)
                .map(|versions| {
                    if versions.is_empty() {
                        dim(&format!("No remote versions of {}.", name));
                    }
                    for v in versions {
                        println!("  {}", v);
                    }
                })
                .map_err(|e| e.to_string())
        }
        "hide" | "reveal" => {
            let name = sub.get_one::<String>("name").map(String::as_str).unwrap_or_default();
            let changed = if command == "hide" {
                commands::hide(&session, name)
            } else {
                commands::reveal(&session, name)
            };
            changed
                .map(|changed| {
                    if changed {
                        success(&format!("{} is now {}.", name, if command == "hide" { "private" } else { "public" }));
                    } else {
                        dim("Nothing to change.");
                    }
                })
                .map_err(|e| e.to_string())
        }
        "remove" => {
            let name = sub.get_one::<String>("name").map(String::as_str).unwrap_or_default();
            commands::remove(&session, name)
                .map(|()| success(&format!("Removed {}.", name)))
                .map_err(|e| e.to_string())
        }
        "delete-version" => {
            let name = sub.get_one::<String>("name").map(String::as_str).unwrap_or_default();
            let version = sub.get_one::<String>("version").map(String::as_str).unwrap_or_default();
            twig_core::delete_version(&session, name, version)
                .map(|()| success(&format!("Deleted {}@{}.", name, version)))
                .map_err(|e| e.to_string())
        }
        "config" => commands::config(&session)
            .map(|added| {
                if added {
                    success("Added twig section to package.json.");
                } else {
                    dim("package.json already has a twig section.");
                }
            })
            .map_err(|e| e.to_string()),
        other => Err(format!("Unknown command: {}", other)),
    };

    if let Some(bar) = busy {
        terminal.attach(None);
        bar.finish_and_clear();
    }
    result?;
    session.save_manifest().map_err(|e| e.to_string())?;
    Ok(())
}

fn main() {
    if !use_color() {
        colored::control::set_override(false);
    }

    let code = match std::panic::catch_unwind(run) {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            error(&e);
            1
        }
        Err(_) => {
            error("An unexpected error occurred. Please report this issue.");
            1
        }
    };
    std::process::exit(code);
}

//! Pull engine end to end against the in-memory registry.

mod common;

use std::fs;
use std::sync::Arc;

use common::{Fixture, OWNER};
use twig_core::prompt::Scripted;
use twig_core::descriptor::{UpdatePolicy, UtilityDescriptor};
use twig_core::{pull_all, pull_utility, PullOutcome, PullRequest, Version};

const V1: &[(&str, &str)] = &[("index.ts", "export const v = 1;\n")];
const V2: &[(&str, &str)] = &[("index.ts", "export const v = 2;\n")];
const V3: &[(&str, &str)] = &[("index.ts", "export const v = 3;\n"), ("lib/extra.ts", "x\n")];

fn v(s: &str) -> Version {
    Version::parse(s).unwrap()
}

#[test]
fn test_minor_policy_upgrades_within_major() {
    let fx = Fixture::new(&[]);
    fx.remote("strings", "1.0.0", V1, &[]);
    fx.remote("strings", "1.1.0", V2, &[]);
    fx.remote("strings", "2.0.0", V3, &[]);
    fx.local("strings", "1.0.0", V1, &[]);

    let session = fx.session();
    let outcome = pull_utility(&session, &PullRequest::new("strings")).unwrap();
    assert_eq!(outcome, PullOutcome::Pulled(v("1.1.0")));

    let dir = fx.utility_dir("strings");
    assert_eq!(UtilityDescriptor::load(&dir).unwrap().version, "1.1.0");
    assert_eq!(fs::read_to_string(dir.join("index.ts")).unwrap(), V2[0].1);

    session.save_manifest().unwrap();
    let manifest = fx.manifest_text();
    assert!(manifest.contains("\"strings\""));
    assert!(manifest.contains("1.1.0"));
}

#[test]
fn test_major_policy_takes_latest() {
    let fx = Fixture::new(&[]);
    fx.remote("strings", "1.0.0", V1, &[]);
    fx.remote("strings", "2.0.0", V3, &[]);
    fx.local("strings", "1.0.0", V1, &[]);

    let mut req = PullRequest::new("strings");
    req.update_policy = UpdatePolicy::Major;
    let outcome = pull_utility(&fx.session(), &req).unwrap();
    assert_eq!(outcome, PullOutcome::Pulled(v("2.0.0")));
    assert!(fx.utility_dir("strings").join("lib/extra.ts").is_file());
}

#[test]
fn test_local_ahead_is_left_alone() {
    let fx = Fixture::new(&[]);
    fx.remote("strings", "1.9.0", V1, &[]);
    fx.local("strings", "2.0.0", V2, &[]);
    let before = fs::read_to_string(fx.utility_dir("strings").join("utils.json")).unwrap();

    let outcome = pull_utility(&fx.session(), &PullRequest::new("strings")).unwrap();
    assert_eq!(
        outcome,
        PullOutcome::DivergedAhead {
            local: v("2.0.0"),
            remote: v("1.9.0")
        }
    );
    assert_eq!(fs::read_to_string(fx.utility_dir("strings").join("utils.json")).unwrap(), before);
    assert_eq!(fx.registry.download_count(), 0);
}

#[test]
fn test_unpublished_local_version() {
    let fx = Fixture::new(&[]);
    fx.remote("strings", "1.0.0", V1, &[]);
    fx.remote("strings", "1.2.0", V1, &[]);
    fx.local("strings", "1.1.0", V2, &[]);

    let outcome = pull_utility(&fx.session(), &PullRequest::new("strings")).unwrap();
    assert_eq!(outcome, PullOutcome::DivergedUnpublished(v("1.1.0")));
}

#[test]
fn test_up_to_date_twice_touches_nothing() {
    let fx = Fixture::new(&[("strings", "1.1.0")]);
    fx.remote("strings", "1.0.0", V1, &[]);
    fx.remote("strings", "1.1.0", V2, &[]);
    fx.local("strings", "1.1.0", V2, &[]);
    let manifest = fx.manifest_text();
    let descriptor = fs::read_to_string(fx.utility_dir("strings").join("utils.json")).unwrap();

    for _ in 0..2 {
        let session = fx.session();
        let outcome = pull_utility(&session, &PullRequest::new("strings")).unwrap();
        assert_eq!(outcome, PullOutcome::UpToDate(v("1.1.0")));
        assert!(!session.save_manifest().unwrap());
    }
    assert_eq!(fx.manifest_text(), manifest);
    assert_eq!(
        fs::read_to_string(fx.utility_dir("strings").join("utils.json")).unwrap(),
        descriptor
    );
    assert_eq!(fx.registry.download_count(), 0);
}

#[test]
fn test_not_found_remotely() {
    let fx = Fixture::new(&[]);
    let outcome = pull_utility(&fx.session(), &PullRequest::new("acme/ghosts")).unwrap();
    assert_eq!(outcome, PullOutcome::NotFoundRemotely);
    assert!(!fx.utility_dir("ghosts").exists());
}

#[test]
fn test_private_utility_is_skipped() {
    let fx = Fixture::new(&[]);
    fx.remote("strings", "1.1.0", V2, &[]);
    let mut d = fx.local("strings", "1.0.0", V1, &[]);
    d.private = true;
    d.save(&fx.utility_dir("strings")).unwrap();

    let outcome = pull_utility(&fx.session(), &PullRequest::new("strings")).unwrap();
    assert_eq!(outcome, PullOutcome::Private);
    assert_eq!(fx.registry.download_count(), 0);
}

#[test]
fn test_fixed_version_moves_backwards_and_rejects_missing() {
    let fx = Fixture::new(&[]);
    fx.remote("strings", "1.0.0", V1, &[]);
    fx.remote("strings", "1.1.0", V2, &[]);
    fx.local("strings", "1.1.0", V2, &[]);

    let mut req = PullRequest::new("strings");
    req.update_policy = UpdatePolicy::Fixed;
    req.version = Some("1.0.0".into());
    let session = fx.session();
    assert_eq!(pull_utility(&session, &req).unwrap(), PullOutcome::Pulled(v("1.0.0")));
    assert_eq!(UtilityDescriptor::load(&fx.utility_dir("strings")).unwrap().version, "1.0.0");

    req.version = Some("3.0.0".into());
    assert!(pull_utility(&fx.session(), &req).unwrap_err().is_not_found());
}

#[test]
fn test_local_changes_need_force() {
    let fx = Fixture::new(&[]);
    fx.remote("strings", "1.0.0", V1, &[]);
    fx.remote("strings", "1.1.0", V2, &[]);
    fx.local("strings", "1.0.0", V1, &[]);
    let edited = fx.utility_dir("strings").join("index.ts");
    fs::write(&edited, "// local edit\n").unwrap();

    let outcome = pull_utility(&fx.session(), &PullRequest::new("strings")).unwrap();
    assert_eq!(
        outcome,
        PullOutcome::LocalChanges {
            local: v("1.0.0"),
            remote: v("1.1.0")
        }
    );
    assert_eq!(fs::read_to_string(&edited).unwrap(), "// local edit\n");

    let mut req = PullRequest::new("strings");
    req.force = true;
    assert_eq!(pull_utility(&fx.session(), &req).unwrap(), PullOutcome::Pulled(v("1.1.0")));
    assert_eq!(fs::read_to_string(&edited).unwrap(), V2[0].1);
}

#[test]
fn test_diamond_dependency_fetched_once() {
    let fx = Fixture::new(&[("alpha", "1.0.0"), ("bravo", "1.0.0")]);
    fx.remote("alpha", "1.0.0", V1, &[("shared", "1.0.0")]);
    fx.remote("bravo", "1.0.0", V1, &[("shared", "1.0.0")]);
    fx.remote("shared", "1.0.0", V1, &[]);

    let session = fx.session();
    let report = pull_all(&session, false, false).unwrap();
    assert!(report.removed.is_empty());
    assert_eq!(fx.registry.download_count(), 3);
    for name in ["alpha", "bravo", "shared"] {
        assert!(fx.utility_dir(name).join("utils.json").is_file(), "{}", name);
    }

    // transitive dependencies are not promoted into the manifest
    session.save_manifest().unwrap();
    assert!(!fx.manifest_text().contains("\"shared\""));
}

#[test]
fn test_pull_all_removes_only_verified_excess() {
    let fx = Fixture::new(&[("alpha", "1.0.0")]);
    fx.remote("alpha", "1.0.0", V1, &[]);
    fx.remote("stale", "1.0.0", V1, &[]);
    fx.remote("edited", "1.0.0", V1, &[]);
    fx.local("alpha", "1.0.0", V1, &[]);
    fx.local("stale", "1.0.0", V1, &[]);
    fx.local("edited", "1.0.0", V1, &[]);
    fs::write(fx.utility_dir("edited").join("index.ts"), "changed\n").unwrap();
    fx.local("draft", "0.1.0", V1, &[]);

    let report = pull_all(&fx.session(), false, false).unwrap();
    assert_eq!(report.removed, vec!["stale".to_string()]);
    assert_eq!(report.kept, vec!["draft".to_string(), "edited".to_string()]);
    assert!(!fx.utility_dir("stale").exists());
    assert!(fx.utility_dir("edited").exists());
    assert!(fx.utility_dir("draft").exists());
    assert!(fx.utility_dir("alpha").exists());
}

#[test]
fn test_pull_all_keep_excess() {
    let fx = Fixture::new(&[]);
    fx.remote("stale", "1.0.0", V1, &[]);
    fx.local("stale", "1.0.0", V1, &[]);

    let report = pull_all(&fx.session(), true, false).unwrap();
    assert!(report.removed.is_empty());
    assert!(fx.utility_dir("stale").exists());
}

#[test]
fn test_downloaded_descriptor_gets_owner() {
    let fx = Fixture::new(&[]);
    let scratch = tempfile::tempdir().unwrap();
    fs::write(scratch.path().join("index.ts"), "1").unwrap();
    let mut d = UtilityDescriptor::new("ownerless", "", "1.0.0");
    d.hash = twig_core::hash::hash_utility(scratch.path()).unwrap();
    let encoded = serde_json::to_vec(&d).unwrap();
    fx.registry.publish(
        OWNER,
        "ownerless",
        "1.0.0",
        &[("index.ts", &b"1"[..]), ("utils.json", encoded.as_slice())],
    );

    let outcome = pull_utility(&fx.session(), &PullRequest::new("ownerless")).unwrap();
    assert_eq!(outcome, PullOutcome::Pulled(v("1.0.0")));
    assert_eq!(UtilityDescriptor::load(&fx.utility_dir("ownerless")).unwrap().owner, OWNER);
}

#[test]
fn test_pull_all_force_reaches_declared_dependencies() {
    let fx = Fixture::new(&[("strings", "1.0.0")]);
    fx.remote("strings", "1.0.0", V1, &[]);
    fx.remote("strings", "1.1.0", V2, &[]);
    fx.local("strings", "1.0.0", V1, &[]);
    let edited = fx.utility_dir("strings").join("index.ts");
    fs::write(&edited, "// local edit\n").unwrap();

    pull_all(&fx.session(), true, false).unwrap();
    assert_eq!(fs::read_to_string(&edited).unwrap(), "// local edit\n");
    assert_eq!(fx.registry.download_count(), 0);

    pull_all(&fx.session(), true, true).unwrap();
    assert_eq!(fs::read_to_string(&edited).unwrap(), V2[0].1);
    assert_eq!(UtilityDescriptor::load(&fx.utility_dir("strings")).unwrap().version, "1.1.0");
}

#[test]
fn test_owner_switch_replaces_edited_copy() {
    let fx = Fixture::new(&[]);
    fx.remote("strings", "1.0.0", V1, &[]);
    fx.remote_as("forker", "strings", "1.0.0", V3, &[]);
    fx.local("strings", "1.0.0", V1, &[]);
    let edited = fx.utility_dir("strings").join("index.ts");
    fs::write(&edited, "// local edit\n").unwrap();

    let declined = fx.session_with(Arc::new(Scripted::new(["n"])), Some(OWNER));
    let outcome = pull_utility(&declined, &PullRequest::new("forker/strings")).unwrap();
    assert_eq!(outcome, PullOutcome::UpToDate(v("1.0.0")));
    assert_eq!(fs::read_to_string(&edited).unwrap(), "// local edit\n");

    // accepting the new owner skips the local-changes guard
    let accepted = fx.session_with(Arc::new(Scripted::new(["y"])), Some(OWNER));
    let outcome = pull_utility(&accepted, &PullRequest::new("forker/strings")).unwrap();
    assert_eq!(outcome, PullOutcome::Pulled(v("1.0.0")));
    assert_eq!(fs::read_to_string(&edited).unwrap(), V3[0].1);
    assert!(fx.utility_dir("strings").join("lib/extra.ts").is_file());
    assert_eq!(UtilityDescriptor::load(&fx.utility_dir("strings")).unwrap().owner, "forker");

    accepted.save_manifest().unwrap();
    assert!(fx.manifest_text().contains("\"forker\""));
}

#[test]
fn test_batched_upgrades_of_many_utilities() {
    let names: Vec<String> = (0..16).map(|i| format!("util{:02}", i)).collect();
    let old: Vec<(String, String)> = (0..80)
        .map(|i| (format!("d{}/f{}.ts", i % 8, i), format!("export const v{} = 1;\n", i)))
        .collect();
    let new: Vec<(String, String)> = old
        .iter()
        .map(|(path, content)| (path.clone(), content.replace("= 1", "= 2")))
        .collect();
    let old: Vec<(&str, &str)> = old.iter().map(|(p, c)| (p.as_str(), c.as_str())).collect();
    let new: Vec<(&str, &str)> = new.iter().map(|(p, c)| (p.as_str(), c.as_str())).collect();
    let declared: Vec<(&str, &str)> = names.iter().map(|n| (n.as_str(), "1.0.0")).collect();

    for round in 0..5 {
        let fx = Fixture::new(&declared);
        for name in &names {
            fx.remote(name, "1.0.0", &old, &[]);
            fx.remote(name, "1.1.0", &new, &[]);
            fx.local(name, "1.0.0", &old, &[]);
        }

        let session = fx.session();
        let report = pull_all(&session, false, false).unwrap_or_else(|e| panic!("round {}: {}", round, e));
        assert!(report.removed.is_empty());
        assert_eq!(fx.registry.download_count(), names.len());
        assert_eq!(session.context().names().len(), names.len());
        for name in &names {
            let dir = fx.utility_dir(name);
            assert_eq!(UtilityDescriptor::load(&dir).unwrap().version, "1.1.0", "{}", name);
            assert_eq!(fs::read_to_string(dir.join("d3/f3.ts")).unwrap(), "export const v3 = 2;\n");
        }
    }
}

//! Expansion of a declared dependency map into its transitive closure over
//! the utilities present in the project.

use crate::descriptor::DependencyMap;
use crate::project::ProjectContext;

/// For each entry, in declaration order: record it, then if that utility
/// exists locally merge in the closure of its own deps (minus a self
/// reference). Later merges overwrite earlier entries of the same name.
pub fn collect_dependencies_list(ctx: &ProjectContext, declared: &DependencyMap) -> DependencyMap {
    let mut chain = Vec::new();
    expand(ctx, declared, &mut chain)
}

fn expand(ctx: &ProjectContext, list: &DependencyMap, chain: &mut Vec<String>) -> DependencyMap {
    let mut deps = DependencyMap::new();
    for (name, dep) in list {
        deps.insert(name.clone(), dep.clone());
        if on_chain(chain, name) {
            continue;
        }
        let Some(utility) = ctx.select_utility_by_name(name) else {
            continue;
        };
        let own: DependencyMap = utility
            .descriptor
            .deps
            .iter()
            .filter(|(sub, _)| *sub != name)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        chain.push(name.clone());
        let sub = expand(ctx, &own, chain);
        chain.pop();
        deps.extend(sub);
    }
    deps
}

/// Cycle stop on top of the self-reference filter: a name already being
/// expanded higher up the current chain is recorded but not expanded again,
/// so `a -> b -> c -> a` terminates.
fn on_chain(chain: &[String], name: &str) -> bool {
    chain.iter().any(|n| n == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{DependencyDescription, UpdatePolicy, UtilityDescriptor};
    use std::path::Path;

    fn dep(name: &str, version: &str) -> DependencyDescription {
        DependencyDescription {
            owner: "acme".into(),
            repo: name.into(),
            version: version.into(),
            update_policy: UpdatePolicy::Minor,
        }
    }

    fn utility(root: &Path, name: &str, deps: &[(&str, &str)]) {
        let dir = root.join("utils").join(name);
        std::fs::create_dir_all(&dir).unwrap();
        let mut d = UtilityDescriptor::new(name, "acme", "1.0.0");
        for (n, v) in deps {
            d.deps.insert(n.to_string(), dep(n, v));
        }
        d.save(&dir).unwrap();
    }

    fn context(build: impl FnOnce(&Path)) -> (tempfile::TempDir, ProjectContext) {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("package.json"), "{}").unwrap();
        build(tmp.path());
        let ctx = ProjectContext::assemble(tmp.path()).unwrap();
        (tmp, ctx)
    }

    fn declared(entries: &[(&str, &str)]) -> DependencyMap {
        entries.iter().map(|(n, v)| (n.to_string(), dep(n, v))).collect()
    }

    #[test]
    fn test_diamond_is_deduplicated() {
        let (_tmp, ctx) = context(|root| {
            utility(root, "alpha", &[("shared", "1.0.0")]);
            utility(root, "bravo", &[("shared", "1.2.0")]);
            utility(root, "shared", &[]);
        });
        let all = collect_dependencies_list(&ctx, &declared(&[("alpha", "1.0.0"), ("bravo", "1.0.0")]));
        let names: Vec<_> = all.keys().cloned().collect();
        assert_eq!(names, vec!["alpha", "shared", "bravo"]);
        // bravo is expanded after alpha, so its requirement wins
        assert_eq!(all["shared"].version, "1.2.0");
        assert_eq!(collect_dependencies_list(&ctx, &all), all);
    }

    #[test]
    fn test_declaration_order_decides_overwrites() {
        let (_tmp, ctx) = context(|root| {
            utility(root, "alpha", &[("shared", "1.0.0")]);
            utility(root, "bravo", &[("shared", "1.2.0")]);
            utility(root, "shared", &[]);
        });
        // not sorted by name: alpha is expanded last and wins
        let all = collect_dependencies_list(&ctx, &declared(&[("bravo", "1.0.0"), ("alpha", "1.0.0")]));
        assert_eq!(all["shared"].version, "1.0.0");
        let names: Vec<_> = all.keys().cloned().collect();
        assert_eq!(names, vec!["bravo", "shared", "alpha"]);
    }

    #[test]
    fn test_self_reference_ignored_and_declared_entry_overwritten_by_child() {
        let (_tmp, ctx) = context(|root| {
            utility(root, "alpha", &[("alpha", "9.9.9"), ("zulu1", "2.0.0")]);
        });
        let all = collect_dependencies_list(&ctx, &declared(&[("alpha", "1.0.0"), ("zulu1", "1.0.0")]));
        assert_eq!(all["alpha"].version, "1.0.0");
        // zulu1 is iterated after alpha's expansion merged it, so the declared entry wins
        assert_eq!(all["zulu1"].version, "1.0.0");
    }

    #[test]
    fn test_missing_local_utilities_are_leaves() {
        let (_tmp, ctx) = context(|_| {});
        let all = collect_dependencies_list(&ctx, &declared(&[("remote-only", "1.0.0")]));
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn test_three_way_cycle_terminates() {
        let (_tmp, ctx) = context(|root| {
            utility(root, "alpha", &[("bravo", "1.0.0")]);
            utility(root, "bravo", &[("charlie", "1.0.0")]);
            utility(root, "charlie", &[("alpha", "1.0.0")]);
        });
        let all = collect_dependencies_list(&ctx, &declared(&[("alpha", "1.0.0")]));
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_chain_membership() {
        let chain = vec!["alpha".to_string(), "bravo".to_string()];
        assert!(on_chain(&chain, "bravo"));
        assert!(!on_chain(&chain, "charlie"));
        assert!(!on_chain(&[], "alpha"));
    }
}

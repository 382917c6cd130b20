use std::collections::{HashMap, HashSet, VecDeque};

use anyhow::{Context, Result};
use cargo_metadata::{MetadataCommand, PackageId};

/// Each leaf crate and the workspace crates it must never reach, directly or
/// transitively.
const RULES: &[(&str, &[&str])] = &[
    (
        "swiftclaim-contracts",
        &[
            "swiftclaim-auth",
            "swiftclaim-store",
            "swiftclaim-chain",
            "swiftclaim-server",
        ],
    ),
    (
        "swiftclaim-auth",
        &["swiftclaim-store", "swiftclaim-chain", "swiftclaim-server"],
    ),
    ("swiftclaim-store", &["swiftclaim-chain", "swiftclaim-server"]),
    ("swiftclaim-chain", &["swiftclaim-store", "swiftclaim-server"]),
];

fn main() -> Result<()> {
    let metadata = MetadataCommand::new()
        .exec()
        .context("failed to run `cargo metadata`")?;

    let resolve = metadata
        .resolve
        .as_ref()
        .context("`cargo metadata` did not include a resolved dependency graph")?;

    let id_to_name: HashMap<_, _> = metadata
        .packages
        .iter()
        .map(|p| (p.id.clone(), p.name.as_str()))
        .collect();

    let adjacency: HashMap<_, _> = resolve
        .nodes
        .iter()
        .map(|node| {
            let deps: Vec<_> = node.deps.iter().map(|dep| dep.pkg.clone()).collect();
            (node.id.clone(), deps)
        })
        .collect();

    let mut failed = false;

    for (package_name, forbidden) in RULES {
        let package = metadata
            .packages
            .iter()
            .find(|p| p.name == *package_name)
            .with_context(|| format!("package `{}` not found in workspace", package_name))?;

        let violations = forbidden_reachable(&package.id, forbidden, &adjacency, &id_to_name);

        if violations.is_empty() {
            println!(
                "OK: `{}` has no dependency edge to {}",
                package_name,
                forbidden.join(", ")
            );
        } else {
            eprintln!(
                "FAIL: `{}` depends on forbidden crate(s): {}",
                package_name,
                violations.join(", ")
            );
            failed = true;
        }
    }

    if failed {
        std::process::exit(1);
    }

    Ok(())
}

fn forbidden_reachable(
    root: &PackageId,
    forbidden: &[&str],
    adjacency: &HashMap<PackageId, Vec<PackageId>>,
    id_to_name: &HashMap<PackageId, &str>,
) -> Vec<String> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(root.clone());
    visited.insert(root.clone());

    let mut violations = Vec::new();

    while let Some(current) = queue.pop_front() {
        let Some(deps) = adjacency.get(&current) else {
            continue;
        };

        for dep in deps.iter().cloned() {
            if !visited.insert(dep.clone()) {
                continue;
            }

            if let Some(name) = id_to_name.get(&dep)
                && forbidden.contains(name)
            {
                violations.push((*name).to_string());
            }

            queue.push_back(dep);
        }
    }

    violations.sort();
    violations.dedup();
    violations
}

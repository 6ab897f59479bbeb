//! Named actions and resolvers available to tree definitions loaded by the
//! binary, plus the tree shown when no definition is given.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::BoxError;
use crate::tree::{Node, Registry, Resolver, Tree};
use crate::validate::MAX_ENTRIES;

pub fn registry() -> Registry {
    let mut registry = Registry::new();
    registry
        .register_action("log", || log::info!("builtin: log action selected"))
        .register_resolver("cwd", Resolver::new(list_current_dir))
        .register_resolver("env", Resolver::from_sync(list_env))
        .register_resolver(
            "slow",
            Resolver::new(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok(numbered("result", 5))
            }),
        )
        .register_resolver("offline", Resolver::from_sync(|| Err("host unreachable".into())));

    let calls = Arc::new(AtomicUsize::new(0));
    registry.register_resolver(
        "flaky",
        Resolver::from_sync(move || {
            // Fails twice, then succeeds
            if calls.fetch_add(1, Ordering::SeqCst) % 3 < 2 {
                Err("temporary failure".into())
            } else {
                Ok(numbered("attempt", 3))
            }
        }),
    );
    registry
}

/// The tree used when no tree file is given
pub fn demo_tree() -> Value {
    json!({
        "files": { "type": "virtual", "resolver": "cwd" },
        "environment": { "type": "virtual", "resolver": "env" },
        "settings": {
            "name": { "type": "input", "storageKey": "demo.name", "defaultValue": "anonymous" },
            "email": { "type": "input" },
            "log something": "log"
        },
        "network": {
            "slow": { "type": "virtual", "resolver": "slow" },
            "flaky": { "type": "virtual", "resolver": "flaky" },
            "offline": { "type": "virtual", "resolver": "offline" }
        },
        "about": null
    })
}

fn numbered(prefix: &str, count: usize) -> Tree {
    let mut tree = Tree::new();
    for i in 1..=count {
        tree.insert(Node::noop(format!("{} {}", prefix, i)));
    }
    tree
}

async fn list_current_dir() -> Result<Tree, BoxError> {
    let mut entries = tokio::fs::read_dir(".").await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with('.') {
            names.push(name);
        }
    }
    names.sort();
    Ok(names
        .into_iter()
        .take(MAX_ENTRIES)
        .fold(Tree::new(), |tree, name| tree.with(Node::noop(name))))
}

fn list_env() -> Result<Tree, BoxError> {
    let mut names: Vec<String> = std::env::vars().map(|(name, _)| name).collect();
    names.sort();
    Ok(names
        .into_iter()
        .take(MAX_ENTRIES)
        .fold(Tree::new(), |tree, name| tree.with(Node::noop(name))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::build_tree;
    use crate::validate::validate;

    #[test]
    fn test_demo_tree_is_valid() {
        let tree = build_tree(&demo_tree(), &registry()).unwrap();
        let report = validate(&tree);
        assert!(report.is_valid(), "{}", report);
        assert_eq!(tree.stats().virtual_directories, 5);
    }

    #[tokio::test]
    async fn test_flaky_resolver_recovers_on_third_call() {
        let resolver = registry().resolver("flaky").unwrap();
        assert!(resolver.resolve().await.is_err());
        assert!(resolver.resolve().await.is_err());
        assert_eq!(resolver.resolve().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_directory_listing_respects_limit() {
        let resolver = registry().resolver("cwd").unwrap();
        let tree = resolver.resolve().await.unwrap();
        assert!(tree.len() <= MAX_ENTRIES);
    }
}

//! Structural checks run whenever a tree enters the system, either at
//! construction or when a virtual directory resolves.

use serde::Serialize;
use std::fmt;

use crate::error::{KeytreeError, Result};
use crate::tree::{Invoke, NodeKind, Resolve, Tree};

/// Maximum number of entries a single directory may hold
pub const MAX_ENTRIES: usize = 23;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// `/`-joined location of the offending directory or node; empty for the root
    pub path: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "<root>: {}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.errors.iter().map(|e| e.to_string()).collect();
        f.write_str(&messages.join("; "))
    }
}

/// Check every directory of `tree` and collect all violations
pub fn validate(tree: &Tree) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut path = Vec::new();
    check_tree(tree, &mut path, &mut report);
    report
}

/// Like [`validate`], but fails with every message joined together
pub fn validate_strict(tree: &Tree) -> Result<()> {
    let report = validate(tree);
    if report.is_valid() {
        Ok(())
    } else {
        Err(KeytreeError::Validation(report))
    }
}

fn check_tree(tree: &Tree, path: &mut Vec<String>, report: &mut ValidationReport) {
    if tree.len() > MAX_ENTRIES {
        report.errors.push(ValidationIssue {
            path: path.join("/"),
            message: format!(
                "directory has {} entries; at most {} are allowed",
                tree.len(),
                MAX_ENTRIES
            ),
        });
    }

    for (key, node) in tree.iter() {
        path.push(key.clone());
        let here = path.join("/");

        if *key != node.name {
            report.errors.push(ValidationIssue {
                path: here.clone(),
                message: format!("key \"{}\" does not match node name \"{}\"", key, node.name),
            });
        }

        match &node.kind {
            NodeKind::Directory { children } => check_tree(children, path, report),
            NodeKind::Action {
                invoke: Some(Invoke::Unbound(raw)),
            } => report.errors.push(ValidationIssue {
                path: here,
                message: format!("action invoke is not callable (got {})", raw),
            }),
            NodeKind::Action { .. } => {}
            NodeKind::Input {
                storage_key: Some(storage_key),
                ..
            } if storage_key.trim().is_empty() => report.errors.push(ValidationIssue {
                path: here,
                message: "input storage key must be a non-empty string".to_string(),
            }),
            NodeKind::Input { .. } => {}
            NodeKind::VirtualDirectory {
                resolve: Resolve::Unbound(raw),
            } => report.errors.push(ValidationIssue {
                path: here,
                message: format!("virtual directory resolver is not callable (got {})", raw),
            }),
            NodeKind::VirtualDirectory { .. } => {}
        }

        path.pop();
    }
}

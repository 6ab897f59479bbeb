// Library module containing testable functions from main.rs

use serde::Serialize;
use std::fs;
use std::sync::Arc;

use crate::async_task::TaskResult;
use crate::builtins;
use crate::command::parse_script;
use crate::config::Config;
use crate::error::{KeytreeError, Result};
use crate::navigator::{NavigatorViewModel, ResultView};
use crate::overlay::Overlay;
use crate::search::search;
use crate::storage::{MemoryStore, Preferences};
use crate::surface::HeadlessSurface;
use crate::tree::{build_tree, Tree, TreeStats};
use crate::validate::{validate, ValidationReport};

pub fn handle_task_result(overlay: &mut Overlay, result: TaskResult) {
    match result {
        TaskResult::DirectoryResolved(completion) => {
            // Completions for abandoned requests are dropped by the navigator
            overlay.finish_load(completion);
        }
    }
}

/// Read a JSON tree definition, or the demo tree when `path` is `None`
pub fn load_tree(path: Option<&str>) -> Result<Tree> {
    let raw = match path {
        Some(path) => {
            let content = fs::read_to_string(path)
                .map_err(|e| KeytreeError::Build(format!("{}: {}", path, e)))?;
            serde_json::from_str(&content)?
        }
        None => builtins::demo_tree(),
    };
    build_tree(&raw, &builtins::registry())
}

pub fn load_config(path: Option<&str>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => Ok(Config::load()),
    }
}

/// Mount `tree` headlessly, replay `script` and return the final view
pub async fn execute_script(tree: Tree, config: &Config, script: &str) -> Result<NavigatorViewModel> {
    let commands = parse_script(script).map_err(KeytreeError::Generic)?;
    let prefs = Preferences::new(Arc::new(MemoryStore::new()));
    let mut overlay = Overlay::new(tree, prefs, config)?;
    overlay.mount(Box::new(HeadlessSurface::new()))?;

    for command in &commands {
        log::debug!("execute: {}", command);
        for key in command.keys() {
            match key {
                Some(key) => overlay.press(key).await,
                None => {
                    overlay.activate();
                }
            }
        }
    }

    let view = overlay.view_model().clone();
    overlay.unmount()?;
    Ok(view)
}

pub async fn execute_command(
    tree_path: Option<&str>,
    config: &Config,
    script: &str,
    output_path: Option<&str>,
    generate_screenshot: bool,
    width: u16,
    height: u16,
) -> Result<()> {
    let tree = load_tree(tree_path)?;
    let view = execute_script(tree, config, script).await?;
    let result_json = serde_json::to_string_pretty(&view)?;

    match output_path {
        Some(path) => {
            fs::write(path, &result_json)?;
            println!("Result saved to: {}", path);
        }
        None => println!("{}", result_json),
    }

    if let Some(message) = &view.message {
        eprintln!("Status: {}", message);
    }

    if generate_screenshot {
        let theme = crate::theme::Theme::default();
        print!("{}", crate::ui::render_to_string(&view, &theme, width, height)?);
    }

    Ok(())
}

/// Rank the leaves of `tree` against `query`
pub fn search_tree(tree: &Tree, query: &str, config: &Config, limit: Option<usize>) -> Vec<ResultView> {
    let mut options = config.search.clone();
    if let Some(limit) = limit {
        options.max_results = limit;
    }
    search(&tree.flatten(), query, &options)
        .into_iter()
        .map(|result| ResultView {
            path: result.node.full_path.clone(),
            name: result.node.name().to_string(),
            score: result.score,
            node_type: result.node.node.node_type(),
        })
        .collect()
}

pub fn search_command(tree_path: Option<&str>, query: &str, config: &Config, limit: Option<usize>) -> Result<()> {
    let tree = load_tree(tree_path)?;
    let results = search_tree(&tree, query, config, limit);
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct ValidationSummary {
    pub valid: bool,
    pub errors: Vec<String>,
    pub stats: TreeStats,
}

impl ValidationSummary {
    pub fn new(tree: &Tree, report: &ValidationReport) -> Self {
        Self {
            valid: report.is_valid(),
            errors: report.errors.iter().map(|issue| issue.to_string()).collect(),
            stats: tree.stats(),
        }
    }
}

/// Print the validation summary; returns whether the tree is valid
pub fn validate_command(tree_path: Option<&str>) -> Result<bool> {
    let tree = load_tree(tree_path)?;
    let summary = ValidationSummary::new(&tree, &validate(&tree));
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(summary.valid)
}

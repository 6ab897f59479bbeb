//! Component-level settings, kept out of the browsable tree but reachable
//! from the command palette under the `@meta/` prefix.

use crate::storage::{Preferences, ThemePreference};
use crate::tree::{Node, Tree};

/// Reserved first path segment of meta entries
pub const META_NAMESPACE: &str = "@meta";

/// Whether a search path lives under the meta namespace
pub fn is_meta_path<S: AsRef<str>>(segments: &[S]) -> bool {
    segments
        .first()
        .map_or(false, |first| first.as_ref() == META_NAMESPACE)
}

/// Actions that edit `prefs`
pub fn meta_tree(prefs: &Preferences) -> Tree {
    let mut themes = Tree::new();
    for theme in [
        ThemePreference::Light,
        ThemePreference::Dark,
        ThemePreference::System,
    ] {
        let prefs = prefs.clone();
        themes.insert(Node::action(theme.to_string(), move || {
            if let Err(e) = prefs.set_theme(theme) {
                log::warn!("meta: could not switch theme to {}: {}", theme, e);
            }
        }));
    }

    let prefs = prefs.clone();
    Tree::new()
        .with(Node::directory("theme", themes))
        .with(Node::action("reset-window-position", move || {
            if let Err(e) = prefs.reset_window_geometry() {
                log::warn!("meta: could not reset window position: {}", e);
            }
        }))
}

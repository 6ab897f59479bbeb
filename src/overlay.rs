//! The overlay as a host sees it: a navigator plus visibility, a mounted
//! surface, a directory loader and persisted preferences.

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::keys::Key;
use crate::loader::DirectoryLoader;
use crate::meta::meta_tree;
use crate::navigator::{
    Effect, LoadCompletion, LoadRequest, Navigator, NavigatorSettings, NavigatorViewModel, Transition,
};
use crate::storage::Preferences;
use crate::surface::Surface;
use crate::tree::Tree;
use crate::validate::validate_strict;

/// What the global hotkey did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Shown,
    Hidden,
    Focused,
}

pub struct Overlay {
    navigator: Navigator,
    loader: Arc<DirectoryLoader>,
    prefs: Preferences,
    surface: Option<Box<dyn Surface>>,
    visible: bool,
}

impl std::fmt::Debug for Overlay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Overlay")
            .field("visible", &self.visible)
            .field("has_surface", &self.surface.is_some())
            .finish_non_exhaustive()
    }
}

impl Overlay {
    /// Build an overlay over `root`, which must pass validation
    pub fn new(root: Tree, prefs: Preferences, config: &Config) -> Result<Self> {
        Self::with_fallback(root, crate::navigator::default_fallback(), prefs, config)
    }

    /// Like [`Overlay::new`] with custom content for failed loads
    pub fn with_fallback(root: Tree, fallback: Tree, prefs: Preferences, config: &Config) -> Result<Self> {
        validate_strict(&root)?;
        validate_strict(&fallback)?;
        let stats = root.stats();
        log::info!(
            "overlay: {} nodes, {} virtual directories, depth {}",
            stats.total_nodes,
            stats.virtual_directories,
            stats.max_depth
        );

        let settings = NavigatorSettings {
            palette_key: config.keys.palette,
            search: config.search.clone(),
            fallback: Arc::new(fallback),
        };
        let navigator = Navigator::new(
            Arc::new(root),
            Arc::new(meta_tree(&prefs)),
            prefs.store().clone(),
            settings,
        );
        Ok(Self {
            navigator,
            loader: Arc::new(DirectoryLoader::for_directories(config.loader.settings())),
            prefs,
            surface: None,
            visible: false,
        })
    }

    /// Mount into `surface`, show and restore the remembered position
    pub fn mount(&mut self, mut surface: Box<dyn Surface>) -> Result<()> {
        if let Some(mut previous) = self.surface.take() {
            previous.unmount()?;
        }
        surface.mount()?;
        surface.focus();
        self.surface = Some(surface);
        self.visible = true;

        let last = self.prefs.last_position();
        if !last.is_empty() && !self.navigator.restore_position(&last) {
            log::debug!("overlay: remembered position {:?} is gone", last);
        }
        Ok(())
    }

    /// Remember the current position and release the surface
    pub fn unmount(&mut self) -> Result<()> {
        if let Err(e) = self.prefs.set_last_position(self.navigator.current_path()) {
            log::warn!("overlay: could not remember position: {}", e);
        }
        self.visible = false;
        match self.surface.take() {
            Some(mut surface) => surface.unmount(),
            None => Ok(()),
        }
    }

    /// The global hotkey: show, focus or hide depending on current state.
    /// An unmounted overlay has nowhere to show and stays hidden.
    pub fn activate(&mut self) -> Toggle {
        let toggle = if self.surface.is_none() {
            self.visible = false;
            Toggle::Hidden
        } else if !self.visible {
            self.visible = true;
            self.focus();
            Toggle::Shown
        } else if self.is_focused() {
            self.visible = false;
            self.blur();
            Toggle::Hidden
        } else {
            self.focus();
            Toggle::Focused
        };
        log::debug!("overlay: activate -> {:?}", toggle);
        toggle
    }

    /// Dispatch `key` and apply every effect except loads, which are
    /// returned for the caller to run
    pub fn handle_key(&mut self, key: Key) -> Vec<LoadRequest> {
        if !self.is_visible() || !self.is_focused() {
            log::debug!("overlay: ignoring {} while unfocused", key);
            return Vec::new();
        }
        let transition = self.navigator.handle_key(key);
        self.apply(transition)
    }

    /// Dispatch `key` and run any resulting load to completion
    pub async fn press(&mut self, key: Key) {
        let requests = self.handle_key(key);
        for request in requests {
            let completion = self.run_load(&request).await;
            self.finish_load(completion);
        }
    }

    pub async fn run_load(&self, request: &LoadRequest) -> LoadCompletion {
        let report = self
            .loader
            .load_directory(&request.key, &request.resolver, request.options)
            .await;
        LoadCompletion::from_report(request.id, report)
    }

    pub fn finish_load(&mut self, completion: LoadCompletion) {
        self.navigator.finish_load(completion);
    }

    /// Retry the failed load behind the current fallback content
    pub async fn retry(&mut self) -> bool {
        let Some(transition) = self.navigator.retry_failed_load() else {
            return false;
        };
        for request in self.apply(transition) {
            let completion = self.run_load(&request).await;
            self.finish_load(completion);
        }
        true
    }

    fn apply(&mut self, transition: Transition) -> Vec<LoadRequest> {
        let mut loads = Vec::new();
        for effect in transition.effects {
            match effect {
                Effect::Hide => {
                    self.visible = false;
                    self.blur();
                }
                Effect::Focus => self.focus(),
                Effect::Load(request) => loads.push(request),
            }
        }
        loads
    }

    pub fn focus(&mut self) {
        if let Some(surface) = self.surface.as_mut() {
            surface.focus();
        }
    }

    pub fn blur(&mut self) {
        if let Some(surface) = self.surface.as_mut() {
            surface.blur();
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_focused(&self) -> bool {
        self.surface.as_ref().map_or(false, |surface| surface.is_focused())
    }

    pub fn is_mounted(&self) -> bool {
        self.surface.is_some()
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn navigator_mut(&mut self) -> &mut Navigator {
        &mut self.navigator
    }

    pub fn view_model(&mut self) -> &NavigatorViewModel {
        self.navigator.view_model()
    }

    pub fn loader(&self) -> &Arc<DirectoryLoader> {
        &self.loader
    }

    pub fn preferences(&self) -> &Preferences {
        &self.prefs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KeytreeError;
    use crate::surface::HeadlessSurface;
    use crate::tree::Node;

    fn root() -> Tree {
        Tree::new()
            .with(Node::directory("home", Tree::new().with(Node::noop("docs"))))
            .with(Node::noop("about"))
    }

    fn mounted() -> Overlay {
        let mut overlay = Overlay::new(root(), Preferences::in_memory(), &Config::default()).unwrap();
        overlay.mount(Box::new(HeadlessSurface::new())).unwrap();
        overlay
    }

    #[test]
    fn test_new_rejects_invalid_root() {
        let mut bad = Tree::new();
        bad.insert_as("key", Node::noop("other"));
        let err = Overlay::new(bad, Preferences::in_memory(), &Config::default()).unwrap_err();
        assert!(matches!(err, KeytreeError::Validation(_)));
    }

    #[test]
    fn test_activate_three_way_toggle() {
        let mut overlay = mounted();
        assert!(overlay.is_visible() && overlay.is_focused());

        assert_eq!(overlay.activate(), Toggle::Hidden);
        assert!(!overlay.is_visible());

        assert_eq!(overlay.activate(), Toggle::Shown);
        assert!(overlay.is_focused());

        overlay.blur();
        assert_eq!(overlay.activate(), Toggle::Focused);
        assert!(overlay.is_visible() && overlay.is_focused());
    }

    #[test]
    fn test_activate_before_mount_stays_hidden() {
        let mut overlay = Overlay::new(root(), Preferences::in_memory(), &Config::default()).unwrap();
        for _ in 0..4 {
            assert_eq!(overlay.activate(), Toggle::Hidden);
            assert!(!overlay.is_visible());
        }
        assert!(overlay.handle_key(Key::Char('1')).is_empty());
        assert!(overlay.navigator().current_path().is_empty());

        overlay.mount(Box::new(HeadlessSurface::new())).unwrap();
        assert_eq!(overlay.activate(), Toggle::Hidden);
        assert_eq!(overlay.activate(), Toggle::Shown);
        overlay.blur();
        assert_eq!(overlay.activate(), Toggle::Focused);
        assert_eq!(overlay.activate(), Toggle::Hidden);
    }

    #[tokio::test]
    async fn test_escape_hides_and_keys_are_then_ignored() {
        let mut overlay = mounted();
        overlay.press(Key::Escape).await;
        assert!(!overlay.is_visible());

        overlay.press(Key::Char('1')).await;
        assert!(overlay.navigator().current_path().is_empty());
    }

    #[tokio::test]
    async fn test_position_survives_remount() {
        let prefs = Preferences::in_memory();
        let mut overlay = Overlay::new(root(), prefs.clone(), &Config::default()).unwrap();
        overlay.mount(Box::new(HeadlessSurface::new())).unwrap();
        overlay.press(Key::Char('1')).await;
        overlay.unmount().unwrap();
        assert!(!overlay.is_mounted());

        let mut again = Overlay::new(root(), prefs, &Config::default()).unwrap();
        again.mount(Box::new(HeadlessSurface::new())).unwrap();
        assert_eq!(again.navigator().current_path(), &["home".to_string()]);
    }
}

//! Navigation state machine
//!
//! The navigator owns the browsing position, the active mode and the
//! bookkeeping for a pending virtual directory load. It never suspends:
//! selecting a virtual directory yields an [`Effect::Load`] for the caller
//! to run, and the result is fed back through [`Navigator::finish_load`].

use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::{KeytreeError, LoadError, Result};
use crate::keys::Key;
use crate::loader::{LoadOptions, LoadReport};
use crate::meta::{is_meta_path, META_NAMESPACE};
use crate::pagination::{paginate, Slot};
use crate::search::{search, SearchOptions, SearchResult};
use crate::storage::{read_value, write_value, KeyValueStore};
use crate::tree::{FlatNode, Invoke, Node, NodeKind, NodeType, Resolve, Resolver, Tree};

/// Where the user currently is in the hierarchy
#[derive(Debug, Clone)]
pub struct NavigationState {
    pub current_path: Vec<String>,
    pub current_tree: Arc<Tree>,
    pub page: usize,
    /// Parent snapshots, innermost last
    pub history: Vec<Arc<Tree>>,
}

impl NavigationState {
    pub fn at_root(root: Arc<Tree>) -> Self {
        Self {
            current_path: Vec::new(),
            current_tree: root,
            page: 0,
            history: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchState {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub selected: usize,
}

#[derive(Debug, Clone)]
pub struct EditState {
    /// Full path of the input node
    pub path: Vec<String>,
    pub storage_key: String,
    pub buffer: String,
}

#[derive(Debug, Clone)]
pub enum Mode {
    Browse,
    CommandPalette(SearchState),
    InputEdit(EditState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeKind {
    Browse,
    CommandPalette,
    InputEdit,
}

/// A virtual directory resolution the caller must run
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub id: u64,
    /// Logical cache key, the `/`-joined path of the virtual node
    pub key: String,
    pub resolver: Resolver,
    pub options: LoadOptions,
}

/// The outcome of a [`LoadRequest`]
#[derive(Debug, Clone)]
pub struct LoadCompletion {
    pub id: u64,
    pub result: std::result::Result<Arc<Tree>, LoadError>,
    pub retries: u32,
}

impl LoadCompletion {
    pub fn from_report(id: u64, report: LoadReport<Arc<Tree>>) -> Self {
        Self {
            id,
            result: report.value,
            retries: report.retries,
        }
    }
}

/// Side effects the host has to carry out after a key press
#[derive(Debug, Clone)]
pub enum Effect {
    Hide,
    /// Return focus to the host surface
    Focus,
    Load(LoadRequest),
}

#[derive(Debug, Clone, Default)]
pub struct Transition {
    pub changed: bool,
    pub effects: Vec<Effect>,
}

impl Transition {
    pub fn unchanged() -> Self {
        Self::default()
    }

    pub fn changed() -> Self {
        Self {
            changed: true,
            effects: Vec::new(),
        }
    }

    fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

#[derive(Debug, Clone)]
pub struct NavigatorSettings {
    pub palette_key: char,
    pub search: SearchOptions,
    /// Shown in place of a virtual directory that failed to load
    pub fallback: Arc<Tree>,
}

impl Default for NavigatorSettings {
    fn default() -> Self {
        Self {
            palette_key: '`',
            search: SearchOptions::default(),
            fallback: Arc::new(default_fallback()),
        }
    }
}

pub fn default_fallback() -> Tree {
    Tree::new().with(Node::noop("Load failed"))
}

#[derive(Debug, Clone)]
struct PendingLoad {
    id: u64,
    key: String,
    target: Vec<String>,
    resolver: Resolver,
}

/// Enough to re-run a load that ended on the fallback tree
#[derive(Debug, Clone)]
struct RetryHandle {
    target: Vec<String>,
    resolver: Resolver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    Item(NodeType),
    PreviousPage,
    NextPage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotView {
    pub digit: usize,
    pub label: String,
    pub kind: SlotKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultView {
    pub path: String,
    pub name: String,
    pub score: f64,
    pub node_type: NodeType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditView {
    pub label: String,
    pub buffer: String,
}

/// Renderable snapshot of the navigator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavigatorViewModel {
    pub mode: ModeKind,
    pub breadcrumb: Vec<String>,
    pub page: usize,
    pub total_pages: usize,
    pub slots: Vec<SlotView>,
    pub query: Option<String>,
    pub results: Vec<ResultView>,
    pub selected: Option<usize>,
    pub edit: Option<EditView>,
    pub loading: bool,
    pub message: Option<String>,
}

pub struct Navigator {
    root: Arc<Tree>,
    meta: Arc<Tree>,
    flat: Vec<FlatNode>,
    state: NavigationState,
    mode: Mode,
    store: Arc<dyn KeyValueStore>,
    settings: NavigatorSettings,
    pending: Option<PendingLoad>,
    retry: Option<RetryHandle>,
    next_request_id: u64,
    message: Option<String>,
    revision: watch::Sender<u64>,

    // View model caching
    cached_view_model: Option<NavigatorViewModel>,
}

impl Navigator {
    /// Create a navigator over an already validated `root`
    pub fn new(
        root: Arc<Tree>,
        meta: Arc<Tree>,
        store: Arc<dyn KeyValueStore>,
        settings: NavigatorSettings,
    ) -> Self {
        let mut flat = root.flatten();
        flat.extend(meta.flatten_under(&[META_NAMESPACE.to_string()]));
        log::debug!("navigator: {} searchable nodes", flat.len());
        let (revision, _) = watch::channel(0);
        Self {
            state: NavigationState::at_root(root.clone()),
            root,
            meta,
            flat,
            mode: Mode::Browse,
            store,
            settings,
            pending: None,
            retry: None,
            next_request_id: 1,
            message: None,
            revision,
            cached_view_model: None,
        }
    }

    /// Handle a key press. Errors never escape: they reset the navigator to
    /// the root and surface as the current message.
    pub fn handle_key(&mut self, key: Key) -> Transition {
        let outcome = match self.mode {
            Mode::Browse => self.handle_browse(key),
            Mode::CommandPalette(_) => self.handle_palette(key),
            Mode::InputEdit(_) => self.handle_edit(key),
        };
        let transition = match outcome {
            Ok(transition) => transition,
            Err(e) => {
                self.recover(e);
                Transition::changed()
            }
        };
        if transition.changed {
            self.notify();
        }
        transition
    }

    /// Apply the result of a load started by this navigator
    pub fn finish_load(&mut self, completion: LoadCompletion) -> Transition {
        let pending = match self.pending.take() {
            Some(pending) if pending.id == completion.id => pending,
            other => {
                log::debug!("navigator: ignoring stale load completion {}", completion.id);
                self.pending = other;
                return Transition::unchanged();
            }
        };

        let name = pending.target.last().cloned().unwrap_or_default();
        match completion.result {
            Ok(tree) => {
                log::debug!(
                    "navigator: loaded {} after {} retries",
                    pending.key,
                    completion.retries
                );
                self.message = None;
                self.descend(name, tree);
            }
            Err(e) => {
                log::warn!("navigator: showing fallback for {}: {}", pending.key, e);
                self.message = Some(format!("Could not load {}: {}", name, e));
                self.descend(name, self.settings.fallback.clone());
                self.retry = Some(RetryHandle {
                    target: pending.target,
                    resolver: pending.resolver,
                });
            }
        }
        self.notify();
        Transition::changed()
    }

    /// Re-run the failed load whose fallback is currently shown
    pub fn retry_failed_load(&mut self) -> Option<Transition> {
        let transition = self.retry_load()?;
        self.notify();
        Some(transition)
    }

    fn retry_load(&mut self) -> Option<Transition> {
        if self.pending.is_some() {
            return None;
        }
        let retry = self.retry.take()?;
        if self.state.current_path != retry.target {
            return None;
        }
        self.go_back();
        Some(self.start_load(retry.target, retry.resolver, LoadOptions::force()))
    }

    /// Jump to `path` if every segment is a static directory; otherwise stay at root
    pub fn restore_position(&mut self, path: &[String]) -> bool {
        let restored = match self.jump_to(path) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("navigator: not restoring position {:?}: {}", path, e);
                self.reset_to_root();
                false
            }
        };
        self.notify();
        restored
    }

    /// Notifications of state changes; the value is a revision counter
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    pub fn root(&self) -> &Arc<Tree> {
        &self.root
    }

    pub fn meta(&self) -> &Arc<Tree> {
        &self.meta
    }

    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn mode_kind(&self) -> ModeKind {
        match self.mode {
            Mode::Browse => ModeKind::Browse,
            Mode::CommandPalette(_) => ModeKind::CommandPalette,
            Mode::InputEdit(_) => ModeKind::InputEdit,
        }
    }

    pub fn current_path(&self) -> &[String] {
        &self.state.current_path
    }

    pub fn current_tree(&self) -> &Arc<Tree> {
        &self.state.current_tree
    }

    pub fn search_state(&self) -> Option<&SearchState> {
        match &self.mode {
            Mode::CommandPalette(search) => Some(search),
            _ => None,
        }
    }

    pub fn edit_state(&self) -> Option<&EditState> {
        match &self.mode {
            Mode::InputEdit(edit) => Some(edit),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn can_retry(&self) -> bool {
        self.retry
            .as_ref()
            .map_or(false, |retry| retry.target == self.state.current_path)
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Build the view model, reusing the cached one when nothing changed
    pub fn view_model(&mut self) -> &NavigatorViewModel {
        if self.cached_view_model.is_none() {
            log::debug!("View model: rebuilding");
        }
        let view_model = match self.cached_view_model.take() {
            Some(cached) => cached,
            None => self.rebuild_view_model(),
        };
        self.cached_view_model.insert(view_model)
    }

    fn rebuild_view_model(&self) -> NavigatorViewModel {
        let page = paginate(self.state.current_tree.entries(), self.state.page);
        let slots = page
            .slots
            .iter()
            .enumerate()
            .map(|(i, slot)| SlotView {
                digit: i + 1,
                label: slot.label().to_string(),
                kind: match slot {
                    Slot::Item((_, node)) => SlotKind::Item(node.node_type()),
                    Slot::PreviousPage => SlotKind::PreviousPage,
                    Slot::NextPage => SlotKind::NextPage,
                },
            })
            .collect();

        let (query, results, selected) = match &self.mode {
            Mode::CommandPalette(search) => (
                Some(search.query.clone()),
                search
                    .results
                    .iter()
                    .map(|result| ResultView {
                        path: result.node.full_path.clone(),
                        name: result.node.name().to_string(),
                        score: result.score,
                        node_type: result.node.node.node_type(),
                    })
                    .collect(),
                if search.results.is_empty() {
                    None
                } else {
                    Some(search.selected)
                },
            ),
            _ => (None, Vec::new(), None),
        };

        let edit = self.edit_state().map(|edit| EditView {
            label: edit.path.join("/"),
            buffer: edit.buffer.clone(),
        });

        NavigatorViewModel {
            mode: self.mode_kind(),
            breadcrumb: self.state.current_path.clone(),
            page: page.page,
            total_pages: page.total_pages,
            slots,
            query,
            results,
            selected,
            edit,
            loading: self.is_loading(),
            message: self.message.clone(),
        }
    }

    fn notify(&mut self) {
        self.cached_view_model = None;
        self.revision.send_modify(|revision| *revision += 1);
    }

    fn recover(&mut self, error: KeytreeError) {
        log::error!("navigator: resetting to root after error: {}", error);
        self.mode = Mode::Browse;
        self.pending = None;
        self.retry = None;
        self.reset_to_root();
        self.message = Some(error.to_string());
    }

    fn reset_to_root(&mut self) {
        self.state = NavigationState::at_root(self.root.clone());
    }

    fn handle_browse(&mut self, key: Key) -> Result<Transition> {
        match key {
            Key::Char(c) if c == self.settings.palette_key => {
                if self.is_loading() {
                    return Ok(Transition::unchanged());
                }
                log::debug!("navigator: opening command palette");
                self.mode = Mode::CommandPalette(SearchState::default());
                Ok(Transition::changed())
            }
            Key::Char(_) => match key.digit() {
                Some(_) if self.is_loading() => Ok(Transition::unchanged()),
                Some(digit) => self.select_slot(digit),
                None => Ok(Transition::unchanged()),
            },
            Key::Backspace => {
                // Leaving the directory abandons its pending load
                self.pending = None;
                self.go_back();
                Ok(Transition::changed())
            }
            Key::Escape => Ok(Transition::unchanged().with_effect(Effect::Hide)),
            Key::Enter => Ok(self.retry_load().unwrap_or_default()),
            Key::Up | Key::Down => Ok(Transition::unchanged()),
        }
    }

    fn select_slot(&mut self, digit: usize) -> Result<Transition> {
        let page = paginate(self.state.current_tree.entries(), self.state.page);
        let Some(slot) = page.slot(digit).cloned() else {
            return Ok(Transition::unchanged());
        };
        match slot {
            Slot::PreviousPage => {
                self.state.page = page.page.saturating_sub(1);
                Ok(Transition::changed())
            }
            Slot::NextPage => {
                self.state.page = (page.page + 1).min(page.total_pages.saturating_sub(1));
                Ok(Transition::changed())
            }
            Slot::Item((key, node)) => {
                let mut target = self.state.current_path.clone();
                target.push(key);
                self.open_node(target, &node)
            }
        }
    }

    /// Open `node`, which lives at `target` directly below the current directory
    fn open_node(&mut self, target: Vec<String>, node: &Node) -> Result<Transition> {
        let name = target.last().cloned().unwrap_or_default();
        match &node.kind {
            NodeKind::Directory { children } => {
                self.descend(name, children.clone());
                Ok(Transition::changed())
            }
            NodeKind::Action { invoke } => {
                self.run_action(&target, invoke.as_ref())?;
                Ok(Transition::changed())
            }
            NodeKind::Input {
                storage_key,
                default_value,
            } => {
                let storage_key = storage_key.clone().unwrap_or_else(|| target.join("/"));
                let buffer = read_value(self.store.as_ref(), &storage_key)
                    .or_else(|| default_value.clone())
                    .unwrap_or_default();
                log::debug!("navigator: editing {} ({})", target.join("/"), storage_key);
                self.mode = Mode::InputEdit(EditState {
                    path: target,
                    storage_key,
                    buffer,
                });
                Ok(Transition::changed())
            }
            NodeKind::VirtualDirectory { resolve } => match resolve {
                Resolve::Resolver(resolver) => {
                    Ok(self.start_load(target, resolver.clone(), LoadOptions::default()))
                }
                Resolve::Unbound(raw) => Err(KeytreeError::Navigation(format!(
                    "{}: virtual directory resolver is not callable (got {})",
                    target.join("/"),
                    raw
                ))),
            },
        }
    }

    fn run_action(&mut self, path: &[String], invoke: Option<&Invoke>) -> Result<()> {
        let display = path.join("/");
        match invoke {
            None => {
                log::debug!("navigator: {} has no action", display);
                Ok(())
            }
            Some(Invoke::Callback(callback)) => {
                log::info!("navigator: running {}", display);
                let callback = callback.clone();
                panic::catch_unwind(AssertUnwindSafe(|| callback())).map_err(|_| {
                    KeytreeError::Navigation(format!("action {} panicked", display))
                })
            }
            Some(Invoke::Unbound(raw)) => Err(KeytreeError::Navigation(format!(
                "{}: action invoke is not callable (got {})",
                display, raw
            ))),
        }
    }

    fn start_load(&mut self, target: Vec<String>, resolver: Resolver, options: LoadOptions) -> Transition {
        let id = self.next_request_id;
        self.next_request_id += 1;
        let key = target.join("/");
        log::info!("navigator: loading {} (request {})", key, id);

        self.retry = None;
        self.pending = Some(PendingLoad {
            id,
            key: key.clone(),
            target,
            resolver: resolver.clone(),
        });
        Transition::changed().with_effect(Effect::Load(LoadRequest {
            id,
            key,
            resolver,
            options,
        }))
    }

    fn descend(&mut self, name: String, tree: Arc<Tree>) {
        let parent = std::mem::replace(&mut self.state.current_tree, tree);
        self.state.history.push(parent);
        self.state.current_path.push(name);
        self.state.page = 0;
    }

    fn go_back(&mut self) {
        match self.state.history.pop() {
            Some(parent) => {
                self.state.current_path.pop();
                self.state.current_tree = parent;
                self.state.page = 0;
            }
            None => self.reset_to_root(),
        }
    }

    /// Rebuild position and history from the root down to the directory at `path`
    fn jump_to(&mut self, path: &[String]) -> Result<()> {
        let mut history = Vec::with_capacity(path.len());
        let mut tree = self.root.clone();
        for (depth, segment) in path.iter().enumerate() {
            let children = tree
                .get(segment)
                .and_then(|node| node.children())
                .cloned()
                .ok_or_else(|| {
                    KeytreeError::Navigation(format!(
                        "{} is not a directory",
                        path[..=depth].join("/")
                    ))
                })?;
            history.push(std::mem::replace(&mut tree, children));
        }
        self.state = NavigationState {
            current_path: path.to_vec(),
            current_tree: tree,
            page: 0,
            history,
        };
        Ok(())
    }

    fn handle_palette(&mut self, key: Key) -> Result<Transition> {
        let Mode::CommandPalette(search_state) = &mut self.mode else {
            return Ok(Transition::unchanged());
        };
        match key {
            Key::Char(c) => {
                search_state.query.push(c);
                self.refresh_results();
                Ok(Transition::changed())
            }
            Key::Backspace => {
                if search_state.query.pop().is_none() {
                    return Ok(Transition::unchanged());
                }
                self.refresh_results();
                Ok(Transition::changed())
            }
            Key::Up => {
                let before = search_state.selected;
                search_state.selected = before.saturating_sub(1);
                Ok(Transition {
                    changed: search_state.selected != before,
                    effects: Vec::new(),
                })
            }
            Key::Down => {
                let before = search_state.selected;
                let last = search_state.results.len().saturating_sub(1);
                search_state.selected = (before + 1).min(last);
                Ok(Transition {
                    changed: search_state.selected != before,
                    effects: Vec::new(),
                })
            }
            Key::Escape => {
                if search_state.query.is_empty() {
                    self.mode = Mode::Browse;
                    Ok(Transition::changed().with_effect(Effect::Hide))
                } else {
                    *search_state = SearchState::default();
                    Ok(Transition::changed())
                }
            }
            Key::Enter => self.confirm_selection(),
        }
    }

    fn refresh_results(&mut self) {
        if let Mode::CommandPalette(search_state) = &mut self.mode {
            search_state.results = search(&self.flat, &search_state.query, &self.settings.search);
            search_state.selected = 0;
            log::debug!(
                "navigator: {} results for {:?}",
                search_state.results.len(),
                search_state.query
            );
        }
    }

    fn confirm_selection(&mut self) -> Result<Transition> {
        let selected = match &self.mode {
            Mode::CommandPalette(search_state) => search_state
                .results
                .get(search_state.selected)
                .map(|result| result.node.segments.clone()),
            _ => None,
        };
        let Some(segments) = selected else {
            return Ok(Transition::unchanged());
        };
        self.mode = Mode::Browse;

        if is_meta_path(&segments) {
            let node = self
                .meta
                .find_path(&segments[1..])
                .cloned()
                .ok_or_else(|| stale_path(&segments))?;
            self.reset_to_root();
            return match &node.kind {
                NodeKind::Action { invoke } => {
                    self.run_action(&segments, invoke.as_ref())?;
                    Ok(Transition::changed())
                }
                other => Err(KeytreeError::Navigation(format!(
                    "{}: meta entries must be actions, got {:?}",
                    segments.join("/"),
                    other
                ))),
            };
        }

        let node = self
            .root
            .find_path(&segments)
            .cloned()
            .ok_or_else(|| stale_path(&segments))?;
        let parent = &segments[..segments.len().saturating_sub(1)];
        self.jump_to(parent)?;
        self.open_node(segments, &node)
    }

    fn handle_edit(&mut self, key: Key) -> Result<Transition> {
        let Mode::InputEdit(edit) = &mut self.mode else {
            return Ok(Transition::unchanged());
        };
        match key {
            Key::Char(c) => {
                edit.buffer.push(c);
                Ok(Transition::changed())
            }
            Key::Backspace => Ok(Transition {
                changed: edit.buffer.pop().is_some(),
                effects: Vec::new(),
            }),
            Key::Enter => {
                let name = edit.path.last().cloned().unwrap_or_default();
                self.message = match write_value(self.store.as_ref(), &edit.storage_key, &edit.buffer) {
                    Ok(()) => {
                        log::debug!("navigator: saved {}", edit.storage_key);
                        Some(format!("Saved {}", name))
                    }
                    Err(e) => Some(format!("Could not save {}: {}", name, e)),
                };
                self.mode = Mode::Browse;
                Ok(Transition::changed().with_effect(Effect::Focus))
            }
            Key::Escape => {
                self.mode = Mode::Browse;
                Ok(Transition::changed())
            }
            Key::Up | Key::Down => Ok(Transition::unchanged()),
        }
    }
}

fn stale_path(segments: &[String]) -> KeytreeError {
    KeytreeError::Navigation(format!("{} no longer exists", segments.join("/")))
}

impl std::fmt::Debug for Navigator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Navigator")
            .field("path", &self.state.current_path)
            .field("page", &self.state.page)
            .field("mode", &self.mode_kind())
            .field("loading", &self.is_loading())
            .finish()
    }
}

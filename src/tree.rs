use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::{BoxError, KeytreeError, Result};

/// Callback run when an action node is selected
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Future produced by a virtual directory resolver
pub type ResolveFuture = Pin<Box<dyn Future<Output = std::result::Result<Tree, BoxError>> + Send>>;

/// A (key, node) pair as stored in a [`Tree`]
pub type Entry = (String, Node);

/// Asynchronous producer of a virtual directory's content.
///
/// Synchronous resolvers are wrapped into an immediately-ready future so the
/// loader only ever deals with one calling convention.
#[derive(Clone)]
pub struct Resolver(Arc<dyn Fn() -> ResolveFuture + Send + Sync>);

impl Resolver {
    /// Wrap an async closure
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Tree, BoxError>> + Send + 'static,
    {
        Self(Arc::new(move || Box::pin(f())))
    }

    /// Wrap a synchronous closure
    pub fn from_sync<F>(f: F) -> Self
    where
        F: Fn() -> std::result::Result<Tree, BoxError> + Send + Sync + 'static,
    {
        Self::new(move || std::future::ready(f()))
    }

    /// Start one resolution
    pub fn resolve(&self) -> ResolveFuture {
        (self.0)()
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Resolver(..)")
    }
}

/// The invoke slot of an action node
#[derive(Clone)]
pub enum Invoke {
    Callback(Callback),
    /// A raw value that could not be bound to anything callable
    Unbound(String),
}

impl fmt::Debug for Invoke {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invoke::Callback(_) => f.write_str("Callback(..)"),
            Invoke::Unbound(raw) => write!(f, "Unbound({:?})", raw),
        }
    }
}

/// The resolve slot of a virtual directory node
#[derive(Clone, Debug)]
pub enum Resolve {
    Resolver(Resolver),
    Unbound(String),
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    Directory {
        children: Arc<Tree>,
    },
    Action {
        invoke: Option<Invoke>,
    },
    Input {
        storage_key: Option<String>,
        default_value: Option<String>,
    },
    VirtualDirectory {
        resolve: Resolve,
    },
}

/// The tag of a node, without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Directory,
    Action,
    Input,
    VirtualDirectory,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NodeType::Directory => "directory",
            NodeType::Action => "action",
            NodeType::Input => "input",
            NodeType::VirtualDirectory => "virtual directory",
        };
        f.write_str(label)
    }
}

/// A single entry of the menu hierarchy
#[derive(Clone, Debug)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
}

impl Node {
    /// Create a directory node
    pub fn directory(name: impl Into<String>, children: Tree) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Directory {
                children: Arc::new(children),
            },
        }
    }

    /// Create an action node running `f` when selected
    pub fn action<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: NodeKind::Action {
                invoke: Some(Invoke::Callback(Arc::new(f))),
            },
        }
    }

    /// Create an action node that does nothing
    pub fn noop(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Action { invoke: None },
        }
    }

    /// Create an input node persisted under `storage_key`
    pub fn input(name: impl Into<String>, storage_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Input {
                storage_key: Some(storage_key.into()),
                default_value: None,
            },
        }
    }

    /// Set the default value of an input node; no effect on other kinds
    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        if let NodeKind::Input { default_value, .. } = &mut self.kind {
            *default_value = Some(value.into());
        }
        self
    }

    /// Create a virtual directory node
    pub fn virtual_dir(name: impl Into<String>, resolver: Resolver) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::VirtualDirectory {
                resolve: Resolve::Resolver(resolver),
            },
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self.kind {
            NodeKind::Directory { .. } => NodeType::Directory,
            NodeKind::Action { .. } => NodeType::Action,
            NodeKind::Input { .. } => NodeType::Input,
            NodeKind::VirtualDirectory { .. } => NodeType::VirtualDirectory,
        }
    }

    /// Anything that is not a static directory
    pub fn is_leaf(&self) -> bool {
        !matches!(self.kind, NodeKind::Directory { .. })
    }

    pub fn children(&self) -> Option<&Arc<Tree>> {
        match &self.kind {
            NodeKind::Directory { children } => Some(children),
            _ => None,
        }
    }
}

/// Insertion-ordered mapping from key to node. Trees are treated as
/// immutable snapshots once handed to the navigator.
#[derive(Clone, Debug, Default)]
pub struct Tree {
    entries: Vec<Entry>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert keyed by the node's own name
    pub fn with(mut self, node: Node) -> Self {
        self.insert(node);
        self
    }

    /// Insert keyed by the node's own name
    pub fn insert(&mut self, node: Node) {
        let key = node.name.clone();
        self.insert_as(key, node);
    }

    /// Insert under an explicit key, replacing an existing entry with the same key
    pub fn insert_as(&mut self, key: impl Into<String>, node: Node) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = node;
        } else {
            self.entries.push((key, node));
        }
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, n)| n)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    /// Follow `path` through static directories and return the node it names
    pub fn find_path<S: AsRef<str>>(&self, path: &[S]) -> Option<&Node> {
        let (last, parents) = path.split_last()?;
        let mut tree = self;
        for segment in parents {
            tree = tree.get(segment.as_ref())?.children()?;
        }
        tree.get(last.as_ref())
    }

    /// Follow `path` and return the directory content it names; empty path is `self`
    pub fn find_dir<S: AsRef<str>>(&self, path: &[S]) -> Option<&Tree> {
        let mut tree = self;
        for segment in path {
            tree = tree.get(segment.as_ref())?.children()?;
        }
        Some(tree)
    }

    /// Flatten all leaf nodes into search candidates
    pub fn flatten(&self) -> Vec<FlatNode> {
        self.flatten_under(&[])
    }

    /// Flatten all leaf nodes, prefixing every path with `prefix`
    pub fn flatten_under(&self, prefix: &[String]) -> Vec<FlatNode> {
        let mut flat = Vec::new();
        let mut segments = prefix.to_vec();
        Self::collect_leaves(self, &mut segments, &mut flat);
        flat
    }

    fn collect_leaves(tree: &Tree, segments: &mut Vec<String>, flat: &mut Vec<FlatNode>) {
        for (key, node) in &tree.entries {
            segments.push(key.clone());
            if node.is_leaf() {
                flat.push(FlatNode::new(node.clone(), segments.clone()));
            } else if let Some(children) = node.children() {
                Self::collect_leaves(children, segments, flat);
            }
            segments.pop();
        }
    }

    /// Get tree statistics
    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats::default();
        Self::collect_stats(self, 1, &mut stats);
        stats
    }

    fn collect_stats(tree: &Tree, depth: usize, stats: &mut TreeStats) {
        for (_, node) in &tree.entries {
            stats.total_nodes += 1;
            stats.max_depth = stats.max_depth.max(depth);
            match &node.kind {
                NodeKind::Directory { children } => {
                    stats.directories += 1;
                    Self::collect_stats(children, depth + 1, stats);
                }
                NodeKind::Action { .. } => stats.actions += 1,
                NodeKind::Input { .. } => stats.inputs += 1,
                NodeKind::VirtualDirectory { .. } => stats.virtual_directories += 1,
            }
        }
    }
}

/// A leaf node paired with its location, used as a search candidate
#[derive(Clone, Debug)]
pub struct FlatNode {
    pub node: Node,
    pub full_path: String,
    pub segments: Vec<String>,
}

impl FlatNode {
    pub fn new(node: Node, segments: Vec<String>) -> Self {
        Self {
            full_path: segments.join("/"),
            node,
            segments,
        }
    }

    pub fn name(&self) -> &str {
        &self.node.name
    }

    /// Segments of the containing directory
    pub fn parent_segments(&self) -> &[String] {
        match self.segments.split_last() {
            Some((_, parents)) => parents,
            None => &[],
        }
    }
}

/// Statistics about a tree
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TreeStats {
    pub total_nodes: usize,
    pub directories: usize,
    pub actions: usize,
    pub inputs: usize,
    pub virtual_directories: usize,
    pub max_depth: usize,
}

/// Named callables that JSON tree definitions refer to
#[derive(Clone, Default)]
pub struct Registry {
    actions: HashMap<String, Callback>,
    resolvers: HashMap<String, Resolver>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_action<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.actions.insert(name.into(), Arc::new(f));
        self
    }

    pub fn register_resolver(&mut self, name: impl Into<String>, resolver: Resolver) -> &mut Self {
        self.resolvers.insert(name.into(), resolver);
        self
    }

    pub fn action(&self, name: &str) -> Option<Callback> {
        self.actions.get(name).cloned()
    }

    pub fn resolver(&self, name: &str) -> Option<Resolver> {
        self.resolvers.get(name).cloned()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut actions: Vec<_> = self.actions.keys().collect();
        actions.sort();
        let mut resolvers: Vec<_> = self.resolvers.keys().collect();
        resolvers.sort();
        f.debug_struct("Registry")
            .field("actions", &actions)
            .field("resolvers", &resolvers)
            .finish()
    }
}

/// Build a tree from a plain JSON object.
///
/// Untagged objects become directories, `null` becomes a no-op action and
/// other scalars become actions bound through `registry`. Values that cannot
/// be bound are kept as `Unbound` so [`crate::validate::validate`] can report
/// them; only shapes that have no node representation fail here.
pub fn build_tree(raw: &Value, registry: &Registry) -> Result<Tree> {
    let object = raw
        .as_object()
        .ok_or_else(|| KeytreeError::Build("tree root must be a JSON object".to_string()))?;
    build_children(object, registry, "")
}

fn build_children(
    object: &serde_json::Map<String, Value>,
    registry: &Registry,
    parent: &str,
) -> Result<Tree> {
    let mut tree = Tree::new();
    for (key, value) in object {
        let path = if parent.is_empty() {
            key.clone()
        } else {
            format!("{}/{}", parent, key)
        };
        let node = build_node(key, value, registry, &path)?;
        tree.insert_as(key.clone(), node);
    }
    Ok(tree)
}

fn build_node(key: &str, value: &Value, registry: &Registry, path: &str) -> Result<Node> {
    match value {
        Value::Object(object) => {
            let name = match object.get("name") {
                Some(Value::String(name)) if object.contains_key("type") => name.clone(),
                Some(other) if object.contains_key("type") => {
                    return Err(KeytreeError::Build(format!(
                        "{}: \"name\" must be a string, got {}",
                        path, other
                    )))
                }
                _ => key.to_string(),
            };
            match object.get("type") {
                None => Ok(Node {
                    name,
                    kind: NodeKind::Directory {
                        children: Arc::new(build_children(object, registry, path)?),
                    },
                }),
                Some(Value::String(tag)) => build_tagged(name, tag, object, registry, path),
                Some(other) => Err(KeytreeError::Build(format!(
                    "{}: \"type\" must be a string, got {}",
                    path, other
                ))),
            }
        }
        Value::Array(_) => Err(KeytreeError::Build(format!(
            "{}: arrays cannot be used as tree nodes",
            path
        ))),
        Value::Null => Ok(Node::noop(key)),
        Value::String(binding) => Ok(Node {
            name: key.to_string(),
            kind: NodeKind::Action {
                invoke: Some(bind_action(binding, registry)),
            },
        }),
        other => Ok(Node {
            name: key.to_string(),
            kind: NodeKind::Action {
                invoke: Some(Invoke::Unbound(other.to_string())),
            },
        }),
    }
}

fn build_tagged(
    name: String,
    tag: &str,
    object: &serde_json::Map<String, Value>,
    registry: &Registry,
    path: &str,
) -> Result<Node> {
    let kind = match tag {
        "directory" => {
            let children = match object.get("children") {
                Some(Value::Object(children)) => build_children(children, registry, path)?,
                None => Tree::new(),
                Some(other) => {
                    return Err(KeytreeError::Build(format!(
                        "{}: \"children\" must be an object, got {}",
                        path, other
                    )))
                }
            };
            NodeKind::Directory {
                children: Arc::new(children),
            }
        }
        "action" => NodeKind::Action {
            invoke: match object.get("action") {
                None | Some(Value::Null) => None,
                Some(Value::String(binding)) => Some(bind_action(binding, registry)),
                Some(other) => Some(Invoke::Unbound(other.to_string())),
            },
        },
        "input" => NodeKind::Input {
            storage_key: optional_string(object, "storageKey", path)?,
            default_value: optional_string(object, "defaultValue", path)?,
        },
        "virtual" | "virtual_directory" => NodeKind::VirtualDirectory {
            resolve: match object.get("resolver") {
                Some(Value::String(binding)) => match registry.resolver(binding) {
                    Some(resolver) => Resolve::Resolver(resolver),
                    None => Resolve::Unbound(binding.clone()),
                },
                Some(other) => Resolve::Unbound(other.to_string()),
                None => Resolve::Unbound("<missing>".to_string()),
            },
        },
        other => {
            return Err(KeytreeError::Build(format!(
                "{}: unknown node type \"{}\"",
                path, other
            )))
        }
    };
    Ok(Node { name, kind })
}

fn bind_action(binding: &str, registry: &Registry) -> Invoke {
    match registry.action(binding) {
        Some(callback) => Invoke::Callback(callback),
        None => Invoke::Unbound(binding.to_string()),
    }
}

fn optional_string(
    object: &serde_json::Map<String, Value>,
    field: &str,
    path: &str,
) -> Result<Option<String>> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(KeytreeError::Build(format!(
            "{}: \"{}\" must be a string, got {}",
            path, field, other
        ))),
    }
}

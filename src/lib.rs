//! Keyboard-driven directory navigation overlay.
//!
//! A hierarchical menu of actions, stored inputs and lazily resolved
//! directories, browsed with the digit keys and searched through a fuzzy
//! command palette.

pub mod async_task;
pub mod builtins;
pub mod cli;
pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod keys;
pub mod loader;
pub mod main_lib;
pub mod meta;
pub mod navigator;
pub mod overlay;
pub mod pagination;
pub mod search;
pub mod storage;
pub mod surface;
pub mod theme;
pub mod tree;
pub mod ui;
pub mod validate;

pub use error::{KeytreeError, Result};
pub use keys::Key;
pub use overlay::Overlay;
pub use tree::{Node, Registry, Resolver, Tree};

//! The isolated surface the overlay is mounted into.
//!
//! The engine only needs to know whether its surface has keyboard focus and
//! to move focus in and out; how the surface keeps the host from interfering
//! is the implementor's business.

use crossterm::{
    event::{DisableFocusChange, EnableFocusChange},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use std::io;

use crate::error::Result;

pub trait Surface: Send {
    fn mount(&mut self) -> Result<()>;
    fn unmount(&mut self) -> Result<()>;
    fn is_focused(&self) -> bool;
    fn focus(&mut self);
    fn blur(&mut self);
}

/// Surface without a screen; focus is plain state
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    mounted: bool,
    focused: bool,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }
}

impl Surface for HeadlessSurface {
    fn mount(&mut self) -> Result<()> {
        self.mounted = true;
        Ok(())
    }

    fn unmount(&mut self) -> Result<()> {
        self.mounted = false;
        self.focused = false;
        Ok(())
    }

    fn is_focused(&self) -> bool {
        self.mounted && self.focused
    }

    fn focus(&mut self) {
        self.focused = self.mounted;
    }

    fn blur(&mut self) {
        self.focused = false;
    }
}

/// The real terminal: raw mode on an alternate screen.
///
/// Focus follows the terminal's focus-change reports, which the event loop
/// forwards through [`Surface::focus`] and [`Surface::blur`].
#[derive(Debug, Default)]
pub struct TerminalSurface {
    mounted: bool,
    focused: bool,
}

impl TerminalSurface {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Surface for TerminalSurface {
    fn mount(&mut self) -> Result<()> {
        if self.mounted {
            return Ok(());
        }
        enable_raw_mode()?;
        execute!(io::stdout(), EnterAlternateScreen, EnableFocusChange)?;
        self.mounted = true;
        self.focused = true;
        log::debug!("surface: terminal mounted");
        Ok(())
    }

    fn unmount(&mut self) -> Result<()> {
        if !self.mounted {
            return Ok(());
        }
        execute!(io::stdout(), DisableFocusChange, LeaveAlternateScreen)?;
        disable_raw_mode()?;
        self.mounted = false;
        self.focused = false;
        log::debug!("surface: terminal unmounted");
        Ok(())
    }

    fn is_focused(&self) -> bool {
        self.mounted && self.focused
    }

    fn focus(&mut self) {
        self.focused = self.mounted;
    }

    fn blur(&mut self) {
        self.focused = false;
    }
}

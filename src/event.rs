use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::config::KeybindingConfig;
use crate::keys::Key;

/// A terminal event reduced to what the overlay host cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Key(Key),
    Activate,
    Quit,
    FocusGained,
    FocusLost,
    Redraw,
    Ignored,
}

pub fn translate(event: &Event, keys: &KeybindingConfig) -> InputEvent {
    match event {
        Event::Key(key) => translate_key(key, keys),
        Event::FocusGained => InputEvent::FocusGained,
        Event::FocusLost => InputEvent::FocusLost,
        Event::Resize(_, _) => InputEvent::Redraw,
        _ => InputEvent::Ignored,
    }
}

fn translate_key(key: &KeyEvent, keys: &KeybindingConfig) -> InputEvent {
    // Releases and repeats are reported on some platforms
    if key.kind != KeyEventKind::Press {
        return InputEvent::Ignored;
    }

    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') => InputEvent::Quit,
            KeyCode::Char(c) if c.eq_ignore_ascii_case(&keys.activate) => InputEvent::Activate,
            _ => InputEvent::Ignored,
        };
    }

    match key.code {
        KeyCode::Char(c) => InputEvent::Key(Key::Char(c)),
        KeyCode::Backspace => InputEvent::Key(Key::Backspace),
        KeyCode::Enter => InputEvent::Key(Key::Enter),
        KeyCode::Esc => InputEvent::Key(Key::Escape),
        KeyCode::Up => InputEvent::Key(Key::Up),
        KeyCode::Down => InputEvent::Key(Key::Down),
        _ => InputEvent::Ignored,
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::keys::Key;

/// A scripted user input, as accepted by `keytree execute`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    Press(Key),
    /// Every character of the text as its own key press
    Type(String),
    /// The global show/hide hotkey
    Activate,

    // Multi-step commands for testing
    Sequence(Vec<Command>),
}

impl Command {
    /// Parse a command from a string representation
    pub fn from_string(s: &str) -> Result<Self, String> {
        let trimmed = s.trim();
        match trimmed.to_lowercase().as_str() {
            "backspace" | "back" => Ok(Command::Press(Key::Backspace)),
            "enter" | "return" => Ok(Command::Press(Key::Enter)),
            "escape" | "esc" => Ok(Command::Press(Key::Escape)),
            "up" => Ok(Command::Press(Key::Up)),
            "down" => Ok(Command::Press(Key::Down)),
            "palette" | "`" => Ok(Command::Press(Key::Char('`'))),
            "activate" => Ok(Command::Activate),
            digit if digit.len() == 1 && digit.chars().all(|c| ('1'..='9').contains(&c)) => {
                Ok(Command::Press(Key::Char(digit.chars().next().unwrap_or('1'))))
            }
            _ => {
                if let Some(text) = trimmed.strip_prefix("type:") {
                    if text.is_empty() {
                        return Err("type: needs some text".to_string());
                    }
                    return Ok(Command::Type(text.to_string()));
                }

                if let Some(inner) = trimmed
                    .strip_prefix("sequence:[")
                    .and_then(|rest| rest.strip_suffix(']'))
                {
                    if inner.trim().is_empty() {
                        return Ok(Command::Sequence(vec![]));
                    }
                    let mut commands = Vec::new();
                    for cmd_str in inner.split(',') {
                        let cmd_str = cmd_str.trim();
                        match Command::from_string(cmd_str) {
                            Ok(cmd) => commands.push(cmd),
                            Err(e) => {
                                return Err(format!("Invalid command in sequence '{}': {}", cmd_str, e))
                            }
                        }
                    }
                    return Ok(Command::Sequence(commands));
                }

                Err(format!("Unknown command: {}", s))
            }
        }
    }

    /// The key presses this command stands for; `None` marks an activation
    pub fn keys(&self) -> Vec<Option<Key>> {
        match self {
            Command::Press(key) => vec![Some(*key)],
            Command::Type(text) => text.chars().map(|c| Some(Key::Char(c))).collect(),
            Command::Activate => vec![None],
            Command::Sequence(commands) => commands.iter().flat_map(Command::keys).collect(),
        }
    }
}

/// Parse a whitespace separated script such as `"1 palette type:docs enter"`
pub fn parse_script(script: &str) -> Result<Vec<Command>, String> {
    script.split_whitespace().map(Command::from_string).collect()
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Press(Key::Char('`')) => f.write_str("palette"),
            Command::Press(key) => write!(f, "{}", key),
            Command::Type(text) => write!(f, "type:{}", text),
            Command::Activate => f.write_str("activate"),
            Command::Sequence(commands) => write!(
                f,
                "sequence:[{}]",
                commands
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(",")
            ),
        }
    }
}

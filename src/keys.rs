use serde::{Deserialize, Serialize};
use std::fmt;

/// A keystroke as seen by the navigation state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    Char(char),
    Backspace,
    Enter,
    Escape,
    Up,
    Down,
}

impl Key {
    /// The slot number for digit keys `1`-`9`
    pub fn digit(&self) -> Option<usize> {
        match self {
            Key::Char(c @ '1'..='9') => c.to_digit(10).map(|d| d as usize),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Char(c) => write!(f, "{}", c),
            Key::Backspace => f.write_str("backspace"),
            Key::Enter => f.write_str("enter"),
            Key::Escape => f.write_str("escape"),
            Key::Up => f.write_str("up"),
            Key::Down => f.write_str("down"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digit_keys() {
        assert_eq!(Key::Char('1').digit(), Some(1));
        assert_eq!(Key::Char('9').digit(), Some(9));
        assert_eq!(Key::Char('0').digit(), None);
        assert_eq!(Key::Char('a').digit(), None);
        assert_eq!(Key::Enter.digit(), None);
    }
}

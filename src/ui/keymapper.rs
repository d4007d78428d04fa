//! Key mapping for console input
//!
//! Converts crossterm key events into front-end actions. Only submit and
//! history recall reach the session; the rest edit the view locally.

use bitflags::bitflags;
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::core::session::ConsoleKey;

bitflags! {
    /// Modifier keys
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const CTRL  = 0b0010;
        const ALT   = 0b0100;
    }
}

impl From<KeyModifiers> for Modifiers {
    fn from(mods: KeyModifiers) -> Self {
        let mut result = Modifiers::empty();
        if mods.contains(KeyModifiers::SHIFT) {
            result |= Modifiers::SHIFT;
        }
        if mods.contains(KeyModifiers::CONTROL) {
            result |= Modifiers::CTRL;
        }
        if mods.contains(KeyModifiers::ALT) {
            result |= Modifiers::ALT;
        }
        result
    }
}

/// What a key press asks the front end to do
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputAction {
    /// Forward to the session
    Console(ConsoleKey),
    /// Type a character into the input line
    Char(char),
    Backspace,
    /// Scroll the scrollback by a page
    PageUp,
    PageDown,
    /// Jump back to the newest output
    ScrollToBottom,
    /// Ask the child process to stop
    Stop,
    /// Leave procterm
    Quit,
}

impl InputAction {
    /// Whether the action edits the input line (gated by `input_enabled`)
    pub fn is_input(&self) -> bool {
        matches!(
            self,
            InputAction::Console(_) | InputAction::Char(_) | InputAction::Backspace
        )
    }
}

/// Key mapper for converting key events to actions
pub struct KeyMapper;

impl KeyMapper {
    /// Map a crossterm KeyEvent; `None` for keys the console ignores
    pub fn map(event: &KeyEvent) -> Option<InputAction> {
        // Windows reports releases too
        if event.kind == KeyEventKind::Release {
            return None;
        }

        let mods = Modifiers::from(event.modifiers);

        match event.code {
            KeyCode::Char(ch) if mods.contains(Modifiers::CTRL) => match ch.to_ascii_lowercase() {
                'c' => Some(InputAction::Stop),
                'q' => Some(InputAction::Quit),
                _ => None,
            },
            KeyCode::Char(_) if mods.contains(Modifiers::ALT) => None,
            KeyCode::Char(ch) => Some(InputAction::Char(ch)),
            KeyCode::Tab => Some(InputAction::Char('\t')),

            KeyCode::Enter => Some(InputAction::Console(ConsoleKey::Submit)),
            KeyCode::Backspace => Some(InputAction::Backspace),

            KeyCode::Up => Some(InputAction::Console(ConsoleKey::HistoryUp)),
            KeyCode::Down => Some(InputAction::Console(ConsoleKey::HistoryDown)),

            KeyCode::PageUp => Some(InputAction::PageUp),
            KeyCode::PageDown => Some(InputAction::PageDown),
            KeyCode::End if mods.contains(Modifiers::CTRL) => Some(InputAction::ScrollToBottom),

            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn key_event(code: KeyCode, mods: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, mods)
    }

    #[test]
    fn test_console_keys() {
        let enter = key_event(KeyCode::Enter, KeyModifiers::NONE);
        assert_eq!(
            KeyMapper::map(&enter),
            Some(InputAction::Console(ConsoleKey::Submit))
        );

        let up = key_event(KeyCode::Up, KeyModifiers::NONE);
        assert_eq!(
            KeyMapper::map(&up),
            Some(InputAction::Console(ConsoleKey::HistoryUp))
        );

        let down = key_event(KeyCode::Down, KeyModifiers::NONE);
        assert_eq!(
            KeyMapper::map(&down),
            Some(InputAction::Console(ConsoleKey::HistoryDown))
        );
    }

    #[test]
    fn test_char_keys() {
        let event = key_event(KeyCode::Char('a'), KeyModifiers::NONE);
        assert_eq!(KeyMapper::map(&event), Some(InputAction::Char('a')));

        // Shifted characters arrive already uppercased
        let event = key_event(KeyCode::Char('A'), KeyModifiers::SHIFT);
        assert_eq!(KeyMapper::map(&event), Some(InputAction::Char('A')));

        let event = key_event(KeyCode::Char('x'), KeyModifiers::ALT);
        assert_eq!(KeyMapper::map(&event), None);
    }

    #[test]
    fn test_control_keys() {
        let event = key_event(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(KeyMapper::map(&event), Some(InputAction::Stop));

        let event = key_event(KeyCode::Char('Q'), KeyModifiers::CONTROL | KeyModifiers::SHIFT);
        assert_eq!(KeyMapper::map(&event), Some(InputAction::Quit));

        let event = key_event(KeyCode::Char('z'), KeyModifiers::CONTROL);
        assert_eq!(KeyMapper::map(&event), None);
    }

    #[test]
    fn test_release_is_ignored() {
        let event = KeyEvent {
            code: KeyCode::Enter,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        };
        assert_eq!(KeyMapper::map(&event), None);
    }

    #[test]
    fn test_input_gating() {
        assert!(InputAction::Char('a').is_input());
        assert!(InputAction::Console(ConsoleKey::Submit).is_input());
        assert!(InputAction::Console(ConsoleKey::HistoryUp).is_input());
        assert!(!InputAction::Quit.is_input());
        assert!(!InputAction::PageUp.is_input());
    }
}

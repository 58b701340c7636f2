//! Centralized keybinding definitions for NetShow
//! This ensures the help overlay, status bar, and actual key handlers stay in sync

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone)]
pub struct KeyBinding {
    pub key: &'static str,
    pub description: &'static str,
    pub category: KeyCategory,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyCategory {
    Navigation,
    View,
    System,
}

impl KeyCategory {
    pub fn title(&self) -> &'static str {
        match self {
            KeyCategory::Navigation => "Navigation",
            KeyCategory::View => "View",
            KeyCategory::System => "System",
        }
    }
}

/// What a key press asks the app to do in the connection table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    ForceQuit,
    Refresh,
    StartFilter,
    SortByStatus,
    SortByProcess,
    CycleInterface,
    ToggleEmojis,
    ShowDetails,
    Back,
    ToggleHelp,
    Up,
    Down,
}

/// Map a key press in the table view to an action
pub fn action_for(key: KeyEvent) -> Option<Action> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('c') => Some(Action::ForceQuit),
            KeyCode::Char('r') => Some(Action::Refresh),
            _ => None,
        };
    }

    match key.code {
        KeyCode::Char('q') => Some(Action::Quit),
        KeyCode::Char('f') | KeyCode::Char('/') => Some(Action::StartFilter),
        KeyCode::Char('s') => Some(Action::SortByStatus),
        KeyCode::Char('p') => Some(Action::SortByProcess),
        KeyCode::Char('i') => Some(Action::CycleInterface),
        KeyCode::Char('e') => Some(Action::ToggleEmojis),
        KeyCode::Char('h') | KeyCode::Char('?') => Some(Action::ToggleHelp),
        KeyCode::Enter => Some(Action::ShowDetails),
        KeyCode::Esc => Some(Action::Back),
        KeyCode::Up | KeyCode::Char('k') => Some(Action::Up),
        KeyCode::Down | KeyCode::Char('j') => Some(Action::Down),
        _ => None,
    }
}

/// Get all keybindings
pub fn get_all_keybindings() -> Vec<KeyBinding> {
    vec![
        // Navigation
        KeyBinding {
            key: "↑/k",
            description: "Move selection up",
            category: KeyCategory::Navigation,
        },
        KeyBinding {
            key: "↓/j",
            description: "Move selection down",
            category: KeyCategory::Navigation,
        },
        KeyBinding {
            key: "Enter",
            description: "Show connection details",
            category: KeyCategory::Navigation,
        },
        KeyBinding {
            key: "Esc",
            description: "Back / clear filter",
            category: KeyCategory::Navigation,
        },
        // View
        KeyBinding {
            key: "f or /",
            description: "Filter connections",
            category: KeyCategory::View,
        },
        KeyBinding {
            key: "s",
            description: "Sort by status (again for default)",
            category: KeyCategory::View,
        },
        KeyBinding {
            key: "p",
            description: "Sort by process (again for default)",
            category: KeyCategory::View,
        },
        KeyBinding {
            key: "i",
            description: "Cycle bandwidth interface",
            category: KeyCategory::View,
        },
        KeyBinding {
            key: "e",
            description: "Toggle emojis",
            category: KeyCategory::View,
        },
        // System
        KeyBinding {
            key: "Ctrl+R",
            description: "Refresh now",
            category: KeyCategory::System,
        },
        KeyBinding {
            key: "h/?",
            description: "Toggle this help",
            category: KeyCategory::System,
        },
        KeyBinding {
            key: "q/Ctrl+C",
            description: "Quit",
            category: KeyCategory::System,
        },
    ]
}

/// Get keybindings for the status bar (most common ones)
pub fn get_status_bar_keybindings() -> Vec<(&'static str, &'static str)> {
    vec![
        ("↑↓", "Navigate"),
        ("f", "Filter"),
        ("s/p", "Sort"),
        ("Enter", "Details"),
        ("h", "Help"),
        ("q", "Quit"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_table_keys() {
        assert_eq!(action_for(key(KeyCode::Char('q'))), Some(Action::Quit));
        assert_eq!(action_for(key(KeyCode::Char('/'))), Some(Action::StartFilter));
        assert_eq!(action_for(key(KeyCode::Char('f'))), Some(Action::StartFilter));
        assert_eq!(action_for(key(KeyCode::Char('j'))), Some(Action::Down));
        assert_eq!(action_for(key(KeyCode::Up)), Some(Action::Up));
        assert_eq!(action_for(key(KeyCode::Char('z'))), None);
    }

    #[test]
    fn test_control_keys() {
        let ctrl = |c| KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL);
        assert_eq!(action_for(ctrl('c')), Some(Action::ForceQuit));
        assert_eq!(action_for(ctrl('r')), Some(Action::Refresh));
        // Ctrl+S is not a sort key
        assert_eq!(action_for(ctrl('s')), None);
    }

    #[test]
    fn test_every_category_has_bindings() {
        let bindings = get_all_keybindings();
        for category in [KeyCategory::Navigation, KeyCategory::View, KeyCategory::System] {
            assert!(bindings.iter().any(|b| b.category == category));
        }
    }
}

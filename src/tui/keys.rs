use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// What a key press asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    ToggleHelp,
    ScrollUp,
    ScrollDown,
    PageUp,
    PageDown,
    Top,
    Bottom,
    ResumeLive,
    Retry,
}

/// Key binding configuration
#[derive(Debug, Clone)]
pub struct KeyBinding {
    pub keys: Vec<(KeyCode, KeyModifiers)>,
    pub label: &'static str,
    pub description: &'static str,
}

impl KeyBinding {
    pub fn new(keys: &[(KeyCode, KeyModifiers)], label: &'static str, description: &'static str) -> Self {
        Self {
            keys: keys.to_vec(),
            label,
            description,
        }
    }

    pub fn matches(&self, event: &KeyEvent) -> bool {
        self.keys
            .iter()
            .any(|(code, modifiers)| *code == event.code && *modifiers == event.modifiers)
    }
}

/// Application key mappings
#[derive(Debug, Clone)]
pub struct KeyMap {
    bindings: Vec<(Action, KeyBinding)>,
}

impl Default for KeyMap {
    fn default() -> Self {
        use crossterm::event::KeyCode::*;
        const NONE: KeyModifiers = KeyModifiers::NONE;

        Self {
            bindings: vec![
                (
                    Action::Quit,
                    KeyBinding::new(
                        &[(Char('q'), NONE), (Char('c'), KeyModifiers::CONTROL), (Esc, NONE)],
                        "q",
                        "Quit",
                    ),
                ),
                (Action::ToggleHelp, KeyBinding::new(&[(Char('?'), NONE)], "?", "Show/hide help")),
                (
                    Action::ScrollUp,
                    KeyBinding::new(&[(Up, NONE), (Char('k'), NONE)], "↑/k", "Scroll up one line"),
                ),
                (
                    Action::ScrollDown,
                    KeyBinding::new(&[(Down, NONE), (Char('j'), NONE)], "↓/j", "Scroll down one line"),
                ),
                (Action::PageUp, KeyBinding::new(&[(PageUp, NONE)], "PgUp", "Scroll up one page")),
                (Action::PageDown, KeyBinding::new(&[(PageDown, NONE)], "PgDn", "Scroll down one page")),
                (
                    Action::Top,
                    KeyBinding::new(&[(Home, NONE), (Char('g'), NONE)], "Home", "Jump to the oldest loaded row"),
                ),
                (
                    Action::Bottom,
                    KeyBinding::new(&[(End, NONE), (Char('G'), KeyModifiers::SHIFT)], "End", "Jump to the newest row"),
                ),
                (Action::ResumeLive, KeyBinding::new(&[(Char('l'), NONE)], "l", "Resume live")),
                (Action::Retry, KeyBinding::new(&[(Char('r'), NONE)], "r", "Retry the initial load")),
            ],
        }
    }
}

impl KeyMap {
    /// Action bound to a key event
    pub fn action(&self, event: &KeyEvent) -> Option<Action> {
        self.bindings
            .iter()
            .find(|(_, binding)| binding.matches(event))
            .map(|(action, _)| *action)
    }

    pub fn binding(&self, action: Action) -> Option<&KeyBinding> {
        self.bindings
            .iter()
            .find(|(bound, _)| *bound == action)
            .map(|(_, binding)| binding)
    }

    /// Get help text for all key bindings
    pub fn help_text(&self) -> String {
        self.bindings
            .iter()
            .map(|(_, binding)| format!("{:<6} {}", binding.label, binding.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

//! Actions: what a control does when a distinct state is entered.
//!
//! Simple actions fire key combinations, optionally on a repeating timer.
//! Advanced actions run explicit Enter/Repeat/Leave command sequences. The
//! script variant is declared for document compatibility but carries no
//! structure; the parser refuses it.

use std::fmt;

/// One key press with optional modifier keys.
///
/// Playback presses the modifiers left to right, then the key, releases
/// the key, then releases the modifiers in reverse order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCombination {
    /// Modifier key codes, pressed in declared order.
    pub modifiers: Vec<i32>,
    /// The main key code.
    pub key: i32,
}

impl KeyCombination {
    /// Creates a key combination.
    #[must_use]
    pub const fn new(modifiers: Vec<i32>, key: i32) -> Self {
        Self { modifiers, key }
    }
}

/// One step of an advanced action's command sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Press (and hold) a key.
    KeyPress(i32),
    /// Release a previously pressed key.
    KeyRelease(i32),
    /// Pause for the given number of milliseconds.
    Delay(u32),
}

/// Fire-and-forget or repeating key combinations.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SimpleAction {
    /// Combinations played in declared order on entry.
    pub combinations: Vec<KeyCombination>,
    /// When set, the whole sequence repeats with this trailing delay until
    /// the state is left.
    pub repeat_delay_ms: Option<u32>,
}

impl SimpleAction {
    /// Creates a simple action.
    #[must_use]
    pub const fn new(combinations: Vec<KeyCombination>, repeat_delay_ms: Option<u32>) -> Self {
        Self {
            combinations,
            repeat_delay_ms,
        }
    }
}

/// Explicit Enter/Repeat/Leave command sequences.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AdvancedAction {
    /// Commands run once when the state is entered.
    pub enter: Vec<Command>,
    /// Commands looped in a cancellable background task while the state
    /// stays entered.
    pub repeat: Vec<Command>,
    /// Commands run once when the state is left; they complete before any
    /// subsequent enter sequence starts.
    pub leave: Vec<Command>,
}

/// The closed set of action variants.
///
/// Generators match exhaustively: adding a variant without a generator
/// case is a compile error, never a silent no-op.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Key combinations, optionally repeating.
    Simple(SimpleAction),
    /// Explicit enter/repeat/leave sequences.
    Advanced(AdvancedAction),
    /// Declared upstream with no usable structure; rejected at parse time
    /// and treated as an internal consistency failure by generators.
    Script,
}

impl Action {
    /// Whether entering this action starts a background repeating task
    /// that must be cancelled when the state is left.
    #[must_use]
    pub fn needs_cancel_on_release(&self) -> bool {
        match self {
            Self::Simple(simple) => simple.repeat_delay_ms.is_some(),
            Self::Advanced(advanced) => !advanced.repeat.is_empty(),
            Self::Script => false,
        }
    }

    /// Whether this action emits anything when its state is entered.
    #[must_use]
    pub fn has_enter_behavior(&self) -> bool {
        match self {
            Self::Simple(simple) => !simple.combinations.is_empty(),
            Self::Advanced(advanced) => !advanced.enter.is_empty() || !advanced.repeat.is_empty(),
            Self::Script => false,
        }
    }

    /// Whether this action emits anything when its state is left.
    #[must_use]
    pub fn has_leave_behavior(&self) -> bool {
        match self {
            Self::Simple(simple) => simple.repeat_delay_ms.is_some(),
            Self::Advanced(advanced) => !advanced.leave.is_empty() || !advanced.repeat.is_empty(),
            Self::Script => false,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple(_) => write!(f, "simple"),
            Self::Advanced(_) => write!(f, "advanced"),
            Self::Script => write!(f, "script"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_action_cancel_semantics() {
        let fire_once = Action::Simple(SimpleAction::new(
            vec![KeyCombination::new(vec![29], 30)],
            None,
        ));
        assert!(!fire_once.needs_cancel_on_release());
        assert!(fire_once.has_enter_behavior());
        assert!(!fire_once.has_leave_behavior());

        let repeating = Action::Simple(SimpleAction::new(
            vec![KeyCombination::new(vec![], 30)],
            Some(150),
        ));
        assert!(repeating.needs_cancel_on_release());
        assert!(repeating.has_leave_behavior());
    }

    #[test]
    fn test_advanced_action_cancel_semantics() {
        let plain = Action::Advanced(AdvancedAction {
            enter: vec![Command::KeyPress(30), Command::KeyRelease(30)],
            repeat: vec![],
            leave: vec![Command::KeyPress(31), Command::KeyRelease(31)],
        });
        assert!(!plain.needs_cancel_on_release());
        assert!(plain.has_enter_behavior());
        assert!(plain.has_leave_behavior());

        let repeating = Action::Advanced(AdvancedAction {
            enter: vec![],
            repeat: vec![Command::KeyPress(30), Command::KeyRelease(30), Command::Delay(50)],
            leave: vec![],
        });
        assert!(repeating.needs_cancel_on_release());
        assert!(repeating.has_enter_behavior());
        assert!(repeating.has_leave_behavior());
    }

    #[test]
    fn test_script_action_is_inert() {
        assert!(!Action::Script.needs_cancel_on_release());
        assert!(!Action::Script.has_enter_behavior());
        assert!(!Action::Script.has_leave_behavior());
    }
}

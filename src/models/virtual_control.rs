//! Virtual controls and shift levels: validated, ordered sets of states.
//!
//! Both are backed by the same [`StateList`] and differ only in insertion
//! policy: a virtual control appends states in declaration order, a shift
//! level keeps its default state at value 0.

use crate::models::control::Control;
use crate::models::virtual_state::VirtualState;
use anyhow::Result;
use regex::Regex;
use std::collections::BTreeSet;

/// Ordered, validated list of virtual states.
///
/// State values are always contiguous `0..len`, maintained across inserts
/// and removals. Duplicate states (per [`VirtualState`] equality, which
/// treats an empty state and a default state as the same condition) are
/// refused without mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct StateList {
    states: Vec<VirtualState>,
    needs_default: bool,
}

impl StateList {
    /// Creates an empty list.
    #[must_use]
    pub const fn new(needs_default: bool) -> Self {
        Self {
            states: Vec::new(),
            needs_default,
        }
    }

    /// Whether this list is required to contain exactly one default state.
    #[must_use]
    pub const fn needs_default(&self) -> bool {
        self.needs_default
    }

    /// States in value order.
    #[must_use]
    pub fn states(&self) -> &[VirtualState] {
        &self.states
    }

    /// Number of states.
    #[must_use]
    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    /// Appends a state, assigning it the next value.
    ///
    /// Returns false without mutation when an equal state already exists.
    pub fn push_state(&mut self, mut state: VirtualState) -> bool {
        if self.states.contains(&state) {
            return false;
        }
        state.set_value(self.states.len() as i32);
        self.states.push(state);
        true
    }

    /// Inserts a state at the front as value 0, shifting every other
    /// state's value up by one.
    ///
    /// Returns false without mutation when an equal state already exists.
    pub fn push_state_front(&mut self, mut state: VirtualState) -> bool {
        if self.states.contains(&state) {
            return false;
        }
        state.set_value(0);
        self.states.insert(0, state);
        for (index, existing) in self.states.iter_mut().enumerate().skip(1) {
            existing.set_value(index as i32);
        }
        true
    }

    /// Removes the state at `index`, decrementing the value of every state
    /// after it so values stay contiguous.
    pub fn remove_state(&mut self, index: usize) -> Option<VirtualState> {
        if index >= self.states.len() {
            return None;
        }
        let removed = self.states.remove(index);
        for (position, state) in self.states.iter_mut().enumerate().skip(index) {
            state.set_value(position as i32);
        }
        Some(removed)
    }

    /// Validity of the whole list: at least two states, every state valid,
    /// at most one default state, and exactly one default state when this
    /// list requires one.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if self.states.len() < 2 {
            return false;
        }
        if !self.states.iter().all(VirtualState::is_valid) {
            return false;
        }
        let defaults = self.states.iter().filter(|s| s.is_default()).count();
        if self.needs_default {
            defaults == 1
        } else {
            defaults <= 1
        }
    }

    /// Sorted union of the controls read by any state in this list.
    #[must_use]
    pub fn controls(&self) -> BTreeSet<Control> {
        self.states
            .iter()
            .flat_map(VirtualState::controls)
            .collect()
    }
}

/// A user-named synthetic control, usable anywhere a physical control is.
///
/// States keep declaration order; the first declared state is value 0.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualControl {
    name: String,
    code: i32,
    states: StateList,
}

impl VirtualControl {
    /// Creates a virtual control with a validated identifier-like name.
    pub fn new(name: impl Into<String>, code: i32) -> Result<Self> {
        let name = name.into();
        Self::validate_name(&name)?;
        Ok(Self {
            name,
            code,
            states: StateList::new(false),
        })
    }

    /// Validates a virtual control name (identifier-like, non-empty).
    pub fn validate_name(name: &str) -> Result<()> {
        let name_regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
        if !name_regex.is_match(name) {
            anyhow::bail!(
                "Invalid virtual control name '{}'. Names must start with a letter or underscore \
                 and contain only letters, digits, and underscores",
                name
            );
        }
        Ok(())
    }

    /// The unique name of this control.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declaration code of this control.
    #[must_use]
    pub const fn code(&self) -> i32 {
        self.code
    }

    /// The control identity this virtual control is referenced by.
    #[must_use]
    pub const fn control(&self) -> Control {
        Control::virtual_control(self.code)
    }

    /// Adds a state; the new state's value is the current state count.
    ///
    /// Returns false without mutation when an equal state already exists.
    pub fn add_state(&mut self, state: VirtualState) -> bool {
        self.states.push_state(state)
    }

    /// Removes the state at `index`, keeping values contiguous.
    pub fn remove_state(&mut self, index: usize) -> Option<VirtualState> {
        self.states.remove_state(index)
    }

    /// States in value order.
    #[must_use]
    pub fn states(&self) -> &[VirtualState] {
        self.states.states()
    }

    /// Number of declared states.
    #[must_use]
    pub fn num_states(&self) -> usize {
        self.states.num_states()
    }

    /// See [`StateList::is_valid`].
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.states.is_valid()
    }

    /// Controls read by this virtual control's states.
    #[must_use]
    pub fn controls(&self) -> BTreeSet<Control> {
        self.states.controls()
    }
}

/// An anonymous modal layer. Its position in the profile's shift level
/// list is its nesting depth in every handler tree.
///
/// A shift level always needs a default state, and the default state is
/// always value 0: adding one moves it to the front and shifts every other
/// state's value up by one.
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftLevel {
    states: StateList,
}

impl ShiftLevel {
    /// Creates an empty shift level.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            states: StateList::new(true),
        }
    }

    /// Adds a state. A default state is inserted at value 0, shifting all
    /// other values up by one; any other state is appended.
    ///
    /// Returns false without mutation when an equal state already exists.
    pub fn add_state(&mut self, state: VirtualState) -> bool {
        if state.is_default() {
            self.states.push_state_front(state)
        } else {
            self.states.push_state(state)
        }
    }

    /// Removes the state at `index`, keeping values contiguous.
    pub fn remove_state(&mut self, index: usize) -> Option<VirtualState> {
        self.states.remove_state(index)
    }

    /// States in value order (default first once added).
    #[must_use]
    pub fn states(&self) -> &[VirtualState] {
        self.states.states()
    }

    /// Number of declared states.
    #[must_use]
    pub fn num_states(&self) -> usize {
        self.states.num_states()
    }

    /// See [`StateList::is_valid`].
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.states.is_valid()
    }

    /// Controls read by this shift level's states.
    #[must_use]
    pub fn controls(&self) -> BTreeSet<Control> {
        self.states.controls()
    }
}

impl Default for ShiftLevel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::control::ControlConstraint;

    fn state_with(code: i32, value: i32) -> VirtualState {
        let mut state = VirtualState::new();
        state
            .add_constraint(ControlConstraint::single(Control::key(code), value, (0, 1)).unwrap())
            .unwrap();
        state
    }

    #[test]
    fn test_virtual_control_name_validation() {
        assert!(VirtualControl::new("mode", 0).is_ok());
        assert!(VirtualControl::new("_hat_mode2", 0).is_ok());
        assert!(VirtualControl::new("", 0).is_err());
        assert!(VirtualControl::new("2modes", 0).is_err());
        assert!(VirtualControl::new("with space", 0).is_err());
        assert!(VirtualControl::new("with-dash", 0).is_err());
    }

    #[test]
    fn test_virtual_control_appends_in_order() {
        let mut vc = VirtualControl::new("mode", 0).unwrap();
        assert!(vc.add_state(state_with(288, 1)));
        assert!(vc.add_state(state_with(289, 1)));

        assert_eq!(vc.states()[0].value(), Some(0));
        assert_eq!(vc.states()[1].value(), Some(1));
    }

    #[test]
    fn test_add_state_rejects_duplicate() {
        let mut vc = VirtualControl::new("mode", 0).unwrap();
        assert!(vc.add_state(state_with(288, 1)));
        assert!(!vc.add_state(state_with(288, 1)));
        assert_eq!(vc.num_states(), 1);
    }

    #[test]
    fn test_add_state_rejects_second_default() {
        let mut vc = VirtualControl::new("mode", 0).unwrap();
        assert!(vc.add_state(VirtualState::new()));
        // A constrained-but-default state duplicates the empty default.
        assert!(!vc.add_state(state_with(288, 0)));
        // And the other way around.
        let mut vc2 = VirtualControl::new("mode2", 1).unwrap();
        assert!(vc2.add_state(state_with(288, 0)));
        assert!(!vc2.add_state(VirtualState::new()));
    }

    #[test]
    fn test_shift_level_moves_default_to_front() {
        let mut level = ShiftLevel::new();
        assert!(level.add_state(state_with(288, 1)));
        assert!(level.add_state(state_with(289, 1)));
        assert!(level.add_state(VirtualState::new()));

        let states = level.states();
        assert_eq!(states.len(), 3);
        assert!(states[0].is_default());
        assert_eq!(states[0].value(), Some(0));
        // Previously added states shifted up by one.
        assert_eq!(states[1].value(), Some(1));
        assert_eq!(states[2].value(), Some(2));
    }

    #[test]
    fn test_shift_level_validity_requires_default() {
        let mut level = ShiftLevel::new();
        level.add_state(state_with(288, 1));
        level.add_state(state_with(289, 1));
        assert!(!level.is_valid());

        level.add_state(VirtualState::new());
        assert!(level.is_valid());
    }

    #[test]
    fn test_virtual_control_validity() {
        let mut vc = VirtualControl::new("mode", 0).unwrap();
        assert!(!vc.is_valid());
        vc.add_state(state_with(288, 1));
        assert!(!vc.is_valid());
        vc.add_state(state_with(289, 1));
        // Two states, no default required.
        assert!(vc.is_valid());
    }

    #[test]
    fn test_remove_state_renumbers() {
        let mut vc = VirtualControl::new("mode", 0).unwrap();
        vc.add_state(state_with(288, 1));
        vc.add_state(state_with(289, 1));
        vc.add_state(state_with(290, 1));

        let removed = vc.remove_state(1).unwrap();
        assert_eq!(removed.value(), Some(1));
        assert_eq!(vc.num_states(), 2);
        assert_eq!(vc.states()[0].value(), Some(0));
        assert_eq!(vc.states()[1].value(), Some(1));
    }

    #[test]
    fn test_controls_union() {
        let mut vc = VirtualControl::new("mode", 0).unwrap();
        let mut s1 = state_with(288, 1);
        s1.add_constraint(
            ControlConstraint::range(Control::axis(0), 100, 200, (-32768, 32767)).unwrap(),
        )
        .unwrap();
        vc.add_state(s1);
        vc.add_state(state_with(288, 0));

        let controls = vc.controls();
        assert_eq!(controls.len(), 2);
        assert!(controls.contains(&Control::key(288)));
        assert!(controls.contains(&Control::axis(0)));
    }
}

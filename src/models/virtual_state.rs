//! Virtual states: named conditions built from constraint conjunctions.

use crate::models::control::{Control, ControlConstraint};
use anyhow::Result;

/// One condition of a virtual control or shift level: a conjunction of
/// constraints over other controls.
///
/// The constraint list is kept in canonical sort order with at most one
/// constraint per distinct control. The state's numeric value is assigned
/// by the owning state list when the state is adopted and never by callers.
#[derive(Debug, Clone)]
pub struct VirtualState {
    /// Value within the owning state list; `None` until adopted.
    value: Option<i32>,
    /// Sorted constraints, at most one per distinct control.
    constraints: Vec<ControlConstraint>,
}

impl VirtualState {
    /// Creates an empty (default) state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: None,
            constraints: Vec::new(),
        }
    }

    /// The value assigned by the owning state list, if adopted.
    #[must_use]
    pub const fn value(&self) -> Option<i32> {
        self.value
    }

    pub(crate) fn set_value(&mut self, value: i32) {
        self.value = Some(value);
    }

    /// The constraints of this state, in canonical order.
    #[must_use]
    pub fn constraints(&self) -> &[ControlConstraint] {
        &self.constraints
    }

    /// Inserts a constraint keeping the canonical sort order.
    ///
    /// # Errors
    ///
    /// Rejects a second constraint on a control this state already
    /// constrains.
    pub fn add_constraint(&mut self, constraint: ControlConstraint) -> Result<()> {
        let control = constraint.control();
        if self.constraints.iter().any(|c| c.control() == control) {
            anyhow::bail!("State already has a constraint on {}", control);
        }

        let position = self
            .constraints
            .iter()
            .position(|c| *c > constraint)
            .unwrap_or(self.constraints.len());
        self.constraints.insert(position, constraint);
        Ok(())
    }

    /// True when every constraint holds at the controls' rest values, or
    /// when the state has no constraints at all.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.constraints.iter().all(ControlConstraint::is_default)
    }

    /// Structural validity of this state.
    ///
    /// The one-constraint-per-control rule is already enforced by
    /// [`Self::add_constraint`]. Detection of mutually unsatisfiable
    /// constraints (e.g. contradictory ranges over linked controls) is not
    /// implemented; states that pass here may still be unreachable at
    /// runtime.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        true
    }

    /// Controls referenced by this state's constraints.
    pub fn controls(&self) -> impl Iterator<Item = Control> + '_ {
        self.constraints.iter().map(ControlConstraint::control)
    }
}

impl Default for VirtualState {
    fn default() -> Self {
        Self::new()
    }
}

/// Duplicate-detection equality, used by state lists to refuse states that
/// describe the same condition twice.
///
/// Two states with non-empty constraint lists are equal when their lists
/// are equal element-wise (both lists are canonically sorted). A state with
/// an empty list is equal to another state exactly when that other state is
/// default: an empty state *is* the default condition, so a second default
/// state — constrained or not — collides with it. The relation is not
/// transitive across distinct constrained default states, so `Eq` is
/// deliberately not implemented.
impl PartialEq for VirtualState {
    fn eq(&self, other: &Self) -> bool {
        if self.constraints.is_empty() {
            return other.is_default();
        }
        if other.constraints.is_empty() {
            return self.is_default();
        }
        self.constraints == other.constraints
    }
}

//! Control identity and value constraints.
//!
//! A `Control` names one physical or synthesized input: a key/button, an
//! absolute axis, or a virtual control computed from other controls. A
//! `ControlConstraint` is a predicate over one control's current raw value;
//! conjunctions of constraints form virtual states.

use anyhow::Result;
use std::cmp::Ordering;
use std::fmt;

/// The three families of controls a profile can reference.
///
/// The ordering (Key < Axis < Virtual) is part of the canonical sort key
/// used wherever constraints are deduplicated or stored sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ControlKind {
    /// A momentary button or key. Raw value is 0 (released) or 1 (pressed).
    Key,
    /// An absolute axis. Raw range comes from the device description.
    Axis,
    /// A synthetic control whose state is computed from constraints over
    /// other controls.
    Virtual,
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key => write!(f, "key"),
            Self::Axis => write!(f, "axis"),
            Self::Virtual => write!(f, "virtual"),
        }
    }
}

/// Identity of one control: kind plus numeric code.
///
/// Immutable value object, hashable and totally ordered by (kind, code).
/// Display names for diagnostics and documents are resolved externally
/// (see [`crate::names::NameDb`]); the core only carries codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Control {
    /// Control family.
    pub kind: ControlKind,
    /// Event code (for keys/axes) or declaration index (for virtuals).
    pub code: i32,
}

impl Control {
    /// Creates a key/button control.
    #[must_use]
    pub const fn key(code: i32) -> Self {
        Self {
            kind: ControlKind::Key,
            code,
        }
    }

    /// Creates an absolute-axis control.
    #[must_use]
    pub const fn axis(code: i32) -> Self {
        Self {
            kind: ControlKind::Axis,
            code,
        }
    }

    /// Creates a virtual control reference by declaration code.
    #[must_use]
    pub const fn virtual_control(code: i32) -> Self {
        Self {
            kind: ControlKind::Virtual,
            code,
        }
    }

    /// The value this control reports when untouched.
    ///
    /// Keys rest at 0. Axes and virtual controls have no universal rest
    /// value, so they report `None` and never satisfy a default test.
    #[must_use]
    pub const fn default_value(&self) -> Option<i32> {
        match self.kind {
            ControlKind::Key => Some(0),
            ControlKind::Axis | ControlKind::Virtual => None,
        }
    }

    /// True for controls that exist on the physical device.
    #[must_use]
    pub const fn is_raw(&self) -> bool {
        matches!(self.kind, ControlKind::Key | ControlKind::Axis)
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.code)
    }
}

/// A predicate over one control's current value.
///
/// Constructors validate the value(s) against the control's raw range,
/// which the caller supplies from the device description (keys are fixed
/// to {0, 1}; virtual controls to their declared state values).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlConstraint {
    /// Satisfied when the control's value equals `value` exactly.
    Single {
        /// Constrained control.
        control: Control,
        /// Required value.
        value: i32,
    },
    /// Satisfied when the control's value lies in `from..=to`.
    Range {
        /// Constrained control.
        control: Control,
        /// Inclusive lower bound.
        from: i32,
        /// Inclusive upper bound.
        to: i32,
    },
}

impl ControlConstraint {
    /// Creates a single-value constraint, validating `value` against the
    /// supplied inclusive bounds.
    pub fn single(control: Control, value: i32, bounds: (i32, i32)) -> Result<Self> {
        check_in_bounds(control, value, bounds)?;
        Ok(Self::Single { control, value })
    }

    /// Creates a range constraint, validating `from <= to` and both ends
    /// against the supplied inclusive bounds.
    pub fn range(control: Control, from: i32, to: i32, bounds: (i32, i32)) -> Result<Self> {
        if from > to {
            anyhow::bail!(
                "Constraint range on {} {} is inverted ({} > {})",
                control.kind,
                control.code,
                from,
                to
            );
        }
        check_in_bounds(control, from, bounds)?;
        check_in_bounds(control, to, bounds)?;
        Ok(Self::Range { control, from, to })
    }

    /// The control this constraint reads.
    #[must_use]
    pub const fn control(&self) -> Control {
        match self {
            Self::Single { control, .. } | Self::Range { control, .. } => *control,
        }
    }

    /// True when the constrained value set contains the control's default
    /// value. Constraints on axes and virtual controls are never default.
    #[must_use]
    pub fn is_default(&self) -> bool {
        let Some(default) = self.control().default_value() else {
            return false;
        };
        match self {
            Self::Single { value, .. } => *value == default,
            Self::Range { from, to, .. } => (*from..=*to).contains(&default),
        }
    }
}

/// Total order: by control, then kind (single before range), then value(s).
impl Ord for ControlConstraint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.control()
            .cmp(&other.control())
            .then_with(|| match (self, other) {
                (Self::Single { value: a, .. }, Self::Single { value: b, .. }) => a.cmp(b),
                (Self::Single { .. }, Self::Range { .. }) => Ordering::Less,
                (Self::Range { .. }, Self::Single { .. }) => Ordering::Greater,
                (
                    Self::Range {
                        from: af, to: at, ..
                    },
                    Self::Range {
                        from: bf, to: bt, ..
                    },
                ) => af.cmp(bf).then_with(|| at.cmp(bt)),
            })
    }
}

impl PartialOrd for ControlConstraint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounds check shared by the constraint constructors.
fn check_in_bounds(control: Control, value: i32, bounds: (i32, i32)) -> Result<()> {
    let (min, max) = bounds;
    if value < min || value > max {
        anyhow::bail!(
            "Value {} is out of range [{}, {}] for {} {}",
            value,
            min,
            max,
            control.kind,
            control.code
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_ordering() {
        let mut controls = vec![
            Control::virtual_control(0),
            Control::axis(5),
            Control::key(300),
            Control::key(2),
        ];
        controls.sort();
        assert_eq!(
            controls,
            vec![
                Control::key(2),
                Control::key(300),
                Control::axis(5),
                Control::virtual_control(0),
            ]
        );
    }

    #[test]
    fn test_default_value_per_kind() {
        assert_eq!(Control::key(30).default_value(), Some(0));
        assert_eq!(Control::axis(0).default_value(), None);
        assert_eq!(Control::virtual_control(1).default_value(), None);
    }

    #[test]
    fn test_single_constraint_bounds() {
        let key = Control::key(30);
        assert!(ControlConstraint::single(key, 1, (0, 1)).is_ok());
        assert!(ControlConstraint::single(key, 2, (0, 1)).is_err());

        let axis = Control::axis(0);
        assert!(ControlConstraint::single(axis, 4000, (-32768, 32767)).is_ok());
        assert!(ControlConstraint::single(axis, 40000, (-32768, 32767)).is_err());
    }

    #[test]
    fn test_range_constraint_rejects_inverted() {
        let axis = Control::axis(0);
        assert!(ControlConstraint::range(axis, 10, 5, (-32768, 32767)).is_err());
        assert!(ControlConstraint::range(axis, 5, 10, (-32768, 32767)).is_ok());
    }

    #[test]
    fn test_is_default() {
        let key = Control::key(30);
        assert!(ControlConstraint::single(key, 0, (0, 1)).unwrap().is_default());
        assert!(!ControlConstraint::single(key, 1, (0, 1)).unwrap().is_default());
        assert!(ControlConstraint::range(key, 0, 1, (0, 1)).unwrap().is_default());

        // Axes have no default value, so nothing on them is default.
        let axis = Control::axis(2);
        assert!(!ControlConstraint::range(axis, -100, 100, (-32768, 32767))
            .unwrap()
            .is_default());
    }

    #[test]
    fn test_constraint_ordering() {
        let key = Control::key(30);
        let single0 = ControlConstraint::single(key, 0, (0, 1)).unwrap();
        let single1 = ControlConstraint::single(key, 1, (0, 1)).unwrap();
        let range = ControlConstraint::range(key, 0, 1, (0, 1)).unwrap();
        let other = ControlConstraint::single(Control::axis(0), 5, (-10, 10)).unwrap();

        // Same control: singles before ranges, singles by value.
        assert!(single0 < single1);
        assert!(single1 < range);
        // Different controls: control order dominates.
        assert!(range < other);
    }
}

//! Control profiles: the dispatch structure bound to one control.

use crate::models::control::{Control, ControlKind};
use crate::models::handler::HandlerTree;
use anyhow::Result;
use std::collections::BTreeMap;

/// Dispatch for a physical key: one handler tree entered whenever the raw
/// value is non-zero (raw 0 always maps to the implicit no-action state).
#[derive(Debug, Clone, PartialEq)]
pub struct KeyProfile {
    /// The key this profile is bound to.
    pub control: Control,
    /// Dispatch tree over the profile's shift levels.
    pub tree: HandlerTree,
}

impl KeyProfile {
    /// Creates a key profile. The control must be a key.
    pub fn new(control: Control, tree: HandlerTree) -> Result<Self> {
        if control.kind != ControlKind::Key {
            anyhow::bail!("Key profiles can only be bound to keys, not {}", control.kind);
        }
        Ok(Self { control, tree })
    }
}

/// Dispatch for a virtual control: one independent handler tree per
/// declared state value. The virtual control's own state is the outer
/// dispatch key, not a nested shift branch; states without a tree resolve
/// to the no-action state.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualControlProfile {
    /// The virtual control this profile is bound to.
    pub control: Control,
    /// Handler trees keyed by the virtual control's state value.
    pub trees: BTreeMap<i32, HandlerTree>,
}

impl VirtualControlProfile {
    /// Creates an empty virtual control profile. The control must be
    /// virtual.
    pub fn new(control: Control) -> Result<Self> {
        if control.kind != ControlKind::Virtual {
            anyhow::bail!(
                "Virtual control profiles can only be bound to virtual controls, not {}",
                control.kind
            );
        }
        Ok(Self {
            control,
            trees: BTreeMap::new(),
        })
    }

    /// Binds a tree to one state value of the virtual control.
    pub fn set_tree(&mut self, state_value: i32, tree: HandlerTree) -> Result<()> {
        if self.trees.contains_key(&state_value) {
            anyhow::bail!(
                "Duplicate handler tree for state {} of {}",
                state_value,
                self.control
            );
        }
        self.trees.insert(state_value, tree);
        Ok(())
    }
}

/// The closed set of control profile shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlProfile {
    /// Physical key dispatch.
    Key(KeyProfile),
    /// Virtual control dispatch.
    Virtual(VirtualControlProfile),
}

impl ControlProfile {
    /// The control this profile is bound to.
    #[must_use]
    pub const fn control(&self) -> Control {
        match self {
            Self::Key(profile) => profile.control,
            Self::Virtual(profile) => profile.control,
        }
    }

    /// Every handler tree of this profile, in dispatch order.
    pub fn trees(&self) -> Box<dyn Iterator<Item = &HandlerTree> + '_> {
        match self {
            Self::Key(profile) => Box::new(std::iter::once(&profile.tree)),
            Self::Virtual(profile) => Box::new(profile.trees.values()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_profile_requires_key() {
        assert!(KeyProfile::new(Control::key(304), HandlerTree::new()).is_ok());
        assert!(KeyProfile::new(Control::axis(0), HandlerTree::new()).is_err());
        assert!(KeyProfile::new(Control::virtual_control(0), HandlerTree::new()).is_err());
    }

    #[test]
    fn test_virtual_profile_requires_virtual() {
        assert!(VirtualControlProfile::new(Control::virtual_control(0)).is_ok());
        assert!(VirtualControlProfile::new(Control::key(304)).is_err());
    }

    #[test]
    fn test_virtual_profile_rejects_duplicate_state() {
        let mut profile = VirtualControlProfile::new(Control::virtual_control(0)).unwrap();
        profile.set_tree(1, HandlerTree::new()).unwrap();
        assert!(profile.set_tree(1, HandlerTree::new()).is_err());
        profile.set_tree(0, HandlerTree::new()).unwrap();

        // Trees iterate in state-value order regardless of insertion.
        let states: Vec<i32> = profile.trees.keys().copied().collect();
        assert_eq!(states, vec![0, 1]);
    }
}

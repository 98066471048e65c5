//! The profile aggregate: identity, virtual controls, shift levels,
//! control profiles, and the dependency analysis feeding code generation.

use crate::models::control::{Control, ControlKind};
use crate::models::control_profile::ControlProfile;
use crate::models::virtual_control::{ShiftLevel, VirtualControl};
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};

/// Device-identity criteria selecting which profile applies to a connected
/// controller. All present fields must match.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdentityMatch {
    /// Case-insensitive substring of the device's display name.
    pub name_contains: Option<String>,
    /// USB vendor id.
    pub vendor: Option<u16>,
    /// USB product id.
    pub product: Option<u16>,
}

impl IdentityMatch {
    /// True when every present criterion matches the given device identity.
    #[must_use]
    pub fn matches(&self, name: &str, vendor: u16, product: u16) -> bool {
        if let Some(fragment) = &self.name_contains {
            if !name.to_lowercase().contains(&fragment.to_lowercase()) {
                return false;
            }
        }
        if self.vendor.is_some_and(|v| v != vendor) {
            return false;
        }
        if self.product.is_some_and(|p| p != product) {
            return false;
        }
        true
    }

    /// True when no criterion is set (matches every device).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name_contains.is_none() && self.vendor.is_none() && self.product.is_none()
    }
}

/// Everything a raw control feeds, directly or transitively through other
/// virtual controls. Indices are declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dependents {
    /// Indices into the profile's virtual control list.
    pub virtual_controls: Vec<usize>,
    /// Indices into the profile's shift level list.
    pub shift_levels: Vec<usize>,
}

/// A complete remapping profile.
///
/// Construction order is enforced: all virtual controls are declared
/// before any shift level, and all shift levels before any control
/// profile. Mutators return errors instead of aborting so interactive
/// editors can surface them; the parser treats any mutator failure as
/// fatal.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Profile {
    /// Profile display name.
    pub name: String,
    /// Device-identity criteria.
    pub identity: IdentityMatch,
    /// Whether the daemon should activate this profile on device match.
    pub auto_load: bool,
    virtual_controls: Vec<VirtualControl>,
    shift_levels: Vec<ShiftLevel>,
    control_profiles: Vec<ControlProfile>,
}

impl Profile {
    /// Creates an empty profile.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            anyhow::bail!("Profile name cannot be empty");
        }
        Ok(Self {
            name,
            ..Self::default()
        })
    }

    /// Declared virtual controls, in declaration order.
    #[must_use]
    pub fn virtual_controls(&self) -> &[VirtualControl] {
        &self.virtual_controls
    }

    /// Declared shift levels; position is nesting depth.
    #[must_use]
    pub fn shift_levels(&self) -> &[ShiftLevel] {
        &self.shift_levels
    }

    /// Configured control profiles, in declaration order.
    #[must_use]
    pub fn control_profiles(&self) -> &[ControlProfile] {
        &self.control_profiles
    }

    /// Looks up a virtual control by name.
    #[must_use]
    pub fn virtual_control_by_name(&self, name: &str) -> Option<&VirtualControl> {
        self.virtual_controls.iter().find(|vc| vc.name() == name)
    }

    /// Looks up a virtual control by declaration code.
    #[must_use]
    pub fn virtual_control_by_code(&self, code: i32) -> Option<&VirtualControl> {
        self.virtual_controls.iter().find(|vc| vc.code() == code)
    }

    /// The next free virtual control code (declaration index).
    #[must_use]
    pub fn next_virtual_control_code(&self) -> i32 {
        self.virtual_controls.len() as i32
    }

    /// Declares a virtual control.
    ///
    /// # Errors
    ///
    /// Fails after any shift level or control profile has been declared
    /// (declaration order is virtual controls, then shift levels, then
    /// controls), or on a duplicate name or code.
    pub fn add_virtual_control(&mut self, control: VirtualControl) -> Result<()> {
        if !self.shift_levels.is_empty() || !self.control_profiles.is_empty() {
            anyhow::bail!(
                "Virtual controls must all be declared before any shift level or control"
            );
        }
        if self.virtual_control_by_name(control.name()).is_some() {
            anyhow::bail!("Duplicate virtual control name '{}'", control.name());
        }
        if self.virtual_control_by_code(control.code()).is_some() {
            anyhow::bail!("Duplicate virtual control code {}", control.code());
        }
        self.virtual_controls.push(control);
        Ok(())
    }

    /// Declares a shift level at the next nesting depth.
    ///
    /// # Errors
    ///
    /// Fails after any control profile has been declared.
    pub fn add_shift_level(&mut self, level: ShiftLevel) -> Result<()> {
        if !self.control_profiles.is_empty() {
            anyhow::bail!("Shift levels must all be declared before any control");
        }
        self.shift_levels.push(level);
        Ok(())
    }

    /// Binds a control profile.
    ///
    /// # Errors
    ///
    /// Fails on a second profile for the same control, or on a virtual
    /// control profile whose control was never declared.
    pub fn add_control_profile(&mut self, profile: ControlProfile) -> Result<()> {
        let control = profile.control();
        if self.control_profiles.iter().any(|p| p.control() == control) {
            anyhow::bail!("Duplicate control profile for {}", control);
        }
        if control.kind == ControlKind::Virtual
            && self.virtual_control_by_code(control.code).is_none()
        {
            anyhow::bail!("Control profile references undeclared virtual control {}", control.code);
        }
        self.control_profiles.push(profile);
        Ok(())
    }

    /// The control profile bound to `control`, if any.
    #[must_use]
    pub fn control_profile_for(&self, control: Control) -> Option<&ControlProfile> {
        self.control_profiles
            .iter()
            .find(|p| p.control() == control)
    }

    /// State counts of the shift levels, outermost first — the shape every
    /// complete handler tree must tile.
    #[must_use]
    pub fn shift_state_counts(&self) -> Vec<usize> {
        self.shift_levels.iter().map(ShiftLevel::num_states).collect()
    }

    /// Resolves the raw (physical) controls a virtual control reads,
    /// following references through earlier-declared virtual controls.
    #[must_use]
    pub fn raw_controls_of(&self, vc_index: usize) -> BTreeSet<Control> {
        let mut raw = BTreeSet::new();
        self.collect_raw(&self.virtual_controls[vc_index].controls(), &mut raw);
        raw
    }

    fn collect_raw(&self, controls: &BTreeSet<Control>, raw: &mut BTreeSet<Control>) {
        for control in controls {
            if control.is_raw() {
                raw.insert(*control);
            } else if let Some(vc) = self.virtual_control_by_code(control.code) {
                self.collect_raw(&vc.controls(), raw);
            }
        }
    }

    /// Builds the static dependency map: every raw control that at least
    /// one virtual control or shift level reads (directly or transitively
    /// through other virtual controls), with its dependents listed in
    /// declaration order.
    #[must_use]
    pub fn dependency_map(&self) -> BTreeMap<Control, Dependents> {
        let mut map: BTreeMap<Control, Dependents> = BTreeMap::new();

        for (index, _) in self.virtual_controls.iter().enumerate() {
            for raw in self.raw_controls_of(index) {
                map.entry(raw).or_default().virtual_controls.push(index);
            }
        }
        for (index, level) in self.shift_levels.iter().enumerate() {
            let mut raw = BTreeSet::new();
            self.collect_raw(&level.controls(), &mut raw);
            for control in raw {
                map.entry(control).or_default().shift_levels.push(index);
            }
        }
        map
    }

    /// Every raw control the generated runtime must react to: controls
    /// with their own profile plus controls something depends on, in
    /// canonical control order.
    #[must_use]
    pub fn reactive_raw_controls(&self) -> BTreeSet<Control> {
        let mut controls: BTreeSet<Control> = self.dependency_map().keys().copied().collect();
        for profile in &self.control_profiles {
            let control = profile.control();
            if control.is_raw() {
                controls.insert(control);
            }
        }
        controls
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::control::ControlConstraint;
    use crate::models::control_profile::{KeyProfile, VirtualControlProfile};
    use crate::models::handler::HandlerTree;
    use crate::models::virtual_state::VirtualState;

    fn state_on_key(code: i32) -> VirtualState {
        let mut state = VirtualState::new();
        state
            .add_constraint(ControlConstraint::single(Control::key(code), 1, (0, 1)).unwrap())
            .unwrap();
        state
    }

    fn state_on_virtual(code: i32, value: i32, bound: i32) -> VirtualState {
        let mut state = VirtualState::new();
        state
            .add_constraint(
                ControlConstraint::single(Control::virtual_control(code), value, (0, bound))
                    .unwrap(),
            )
            .unwrap();
        state
    }

    fn two_state_vc(name: &str, code: i32, key: i32) -> VirtualControl {
        let mut vc = VirtualControl::new(name, code).unwrap();
        vc.add_state(state_on_key(key));
        vc.add_state(VirtualState::new());
        vc
    }

    fn shift_level_on_key(key: i32) -> ShiftLevel {
        let mut level = ShiftLevel::new();
        level.add_state(VirtualState::new());
        level.add_state(state_on_key(key));
        level
    }

    #[test]
    fn test_declaration_order_enforced() {
        let mut profile = Profile::new("Test").unwrap();
        profile.add_shift_level(shift_level_on_key(293)).unwrap();

        // Virtual controls may not follow shift levels.
        assert!(profile
            .add_virtual_control(two_state_vc("mode", 0, 288))
            .is_err());

        profile
            .add_control_profile(ControlProfile::Key(
                KeyProfile::new(Control::key(304), HandlerTree::new()).unwrap(),
            ))
            .unwrap();

        // Shift levels may not follow controls.
        assert!(profile.add_shift_level(shift_level_on_key(294)).is_err());
    }

    #[test]
    fn test_duplicate_names_and_profiles_rejected() {
        let mut profile = Profile::new("Test").unwrap();
        profile
            .add_virtual_control(two_state_vc("mode", 0, 288))
            .unwrap();
        assert!(profile
            .add_virtual_control(two_state_vc("mode", 1, 289))
            .is_err());
        assert!(profile
            .add_virtual_control(two_state_vc("other", 0, 289))
            .is_err());

        profile
            .add_control_profile(ControlProfile::Key(
                KeyProfile::new(Control::key(304), HandlerTree::new()).unwrap(),
            ))
            .unwrap();
        assert!(profile
            .add_control_profile(ControlProfile::Key(
                KeyProfile::new(Control::key(304), HandlerTree::new()).unwrap(),
            ))
            .is_err());
    }

    #[test]
    fn test_virtual_profile_requires_declared_control() {
        let mut profile = Profile::new("Test").unwrap();
        let result = profile.add_control_profile(ControlProfile::Virtual(
            VirtualControlProfile::new(Control::virtual_control(7)).unwrap(),
        ));
        assert!(result.is_err());
    }

    #[test]
    fn test_dependency_map_direct() {
        let mut profile = Profile::new("Test").unwrap();
        profile
            .add_virtual_control(two_state_vc("mode", 0, 288))
            .unwrap();
        profile.add_shift_level(shift_level_on_key(293)).unwrap();

        let map = profile.dependency_map();
        assert_eq!(map.len(), 2);

        let mode_deps = &map[&Control::key(288)];
        assert_eq!(mode_deps.virtual_controls, vec![0]);
        assert!(mode_deps.shift_levels.is_empty());

        let shift_deps = &map[&Control::key(293)];
        assert!(shift_deps.virtual_controls.is_empty());
        assert_eq!(shift_deps.shift_levels, vec![0]);
    }

    #[test]
    fn test_dependency_map_transitive() {
        let mut profile = Profile::new("Test").unwrap();
        profile
            .add_virtual_control(two_state_vc("inner", 0, 288))
            .unwrap();

        // A second virtual control reading the first one.
        let mut outer = VirtualControl::new("outer", 1).unwrap();
        outer.add_state(state_on_virtual(0, 0, 1));
        outer.add_state(VirtualState::new());
        profile.add_virtual_control(outer).unwrap();

        // A shift level reading the outer virtual control.
        let mut level = ShiftLevel::new();
        level.add_state(VirtualState::new());
        level.add_state(state_on_virtual(1, 0, 1));
        profile.add_shift_level(level).unwrap();

        let map = profile.dependency_map();
        // Everything bottoms out on the one raw key.
        assert_eq!(map.len(), 1);
        let deps = &map[&Control::key(288)];
        assert_eq!(deps.virtual_controls, vec![0, 1]);
        assert_eq!(deps.shift_levels, vec![0]);
    }

    #[test]
    fn test_reactive_raw_controls() {
        let mut profile = Profile::new("Test").unwrap();
        profile
            .add_virtual_control(two_state_vc("mode", 0, 288))
            .unwrap();
        profile
            .add_control_profile(ControlProfile::Key(
                KeyProfile::new(Control::key(304), HandlerTree::new()).unwrap(),
            ))
            .unwrap();

        let reactive = profile.reactive_raw_controls();
        assert!(reactive.contains(&Control::key(288)));
        assert!(reactive.contains(&Control::key(304)));
        assert_eq!(reactive.len(), 2);
    }

    #[test]
    fn test_identity_match() {
        let identity = IdentityMatch {
            name_contains: Some("thrust".to_string()),
            vendor: Some(0x044f),
            product: None,
        };
        assert!(identity.matches("Thrustmaster T.16000M", 0x044f, 0xb10a));
        assert!(!identity.matches("Thrustmaster T.16000M", 0x045e, 0xb10a));
        assert!(!identity.matches("Logitech X52", 0x044f, 0xb10a));
        assert!(IdentityMatch::default().matches("anything", 0, 0));
    }
}

//! Core data model: controls, constraints, states, handler trees,
//! actions, and the profile aggregate.

pub mod action;
pub mod control;
pub mod control_profile;
pub mod handler;
pub mod profile;
pub mod virtual_control;
pub mod virtual_state;

pub use action::{Action, AdvancedAction, Command, KeyCombination, SimpleAction};
pub use control::{Control, ControlConstraint, ControlKind};
pub use control_profile::{ControlProfile, KeyProfile, VirtualControlProfile};
pub use handler::{HandlerChild, HandlerTree, ShiftHandler, StateVisitor};
pub use profile::{Dependents, IdentityMatch, Profile};
pub use virtual_control::{ShiftLevel, StateList, VirtualControl};
pub use virtual_state::VirtualState;

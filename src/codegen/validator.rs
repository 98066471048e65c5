//! Profile validation before generation.
//!
//! The parser already refuses invalid documents; this validator covers
//! profiles assembled programmatically (where mutators allow transient
//! invalid states) and produces a structured report the `validate` command
//! prints.

use crate::models::{
    Action, Control, ControlKind, ControlProfile, HandlerChild, HandlerTree, Profile,
};
use std::collections::BTreeSet;
use std::fmt;

/// Validation result with specific errors and warnings.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Critical errors that prevent runtime generation.
    pub errors: Vec<ValidationError>,
    /// Non-critical findings.
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    /// Creates an empty report.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// True when there are no errors (warnings are allowed).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Adds an error to the report.
    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Adds a warning to the report.
    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Formats the report as a user-facing message.
    #[must_use]
    pub fn format_message(&self) -> String {
        let mut message = String::new();

        if !self.errors.is_empty() {
            message.push_str(&format!("{} validation error(s):\n", self.errors.len()));
            for (index, error) in self.errors.iter().enumerate() {
                message.push_str(&format!("  {}. {}\n", index + 1, error));
            }
        }

        if !self.warnings.is_empty() {
            message.push_str(&format!("\n{} warning(s):\n", self.warnings.len()));
            for (index, warning) in self.warnings.iter().enumerate() {
                message.push_str(&format!("  {}. {}\n", index + 1, warning));
            }
        }

        message
    }
}

/// Types of validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// A virtual control breaks the state-list invariants.
    InvalidVirtualControl,
    /// A shift level breaks the state-list invariants.
    InvalidShiftLevel,
    /// A handler tree does not tile its shift levels.
    IncompleteHandlerTree,
    /// A dispatch references a state the control does not declare.
    UnknownState,
    /// An action variant with no generatable form.
    UnsupportedAction,
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidVirtualControl => write!(f, "Invalid Virtual Control"),
            Self::InvalidShiftLevel => write!(f, "Invalid Shift Level"),
            Self::IncompleteHandlerTree => write!(f, "Incomplete Handler Tree"),
            Self::UnknownState => write!(f, "Unknown State"),
            Self::UnsupportedAction => write!(f, "Unsupported Action"),
        }
    }
}

/// Validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Type of validation error.
    pub kind: ValidationErrorKind,
    /// Human-readable error message.
    pub message: String,
    /// Optional suggestion for fixing the error.
    pub suggestion: Option<String>,
}

impl ValidationError {
    /// Creates a new validation error.
    pub fn new(kind: ValidationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            suggestion: None,
        }
    }

    /// Sets a suggestion for fixing the error.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n    -> {suggestion}")?;
        }
        Ok(())
    }
}

/// Validation warning (non-blocking).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// Warning message.
    pub message: String,
}

impl ValidationWarning {
    /// Creates a new validation warning.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Profile validator.
pub struct ProfileValidator<'a> {
    profile: &'a Profile,
}

impl<'a> ProfileValidator<'a> {
    /// Creates a validator over a profile.
    #[must_use]
    pub const fn new(profile: &'a Profile) -> Self {
        Self { profile }
    }

    /// Validates the profile for runtime generation.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::new();

        for vc in self.profile.virtual_controls() {
            if !vc.is_valid() {
                report.add_error(
                    ValidationError::new(
                        ValidationErrorKind::InvalidVirtualControl,
                        format!(
                            "Virtual control '{}' has {} state(s)",
                            vc.name(),
                            vc.num_states()
                        ),
                    )
                    .with_suggestion(
                        "A virtual control needs at least two states and at most one default state",
                    ),
                );
            }
        }

        for (index, level) in self.profile.shift_levels().iter().enumerate() {
            if !level.is_valid() {
                report.add_error(
                    ValidationError::new(
                        ValidationErrorKind::InvalidShiftLevel,
                        format!("Shift level {} has {} state(s)", index, level.num_states()),
                    )
                    .with_suggestion(
                        "A shift level needs at least two states and exactly one default state",
                    ),
                );
            }
        }

        let state_counts = self.profile.shift_state_counts();
        for control_profile in self.profile.control_profiles() {
            self.validate_control_profile(&mut report, control_profile, &state_counts);
        }

        self.warn_unused_virtual_controls(&mut report);

        if self.profile.control_profiles().is_empty() {
            report.add_warning(ValidationWarning::new(
                "Profile configures no controls; the generated runtime does nothing",
            ));
        }

        report
    }

    fn validate_control_profile(
        &self,
        report: &mut ValidationReport,
        control_profile: &ControlProfile,
        state_counts: &[usize],
    ) {
        let control = control_profile.control();
        let label = self.control_label(control);

        match control_profile {
            ControlProfile::Key(key_profile) => {
                if !key_profile.tree.is_complete_deep(state_counts) {
                    report.add_error(
                        ValidationError::new(
                            ValidationErrorKind::IncompleteHandlerTree,
                            format!("Handler tree of {label} does not tile the shift levels"),
                        )
                        .with_suggestion("Cover every shift state exactly once at every depth"),
                    );
                }
            }
            ControlProfile::Virtual(vc_profile) => {
                let num_states = self
                    .profile
                    .virtual_control_by_code(control.code)
                    .map_or(0, |vc| vc.num_states() as i32);
                for (&value, tree) in &vc_profile.trees {
                    if value < 0 || value >= num_states {
                        report.add_error(
                            ValidationError::new(
                                ValidationErrorKind::UnknownState,
                                format!("{label} dispatches on undeclared state {value}"),
                            )
                            .with_suggestion(format!(
                                "Declared states are 0..{}",
                                num_states - 1
                            )),
                        );
                    }
                    if !tree.is_complete_deep(state_counts) {
                        report.add_error(
                            ValidationError::new(
                                ValidationErrorKind::IncompleteHandlerTree,
                                format!(
                                    "Handler tree of {label} (state {value}) does not tile the shift levels"
                                ),
                            )
                            .with_suggestion("Cover every shift state exactly once at every depth"),
                        );
                    }
                }
            }
        }

        for tree in control_profile.trees() {
            self.check_actions(report, tree, &label);
        }
    }

    fn check_actions(&self, report: &mut ValidationReport, tree: &HandlerTree, label: &str) {
        for child in tree.children() {
            match child {
                HandlerChild::Action(Action::Script) => {
                    report.add_error(
                        ValidationError::new(
                            ValidationErrorKind::UnsupportedAction,
                            format!("{label} uses a script action"),
                        )
                        .with_suggestion("Script actions have no defined runtime form yet"),
                    );
                }
                HandlerChild::Action(Action::Simple(_) | Action::Advanced(_)) => {}
                HandlerChild::Shift(handler) => self.check_actions(report, handler.tree(), label),
            }
        }
    }

    /// Flags virtual controls nothing reads and nothing dispatches on,
    /// mirroring how unused definitions are usually surfaced as warnings.
    fn warn_unused_virtual_controls(&self, report: &mut ValidationReport) {
        let mut referenced: BTreeSet<Control> = BTreeSet::new();
        for vc in self.profile.virtual_controls() {
            referenced.extend(vc.controls().iter().filter(|c| c.kind == ControlKind::Virtual));
        }
        for level in self.profile.shift_levels() {
            referenced.extend(level.controls().iter().filter(|c| c.kind == ControlKind::Virtual));
        }
        for control_profile in self.profile.control_profiles() {
            referenced.insert(control_profile.control());
        }

        for vc in self.profile.virtual_controls() {
            if !referenced.contains(&vc.control()) {
                report.add_warning(ValidationWarning::new(format!(
                    "Virtual control '{}' is declared but never used",
                    vc.name()
                )));
            }
        }
    }

    fn control_label(&self, control: Control) -> String {
        match control.kind {
            ControlKind::Virtual => self
                .profile
                .virtual_control_by_code(control.code)
                .map_or_else(
                    || format!("virtual control {}", control.code),
                    |vc| format!("virtual control '{}'", vc.name()),
                ),
            _ => control.to_string(),
        }
    }
}

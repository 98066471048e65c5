//! Validating profile document parser.
//!
//! Single-pass, streaming, element-stack-based: a context stack of open
//! element names is kept while quick-xml events are consumed, and every
//! structural or invariant violation is fatal at the point it is seen —
//! wrong nesting, missing or malformed attributes, duplicate
//! declarations, declaration-order violations, and handler trees that are
//! incomplete when their closing tag is reached. No partial profile is
//! ever returned. Entities are built through the same `Profile` mutators
//! an interactive editor would call; any mutator refusal is promoted to a
//! fatal diagnostic carrying the element path and byte offset.

use crate::models::{
    Action, AdvancedAction, Command, Control, ControlConstraint, ControlProfile, HandlerTree,
    IdentityMatch, KeyCombination, KeyProfile, Profile, ShiftHandler, ShiftLevel, SimpleAction,
    VirtualControl, VirtualControlProfile, VirtualState,
};
use crate::names::NameDb;
use anyhow::{Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::path::Path;

/// Parses a profile document from a file.
pub fn parse_profile(path: &Path, names: &NameDb) -> Result<Profile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read profile file: {}", path.display()))?;
    parse_profile_str(&content, names)
        .with_context(|| format!("Failed to parse profile file: {}", path.display()))
}

/// Parses a profile document from a string.
pub fn parse_profile_str(xml: &str, names: &NameDb) -> Result<Profile> {
    ProfileParser::new(names).run(xml)
}

/// Which top-level sections have been seen, for declaration-order checks.
#[derive(Debug, Default)]
struct Sections {
    matched: bool,
    virtual_controls: bool,
    shift_levels: bool,
    controls: bool,
}

/// A handler tree under construction: the implicit root of a control (or
/// one `forState` branch), or an open `shift` element.
enum TreeFrame {
    Root(HandlerTree),
    Handler(ShiftHandler),
}

impl TreeFrame {
    fn tree_mut(&mut self) -> &mut HandlerTree {
        match self {
            Self::Root(tree) => tree,
            Self::Handler(handler) => handler.tree_mut(),
        }
    }
}

/// The control element currently being populated.
enum CurrentControl {
    Key(Control),
    Virtual {
        control: Control,
        profile: VirtualControlProfile,
        open_state: Option<i32>,
    },
}

/// An action element under construction.
enum ActionBuilder {
    Simple(SimpleAction),
    Advanced {
        action: AdvancedAction,
        target: Option<CommandTarget>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandTarget {
    Enter,
    Repeat,
    Leave,
}

struct ProfileParser<'a> {
    names: &'a NameDb,
    stack: Vec<String>,
    profile: Option<Profile>,
    sections: Sections,
    current_vc: Option<VirtualControl>,
    current_level: Option<ShiftLevel>,
    current_state: Option<VirtualState>,
    current_control: Option<CurrentControl>,
    tree_stack: Vec<TreeFrame>,
    current_action: Option<ActionBuilder>,
}

impl<'a> ProfileParser<'a> {
    fn new(names: &'a NameDb) -> Self {
        Self {
            names,
            stack: Vec::new(),
            profile: None,
            sections: Sections::default(),
            current_vc: None,
            current_level: None,
            current_state: None,
            current_control: None,
            tree_stack: Vec::new(),
            current_action: None,
        }
    }

    fn run(mut self, xml: &str) -> Result<Profile> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);
        let mut buf = Vec::new();

        loop {
            let position = reader.buffer_position();
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => {
                    let name = element_name(e)?;
                    self.handle_start(&name, e, position)?;
                    self.stack.push(name);
                }
                Ok(Event::Empty(ref e)) => {
                    let name = element_name(e)?;
                    self.handle_start(&name, e, position)?;
                    self.stack.push(name.clone());
                    self.handle_end(&name, position)?;
                    self.stack.pop();
                }
                Ok(Event::End(ref e)) => {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    self.handle_end(&name, position)?;
                    self.stack.pop();
                }
                Ok(Event::Text(ref t)) => {
                    let text = t.unescape().unwrap_or_default();
                    if !text.trim().is_empty() {
                        return Err(self.fatal(position, "Unexpected text content"));
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(self.fatal(position, &format!("Malformed XML: {e}")));
                }
            }
            buf.clear();
        }

        if !self.stack.is_empty() {
            anyhow::bail!("Unexpected end of document inside <{}>", self.stack.join("/"));
        }
        self.profile
            .ok_or_else(|| anyhow::anyhow!("Document has no <profile> element"))
    }

    /// Formats a fatal diagnostic with the element path and byte offset.
    fn fatal(&self, position: usize, message: &str) -> anyhow::Error {
        let path = if self.stack.is_empty() {
            "document root".to_string()
        } else {
            format!("<{}>", self.stack.join("/"))
        };
        anyhow::anyhow!("{} (at {}, byte {})", message, path, position)
    }

    fn parent(&self) -> Option<&str> {
        self.stack.last().map(String::as_str)
    }

    fn require_parent(&self, element: &str, allowed: &[&str], position: usize) -> Result<()> {
        let parent = self.parent();
        let ok = match parent {
            Some(name) => allowed.contains(&name),
            None => allowed.is_empty(),
        };
        if !ok {
            let expected = if allowed.is_empty() {
                "the document root".to_string()
            } else {
                allowed
                    .iter()
                    .map(|p| format!("<{p}>"))
                    .collect::<Vec<_>>()
                    .join(" or ")
            };
            return Err(self.fatal(
                position,
                &format!("Element <{element}> is only allowed under {expected}"),
            ));
        }
        Ok(())
    }

    fn profile_mut(&mut self) -> &mut Profile {
        self.profile.as_mut().expect("profile element is open")
    }

    fn handle_start(&mut self, name: &str, e: &BytesStart<'_>, position: usize) -> Result<()> {
        let attrs = attribute_map(e).map_err(|err| self.fatal(position, &err.to_string()))?;
        match name {
            "profile" => self.start_profile(&attrs, position),
            "match" => self.start_match(&attrs, position),
            "virtualControls" => self.start_virtual_controls(position),
            "virtualControl" => self.start_virtual_control(&attrs, position),
            "shiftLevels" => self.start_shift_levels(position),
            "shiftLevel" => self.start_shift_level(position),
            "state" => self.start_state(position),
            "single" | "range" => self.start_constraint(name, &attrs, position),
            "controls" => self.start_controls(position),
            "control" => self.start_control(&attrs, position),
            "forState" => self.start_for_state(&attrs, position),
            "shift" => self.start_shift(&attrs, position),
            "action" => self.start_action(&attrs, position),
            "combination" => self.start_combination(&attrs, position),
            "enter" | "repeat" | "leave" => self.start_command_list(name, position),
            "press" | "release" => self.start_key_command(name, &attrs, position),
            "delay" => self.start_delay(&attrs, position),
            _ => Err(self.fatal(position, &format!("Unknown element <{name}>"))),
        }
    }

    fn handle_end(&mut self, name: &str, position: usize) -> Result<()> {
        match name {
            "virtualControl" => self.end_virtual_control(position),
            "shiftLevel" => self.end_shift_level(position),
            "state" => self.end_state(position),
            "control" => self.end_control(position),
            "forState" => self.end_for_state(position),
            "shift" => self.end_shift(position),
            "action" => self.end_action(position),
            "enter" | "repeat" | "leave" => {
                if let Some(ActionBuilder::Advanced { target, .. }) = &mut self.current_action {
                    *target = None;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    // ----- profile and sections -------------------------------------------

    fn start_profile(&mut self, attrs: &HashMap<String, String>, position: usize) -> Result<()> {
        self.require_parent("profile", &[], position)?;
        if self.profile.is_some() {
            return Err(self.fatal(position, "Duplicate <profile> element"));
        }
        let name = self.required(attrs, "name", position)?;
        let auto_load = match attrs.get("autoLoad") {
            Some(raw) => self.parse_bool(raw, "autoLoad", position)?,
            None => false,
        };
        let mut profile =
            Profile::new(name).map_err(|err| self.fatal(position, &err.to_string()))?;
        profile.auto_load = auto_load;
        self.profile = Some(profile);
        Ok(())
    }

    fn start_match(&mut self, attrs: &HashMap<String, String>, position: usize) -> Result<()> {
        self.require_parent("match", &["profile"], position)?;
        if self.sections.matched {
            return Err(self.fatal(position, "Duplicate <match> element"));
        }
        self.sections.matched = true;
        let identity = IdentityMatch {
            name_contains: attrs.get("name").cloned(),
            vendor: attrs
                .get("vendor")
                .map(|raw| self.parse_u16(raw, "vendor", position))
                .transpose()?,
            product: attrs
                .get("product")
                .map(|raw| self.parse_u16(raw, "product", position))
                .transpose()?,
        };
        self.profile_mut().identity = identity;
        Ok(())
    }

    fn start_virtual_controls(&mut self, position: usize) -> Result<()> {
        self.require_parent("virtualControls", &["profile"], position)?;
        if self.sections.virtual_controls {
            return Err(self.fatal(position, "Duplicate <virtualControls> section"));
        }
        if self.sections.shift_levels || self.sections.controls {
            return Err(self.fatal(
                position,
                "<virtualControls> must be declared before <shiftLevels> and <controls>",
            ));
        }
        self.sections.virtual_controls = true;
        Ok(())
    }

    fn start_virtual_control(
        &mut self,
        attrs: &HashMap<String, String>,
        position: usize,
    ) -> Result<()> {
        self.require_parent("virtualControl", &["virtualControls"], position)?;
        let name = self.required(attrs, "name", position)?;
        let code = self.profile_mut().next_virtual_control_code();
        let vc =
            VirtualControl::new(name, code).map_err(|err| self.fatal(position, &err.to_string()))?;
        if self.profile_mut().virtual_control_by_name(vc.name()).is_some() {
            return Err(self.fatal(
                position,
                &format!("Duplicate virtual control name '{}'", vc.name()),
            ));
        }
        self.current_vc = Some(vc);
        Ok(())
    }

    fn end_virtual_control(&mut self, position: usize) -> Result<()> {
        let vc = self.current_vc.take().expect("virtualControl is open");
        if !vc.is_valid() {
            return Err(self.fatal(
                position,
                &format!(
                    "Virtual control '{}' is invalid: it needs at least two states and at most one default state",
                    vc.name()
                ),
            ));
        }
        self.profile_mut()
            .add_virtual_control(vc)
            .map_err(|err| self.fatal(position, &err.to_string()))
    }

    fn start_shift_levels(&mut self, position: usize) -> Result<()> {
        self.require_parent("shiftLevels", &["profile"], position)?;
        if self.sections.shift_levels {
            return Err(self.fatal(position, "Duplicate <shiftLevels> section"));
        }
        if self.sections.controls {
            return Err(self.fatal(position, "<shiftLevels> must be declared before <controls>"));
        }
        self.sections.shift_levels = true;
        Ok(())
    }

    fn start_shift_level(&mut self, position: usize) -> Result<()> {
        self.require_parent("shiftLevel", &["shiftLevels"], position)?;
        self.current_level = Some(ShiftLevel::new());
        Ok(())
    }

    fn end_shift_level(&mut self, position: usize) -> Result<()> {
        let level = self.current_level.take().expect("shiftLevel is open");
        if !level.is_valid() {
            return Err(self.fatal(
                position,
                "Shift level is invalid: it needs at least two states and exactly one default state",
            ));
        }
        self.profile_mut()
            .add_shift_level(level)
            .map_err(|err| self.fatal(position, &err.to_string()))
    }

    // ----- states and constraints -----------------------------------------

    fn start_state(&mut self, position: usize) -> Result<()> {
        self.require_parent("state", &["virtualControl", "shiftLevel"], position)?;
        self.current_state = Some(VirtualState::new());
        Ok(())
    }

    fn end_state(&mut self, position: usize) -> Result<()> {
        let state = self.current_state.take().expect("state is open");
        let added = if let Some(vc) = &mut self.current_vc {
            vc.add_state(state)
        } else if let Some(level) = &mut self.current_level {
            level.add_state(state)
        } else {
            unreachable!("state element outside virtualControl/shiftLevel")
        };
        if !added {
            return Err(self.fatal(position, "Duplicate state: an equal state already exists"));
        }
        Ok(())
    }

    fn start_constraint(
        &mut self,
        name: &str,
        attrs: &HashMap<String, String>,
        position: usize,
    ) -> Result<()> {
        self.require_parent(name, &["state"], position)?;
        let (control, bounds) = self.resolve_constrained_control(attrs, position)?;

        let constraint = if name == "single" {
            let value = self.required_int(attrs, "value", position)?;
            ControlConstraint::single(control, value, bounds)
        } else {
            let from = self.required_int(attrs, "from", position)?;
            let to = self.required_int(attrs, "to", position)?;
            ControlConstraint::range(control, from, to, bounds)
        }
        .map_err(|err| self.fatal(position, &err.to_string()))?;

        self.current_state
            .as_mut()
            .expect("state is open")
            .add_constraint(constraint)
            .map_err(|err| self.fatal(position, &err.to_string()))
    }

    /// Resolves the control a constraint references, plus its raw bounds.
    fn resolve_constrained_control(
        &self,
        attrs: &HashMap<String, String>,
        position: usize,
    ) -> Result<(Control, (i32, i32))> {
        let kind = self.required(attrs, "kind", position)?;
        match kind.as_str() {
            "key" => {
                let code = self.resolve_raw_code(attrs, position, |name| {
                    self.names.key_code(name)
                })?;
                Ok((Control::key(code), (0, 1)))
            }
            "axis" => {
                let code = self.resolve_raw_code(attrs, position, |name| {
                    self.names.axis_code(name)
                })?;
                let control = Control::axis(code);
                let bounds = self.names.bounds_for(control).expect("axes have bounds");
                Ok((control, bounds))
            }
            "virtual" => {
                let name = self.required(attrs, "name", position)?;
                let profile = self.profile.as_ref().expect("profile element is open");
                let vc = profile.virtual_control_by_name(&name).ok_or_else(|| {
                    self.fatal(
                        position,
                        &format!("Reference to undeclared virtual control '{name}'"),
                    )
                })?;
                let bounds = (0, vc.num_states() as i32 - 1);
                Ok((vc.control(), bounds))
            }
            other => Err(self.fatal(position, &format!("Unknown control kind '{other}'"))),
        }
    }

    /// A raw control reference: numeric `code` attribute, or `name` looked
    /// up in the name database.
    fn resolve_raw_code(
        &self,
        attrs: &HashMap<String, String>,
        position: usize,
        lookup: impl Fn(&str) -> Option<i32>,
    ) -> Result<i32> {
        if let Some(raw) = attrs.get("code") {
            return self.parse_int(raw, "code", position);
        }
        if let Some(name) = attrs.get("name") {
            return lookup(name).ok_or_else(|| {
                self.fatal(position, &format!("Unknown control name '{name}'"))
            });
        }
        Err(self.fatal(position, "Missing required attribute 'code' or 'name'"))
    }

    // ----- controls and handler trees -------------------------------------

    fn start_controls(&mut self, position: usize) -> Result<()> {
        self.require_parent("controls", &["profile"], position)?;
        if self.sections.controls {
            return Err(self.fatal(position, "Duplicate <controls> section"));
        }
        self.sections.controls = true;
        Ok(())
    }

    fn start_control(&mut self, attrs: &HashMap<String, String>, position: usize) -> Result<()> {
        self.require_parent("control", &["controls"], position)?;
        let kind = self.required(attrs, "kind", position)?;
        match kind.as_str() {
            "key" => {
                let code = self.resolve_raw_code(attrs, position, |name| {
                    self.names.key_code(name)
                })?;
                self.current_control = Some(CurrentControl::Key(Control::key(code)));
                self.tree_stack.push(TreeFrame::Root(HandlerTree::new()));
            }
            "virtual" => {
                let name = self.required(attrs, "name", position)?;
                let profile = self.profile.as_ref().expect("profile element is open");
                let vc = profile.virtual_control_by_name(&name).ok_or_else(|| {
                    self.fatal(
                        position,
                        &format!("Control references undeclared virtual control '{name}'"),
                    )
                })?;
                let control = vc.control();
                let vcp = VirtualControlProfile::new(control)
                    .map_err(|err| self.fatal(position, &err.to_string()))?;
                self.current_control = Some(CurrentControl::Virtual {
                    control,
                    profile: vcp,
                    open_state: None,
                });
            }
            other => Err(self.fatal(
                position,
                &format!("Controls must be of kind 'key' or 'virtual', not '{other}'"),
            ))?,
        }
        Ok(())
    }

    fn end_control(&mut self, position: usize) -> Result<()> {
        let current = self.current_control.take().expect("control is open");
        let profile = match current {
            CurrentControl::Key(control) => {
                let frame = self.tree_stack.pop().expect("key control has a root tree");
                let TreeFrame::Root(tree) = frame else {
                    unreachable!("unclosed shift inside control")
                };
                self.check_complete(&tree, 0, position)?;
                ControlProfile::Key(
                    KeyProfile::new(control, tree)
                        .map_err(|err| self.fatal(position, &err.to_string()))?,
                )
            }
            CurrentControl::Virtual { profile, .. } => {
                if profile.trees.is_empty() {
                    return Err(self.fatal(
                        position,
                        "Virtual control element declares no <forState> branches",
                    ));
                }
                ControlProfile::Virtual(profile)
            }
        };
        self.profile_mut()
            .add_control_profile(profile)
            .map_err(|err| self.fatal(position, &err.to_string()))
    }

    fn start_for_state(&mut self, attrs: &HashMap<String, String>, position: usize) -> Result<()> {
        self.require_parent("forState", &["control"], position)?;
        let value = self.required_int(attrs, "value", position)?;

        let (code, duplicate) = match &self.current_control {
            Some(CurrentControl::Virtual {
                control, profile, ..
            }) => (control.code, profile.trees.contains_key(&value)),
            _ => {
                return Err(self.fatal(
                    position,
                    "<forState> is only allowed inside a virtual control element",
                ))
            }
        };
        let num_states = self
            .profile
            .as_ref()
            .expect("profile element is open")
            .virtual_control_by_code(code)
            .expect("control references a declared virtual control")
            .num_states() as i32;
        if value < 0 || value >= num_states {
            return Err(self.fatal(
                position,
                &format!(
                    "forState value {} is outside the virtual control's states 0..{}",
                    value,
                    num_states - 1
                ),
            ));
        }
        if duplicate {
            return Err(self.fatal(
                position,
                &format!("Duplicate <forState> for state {value}"),
            ));
        }

        if let Some(CurrentControl::Virtual { open_state, .. }) = &mut self.current_control {
            *open_state = Some(value);
        }
        self.tree_stack.push(TreeFrame::Root(HandlerTree::new()));
        Ok(())
    }

    fn end_for_state(&mut self, position: usize) -> Result<()> {
        let frame = self.tree_stack.pop().expect("forState has a root tree");
        let TreeFrame::Root(tree) = frame else {
            unreachable!("unclosed shift inside forState")
        };
        self.check_complete(&tree, 0, position)?;
        match &mut self.current_control {
            Some(CurrentControl::Virtual {
                profile,
                open_state,
                ..
            }) => {
                let value = open_state.take().expect("forState is open");
                profile
                    .trees
                    .insert(value, tree);
                Ok(())
            }
            _ => unreachable!("forState outside virtual control"),
        }
    }

    /// The number of `shift` frames currently open (nesting depth of the
    /// next child).
    fn handler_depth(&self) -> usize {
        self.tree_stack
            .iter()
            .filter(|frame| matches!(frame, TreeFrame::Handler(_)))
            .count()
    }

    fn start_shift(&mut self, attrs: &HashMap<String, String>, position: usize) -> Result<()> {
        self.require_parent("shift", &["control", "forState", "shift"], position)?;
        if self.tree_stack.is_empty() {
            return Err(self.fatal(position, "<shift> outside a control element"));
        }
        let depth = self.handler_depth();
        let num_levels = self.profile.as_ref().map_or(0, |p| p.shift_levels().len());
        if depth >= num_levels {
            return Err(self.fatal(
                position,
                &format!(
                    "Shift nesting depth {} exceeds the {} declared shift level(s)",
                    depth + 1,
                    num_levels
                ),
            ));
        }
        let from = self.required_int(attrs, "from", position)?;
        let to = self.required_int(attrs, "to", position)?;
        let num_states = self
            .profile
            .as_ref()
            .expect("profile element is open")
            .shift_levels()[depth]
            .num_states() as i32;
        if to >= num_states {
            return Err(self.fatal(
                position,
                &format!(
                    "Shift range {}..{} exceeds the {} states of shift level {}",
                    from, to, num_states, depth
                ),
            ));
        }
        let handler =
            ShiftHandler::new(from, to).map_err(|err| self.fatal(position, &err.to_string()))?;
        self.tree_stack.push(TreeFrame::Handler(handler));
        Ok(())
    }

    fn end_shift(&mut self, position: usize) -> Result<()> {
        let frame = self.tree_stack.pop().expect("shift is open");
        let TreeFrame::Handler(handler) = frame else {
            unreachable!("shift frame expected")
        };
        // After popping, the remaining handler frames are this handler's
        // ancestors; its subtree dispatches over the next deeper level.
        let subtree_level = self.handler_depth() + 1;
        self.check_complete(handler.tree(), subtree_level, position)?;
        self.tree_stack
            .last_mut()
            .expect("shift has an enclosing tree")
            .tree_mut()
            .add_shift(handler)
            .map_err(|err| self.fatal(position, &err.to_string()))
    }

    /// Completeness of a tree dispatching over the shift level at `level`
    /// (expected state count 0 when nesting is past the last level).
    fn check_complete(&self, tree: &HandlerTree, level: usize, position: usize) -> Result<()> {
        let levels = self.profile.as_ref().expect("profile element is open").shift_levels();
        let expected = levels.get(level).map_or(0, |l| l.num_states());
        if !tree.is_complete(expected) {
            let message = if expected == 0 {
                "Handler tree is incomplete: exactly one <action> is required here".to_string()
            } else {
                format!(
                    "Handler tree is incomplete: <shift> ranges must tile states 0..{} of shift level {}",
                    expected - 1,
                    level
                )
            };
            return Err(self.fatal(position, &message));
        }
        Ok(())
    }

    // ----- actions ---------------------------------------------------------

    fn start_action(&mut self, attrs: &HashMap<String, String>, position: usize) -> Result<()> {
        self.require_parent("action", &["control", "forState", "shift"], position)?;
        if self.tree_stack.is_empty() {
            return Err(self.fatal(position, "<action> outside a control element"));
        }
        let depth = self.handler_depth();
        let num_levels = self.profile.as_ref().map_or(0, |p| p.shift_levels().len());
        if depth < num_levels {
            return Err(self.fatal(
                position,
                &format!(
                    "<action> at shift depth {} but {} shift level(s) are declared; nest it in <shift> elements",
                    depth, num_levels
                ),
            ));
        }
        let action_type = self.required(attrs, "type", position)?;
        let builder = match action_type.as_str() {
            "simple" => {
                let repeat = attrs
                    .get("repeatDelay")
                    .map(|raw| self.parse_ms(raw, "repeatDelay", position))
                    .transpose()?;
                ActionBuilder::Simple(SimpleAction::new(Vec::new(), repeat))
            }
            "advanced" => ActionBuilder::Advanced {
                action: AdvancedAction::default(),
                target: None,
            },
            "script" => {
                return Err(self.fatal(
                    position,
                    "Script actions are not supported: no script format is defined",
                ))
            }
            "mouseMove" => {
                return Err(self.fatal(position, "Mouse-move actions are not supported"))
            }
            other => {
                return Err(self.fatal(position, &format!("Unknown action type '{other}'")))
            }
        };
        self.current_action = Some(builder);
        Ok(())
    }

    fn end_action(&mut self, position: usize) -> Result<()> {
        let action = match self.current_action.take().expect("action is open") {
            ActionBuilder::Simple(simple) => Action::Simple(simple),
            ActionBuilder::Advanced { action, .. } => Action::Advanced(action),
        };
        self.tree_stack
            .last_mut()
            .expect("action has an enclosing tree")
            .tree_mut()
            .add_action(action)
            .map_err(|err| self.fatal(position, &err.to_string()))
    }

    fn start_combination(
        &mut self,
        attrs: &HashMap<String, String>,
        position: usize,
    ) -> Result<()> {
        self.require_parent("combination", &["action"], position)?;
        let key = self.resolve_key_ref(attrs, "key", position)?;
        let modifiers = match attrs.get("modifiers") {
            Some(raw) if !raw.trim().is_empty() => raw
                .split(',')
                .map(|part| self.resolve_key_name_or_code(part.trim(), position))
                .collect::<Result<Vec<i32>>>()?,
            _ => Vec::new(),
        };
        match &mut self.current_action {
            Some(ActionBuilder::Simple(simple)) => {
                simple.combinations.push(KeyCombination::new(modifiers, key));
                Ok(())
            }
            _ => Err(self.fatal(
                position,
                "<combination> is only allowed inside a simple action",
            )),
        }
    }

    fn start_command_list(&mut self, name: &str, position: usize) -> Result<()> {
        self.require_parent(name, &["action"], position)?;
        match &mut self.current_action {
            Some(ActionBuilder::Advanced { target, .. }) => {
                *target = Some(match name {
                    "enter" => CommandTarget::Enter,
                    "repeat" => CommandTarget::Repeat,
                    _ => CommandTarget::Leave,
                });
                Ok(())
            }
            _ => Err(self.fatal(
                position,
                &format!("<{name}> is only allowed inside an advanced action"),
            )),
        }
    }

    fn start_key_command(
        &mut self,
        name: &str,
        attrs: &HashMap<String, String>,
        position: usize,
    ) -> Result<()> {
        self.require_parent(name, &["enter", "repeat", "leave"], position)?;
        let code = self.resolve_key_ref(attrs, "code", position)?;
        let command = if name == "press" {
            Command::KeyPress(code)
        } else {
            Command::KeyRelease(code)
        };
        self.push_command(command, position)
    }

    fn start_delay(&mut self, attrs: &HashMap<String, String>, position: usize) -> Result<()> {
        self.require_parent("delay", &["enter", "repeat", "leave"], position)?;
        let ms = self.required(attrs, "ms", position)?;
        let ms = self.parse_ms(&ms, "ms", position)?;
        self.push_command(Command::Delay(ms), position)
    }

    fn push_command(&mut self, command: Command, position: usize) -> Result<()> {
        match &mut self.current_action {
            Some(ActionBuilder::Advanced { action, target }) => {
                let list = match target.expect("command list is open") {
                    CommandTarget::Enter => &mut action.enter,
                    CommandTarget::Repeat => &mut action.repeat,
                    CommandTarget::Leave => &mut action.leave,
                };
                list.push(command);
                Ok(())
            }
            _ => Err(self.fatal(position, "Commands are only allowed inside an advanced action")),
        }
    }

    /// A key reference attribute: numeric code or database name.
    fn resolve_key_ref(
        &self,
        attrs: &HashMap<String, String>,
        attr: &str,
        position: usize,
    ) -> Result<i32> {
        let raw = self.required(attrs, attr, position)?;
        self.resolve_key_name_or_code(&raw, position)
    }

    fn resolve_key_name_or_code(&self, raw: &str, position: usize) -> Result<i32> {
        if let Ok(code) = parse_number(raw) {
            return Ok(code);
        }
        self.names
            .key_code(raw)
            .ok_or_else(|| self.fatal(position, &format!("Unknown key name '{raw}'")))
    }

    // ----- attribute helpers -----------------------------------------------

    fn required(
        &self,
        attrs: &HashMap<String, String>,
        name: &str,
        position: usize,
    ) -> Result<String> {
        attrs.get(name).cloned().ok_or_else(|| {
            self.fatal(position, &format!("Missing required attribute '{name}'"))
        })
    }

    fn required_int(
        &self,
        attrs: &HashMap<String, String>,
        name: &str,
        position: usize,
    ) -> Result<i32> {
        let raw = self.required(attrs, name, position)?;
        self.parse_int(&raw, name, position)
    }

    fn parse_int(&self, raw: &str, name: &str, position: usize) -> Result<i32> {
        parse_number(raw).map_err(|()| {
            self.fatal(
                position,
                &format!("Attribute '{name}' has malformed integer value '{raw}'"),
            )
        })
    }

    fn parse_u16(&self, raw: &str, name: &str, position: usize) -> Result<u16> {
        let value = self.parse_int(raw, name, position)?;
        u16::try_from(value).map_err(|_| {
            self.fatal(
                position,
                &format!("Attribute '{name}' value {value} does not fit a 16-bit id"),
            )
        })
    }

    fn parse_ms(&self, raw: &str, name: &str, position: usize) -> Result<u32> {
        let value = self.parse_int(raw, name, position)?;
        u32::try_from(value).map_err(|_| {
            self.fatal(
                position,
                &format!("Attribute '{name}' must be a non-negative delay, got {value}"),
            )
        })
    }

    fn parse_bool(&self, raw: &str, name: &str, position: usize) -> Result<bool> {
        match raw {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(self.fatal(
                position,
                &format!("Attribute '{name}' must be 'true' or 'false', got '{other}'"),
            )),
        }
    }
}

/// Decodes an element name, rejecting non-UTF-8.
fn element_name(e: &BytesStart<'_>) -> Result<String> {
    std::str::from_utf8(e.name().as_ref())
        .map(str::to_string)
        .context("Element name is not valid UTF-8")
}

/// Collects an element's attributes into a map.
fn attribute_map(e: &BytesStart<'_>) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for attr in e.attributes() {
        let attr = attr.context("Malformed attribute")?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .context("Attribute name is not valid UTF-8")?
            .to_string();
        let value = attr
            .unescape_value()
            .context("Attribute value is not valid UTF-8")?
            .to_string();
        map.insert(key, value);
    }
    Ok(map)
}

/// Parses a decimal or `0x`-prefixed hexadecimal integer.
fn parse_number(raw: &str) -> std::result::Result<i32, ()> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
            .ok()
            .and_then(|v| i32::try_from(v).ok())
            .ok_or(())
    } else {
        raw.parse::<i32>().map_err(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> Result<Profile> {
        let names = NameDb::load().unwrap();
        parse_profile_str(xml, &names)
    }

    const MINIMAL: &str = r#"
        <profile name="Minimal">
          <controls>
            <control kind="key" code="304">
              <action type="simple">
                <combination key="30"/>
              </action>
            </control>
          </controls>
        </profile>
    "#;

    #[test]
    fn test_minimal_profile() {
        let profile = parse(MINIMAL).unwrap();
        assert_eq!(profile.name, "Minimal");
        assert!(!profile.auto_load);
        assert_eq!(profile.control_profiles().len(), 1);
    }

    #[test]
    fn test_full_profile() {
        let profile = parse(
            r#"
            <profile name="Flight" autoLoad="true">
              <match name="T.16000M" vendor="0x044f" product="0xb10a"/>
              <virtualControls>
                <virtualControl name="mode">
                  <state>
                    <single kind="key" name="BTN_TRIGGER" value="1"/>
                  </state>
                  <state/>
                </virtualControl>
              </virtualControls>
              <shiftLevels>
                <shiftLevel>
                  <state/>
                  <state><single kind="key" name="BTN_PINKIE" value="1"/></state>
                </shiftLevel>
              </shiftLevels>
              <controls>
                <control kind="key" code="304">
                  <shift from="0" to="0">
                    <action type="simple"><combination key="KEY_A" modifiers="KEY_LEFTSHIFT"/></action>
                  </shift>
                  <shift from="1" to="1">
                    <action type="advanced">
                      <enter><press code="30"/><delay ms="40"/><release code="30"/></enter>
                      <leave><press code="31"/><release code="31"/></leave>
                    </action>
                  </shift>
                </control>
                <control kind="virtual" name="mode">
                  <forState value="0">
                    <shift from="0" to="1">
                      <action type="simple" repeatDelay="200"><combination key="57"/></action>
                    </shift>
                  </forState>
                </control>
              </controls>
            </profile>
        "#,
        )
        .unwrap();

        assert!(profile.auto_load);
        assert_eq!(profile.identity.vendor, Some(0x044f));
        assert_eq!(profile.virtual_controls().len(), 1);
        assert_eq!(profile.shift_levels().len(), 1);
        assert_eq!(profile.shift_levels()[0].num_states(), 2);
        assert_eq!(profile.control_profiles().len(), 2);
    }

    #[test]
    fn test_rejects_wrong_nesting() {
        let result = parse(
            r#"<profile name="Bad"><state/></profile>"#,
        );
        let message = result.unwrap_err().to_string();
        assert!(message.contains("<state>"), "got: {message}");
    }

    #[test]
    fn test_rejects_unknown_element() {
        let result = parse(r#"<profile name="Bad"><bogus/></profile>"#);
        assert!(result.unwrap_err().to_string().contains("Unknown element"));
    }

    #[test]
    fn test_rejects_missing_attribute() {
        let result = parse(r#"<profile autoLoad="true"/>"#);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Missing required attribute 'name'"));
    }

    #[test]
    fn test_rejects_malformed_numbers() {
        let result = parse(
            r#"
            <profile name="Bad">
              <controls>
                <control kind="key" code="not-a-number">
                  <action type="simple"><combination key="30"/></action>
                </control>
              </controls>
            </profile>
        "#,
        );
        assert!(result.unwrap_err().to_string().contains("malformed integer"));
    }

    #[test]
    fn test_rejects_sections_out_of_order() {
        let result = parse(
            r#"
            <profile name="Bad">
              <shiftLevels>
                <shiftLevel>
                  <state/>
                  <state><single kind="key" code="293" value="1"/></state>
                </shiftLevel>
              </shiftLevels>
              <virtualControls>
                <virtualControl name="mode">
                  <state><single kind="key" code="288" value="1"/></state>
                  <state/>
                </virtualControl>
              </virtualControls>
            </profile>
        "#,
        );
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("must be declared before"));
    }

    #[test]
    fn test_rejects_incomplete_tree_at_closing_tag() {
        let result = parse(
            r#"
            <profile name="Bad">
              <shiftLevels>
                <shiftLevel>
                  <state/>
                  <state><single kind="key" code="293" value="1"/></state>
                </shiftLevel>
              </shiftLevels>
              <controls>
                <control kind="key" code="304">
                  <shift from="0" to="0">
                    <action type="simple"><combination key="30"/></action>
                  </shift>
                </control>
              </controls>
            </profile>
        "#,
        );
        assert!(result.unwrap_err().to_string().contains("incomplete"));
    }

    #[test]
    fn test_rejects_duplicate_control_profile() {
        let result = parse(
            r#"
            <profile name="Bad">
              <controls>
                <control kind="key" code="304">
                  <action type="simple"><combination key="30"/></action>
                </control>
                <control kind="key" code="304">
                  <action type="simple"><combination key="31"/></action>
                </control>
              </controls>
            </profile>
        "#,
        );
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Duplicate control profile"));
    }

    #[test]
    fn test_rejects_duplicate_state() {
        let result = parse(
            r#"
            <profile name="Bad">
              <virtualControls>
                <virtualControl name="mode">
                  <state><single kind="key" code="288" value="1"/></state>
                  <state><single kind="key" code="288" value="1"/></state>
                </virtualControl>
              </virtualControls>
            </profile>
        "#,
        );
        assert!(result.unwrap_err().to_string().contains("Duplicate state"));
    }

    #[test]
    fn test_rejects_script_and_mouse_move_actions() {
        for action_type in ["script", "mouseMove"] {
            let result = parse(&format!(
                r#"
                <profile name="Bad">
                  <controls>
                    <control kind="key" code="304">
                      <action type="{action_type}"/>
                    </control>
                  </controls>
                </profile>
            "#
            ));
            assert!(
                result.unwrap_err().to_string().contains("not supported"),
                "{action_type} should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_undeclared_virtual_reference() {
        let result = parse(
            r#"
            <profile name="Bad">
              <controls>
                <control kind="virtual" name="ghost">
                  <forState value="0"><action type="simple"/></forState>
                </control>
              </controls>
            </profile>
        "#,
        );
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("undeclared virtual control"));
    }

    #[test]
    fn test_rejects_constraint_out_of_bounds() {
        let result = parse(
            r#"
            <profile name="Bad">
              <virtualControls>
                <virtualControl name="mode">
                  <state><single kind="key" code="288" value="7"/></state>
                  <state/>
                </virtualControl>
              </virtualControls>
            </profile>
        "#,
        );
        assert!(result.unwrap_err().to_string().contains("out of range"));
    }

    #[test]
    fn test_error_carries_path_and_position() {
        let result = parse(
            r#"
            <profile name="Bad">
              <virtualControls>
                <virtualControl name="mode">
                  <state><single kind="key" code="288"/></state>
                  <state/>
                </virtualControl>
              </virtualControls>
            </profile>
        "#,
        );
        let message = result.unwrap_err().to_string();
        assert!(message.contains("profile/virtualControls/virtualControl/state"));
        assert!(message.contains("byte "));
    }
}

//! Compiled runtime document generation.
//!
//! Turns a validated profile into the XML document the runtime daemon
//! consumes: a prologue of shared state and functions, one event fragment
//! per raw control wired from the dependency map, one element per
//! configured control carrying its dispatch code, and an empty epilogue.
//!
//! Generated code is Lua targeting the daemon's intrinsics: `raw_key` /
//! `raw_axis` read raw values, `press` / `release` / `delay` emit output,
//! and `task_start` / `task_cancel` manage one cooperative background task
//! per control. `task_cancel` returns only after the task has observed its
//! cancellation flag, so a state's leave sequence always finishes before
//! the next enter sequence starts.

use crate::codegen::script::ScriptWriter;
use crate::models::{
    Action, Command, Control, ControlConstraint, ControlKind, ControlProfile, HandlerChild,
    HandlerTree, KeyCombination, Profile, ShiftHandler, StateVisitor, VirtualState,
};
use anyhow::Result;
use std::fmt::Write as _;

/// Generates the compiled runtime document for one profile.
pub struct RuntimeGenerator<'a> {
    profile: &'a Profile,
}

impl<'a> RuntimeGenerator<'a> {
    /// Creates a generator over a validated profile.
    #[must_use]
    pub const fn new(profile: &'a Profile) -> Self {
        Self { profile }
    }

    /// Generates the full runtime document.
    ///
    /// # Errors
    ///
    /// Validation should have caught everything; any failure here is an
    /// internal consistency error, not user input to fix.
    pub fn generate(&self) -> Result<String> {
        self.check_consistency()?;

        let mut doc = String::new();
        let _ = write!(
            doc,
            "<runtime profile=\"{}\" autoLoad=\"{}\"",
            escape(&self.profile.name),
            self.profile.auto_load
        );
        if let Some(name) = &self.profile.identity.name_contains {
            let _ = write!(doc, " matchName=\"{}\"", escape(name));
        }
        if let Some(vendor) = self.profile.identity.vendor {
            let _ = write!(doc, " matchVendor=\"0x{vendor:04x}\"");
        }
        if let Some(product) = self.profile.identity.product {
            let _ = write!(doc, " matchProduct=\"0x{product:04x}\"");
        }
        let _ = write!(
            doc,
            " generated=\"{}\"",
            chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
        );
        doc.push_str(">\n");

        let _ = write!(doc, "  <prologue><![CDATA[\n{}]]></prologue>\n", self.prologue()?);

        for control in self.profile.reactive_raw_controls() {
            let _ = write!(
                doc,
                "  <event kind=\"{}\" code=\"{}\"><![CDATA[\n{}]]></event>\n",
                control.kind,
                control.code,
                self.event_fragment(control)?
            );
        }

        for control_profile in self.profile.control_profiles() {
            let control = control_profile.control();
            let reference = match control.kind {
                ControlKind::Virtual => format!(
                    "kind=\"virtual\" name=\"{}\"",
                    escape(self.virtual_name(control)?)
                ),
                _ => format!("kind=\"{}\" code=\"{}\"", control.kind, control.code),
            };
            let _ = write!(
                doc,
                "  <control {reference}><![CDATA[\n{}]]></control>\n",
                self.control_code(control_profile)?
            );
        }

        doc.push_str("  <epilogue/>\n");
        doc.push_str("</runtime>\n");
        Ok(doc)
    }

    /// Rejects graphs that passed no validation: script actions and
    /// stateless virtual controls have no generatable form.
    fn check_consistency(&self) -> Result<()> {
        for vc in self.profile.virtual_controls() {
            if vc.num_states() == 0 {
                anyhow::bail!(
                    "internal: virtual control '{}' has no states; validation must reject this profile",
                    vc.name()
                );
            }
        }
        for control_profile in self.profile.control_profiles() {
            for tree in control_profile.trees() {
                check_no_script(tree)?;
            }
        }
        Ok(())
    }

    // ----- naming ----------------------------------------------------------

    /// The script identifier of a configured control.
    fn control_ident(&self, control: Control) -> Result<String> {
        match control.kind {
            ControlKind::Key => Ok(format!("key_{}", control.code)),
            ControlKind::Virtual => Ok(format!("vc_{}", self.virtual_name(control)?)),
            ControlKind::Axis => anyhow::bail!(
                "internal: axis {} cannot carry a control profile",
                control.code
            ),
        }
    }

    fn virtual_name(&self, control: Control) -> Result<&str> {
        self.profile
            .virtual_control_by_code(control.code)
            .map(|vc| vc.name())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "internal: reference to undeclared virtual control {}",
                    control.code
                )
            })
    }

    /// The expression reading a control's current value.
    fn value_expr(&self, control: Control) -> Result<String> {
        match control.kind {
            ControlKind::Key => Ok(format!("raw_key({})", control.code)),
            ControlKind::Axis => Ok(format!("raw_axis({})", control.code)),
            ControlKind::Virtual => Ok(format!("vc_{}_state", self.virtual_name(control)?)),
        }
    }

    // ----- prologue --------------------------------------------------------

    fn prologue(&self) -> Result<String> {
        let mut writer = ScriptWriter::new();
        writer.line(&format!(
            "-- Runtime for profile '{}'. Regenerate instead of editing.",
            self.profile.name
        ));
        writer.blank();
        self.emit_registry(&mut writer);

        for vc in self.profile.virtual_controls() {
            writer.blank();
            let var = format!("vc_{}_state", vc.name());
            // -1 = no state matched; 0 is a real declared state.
            writer.line(&format!("{var} = -1"));
            self.emit_recompute(
                &mut writer,
                &format!("vc_{}_recompute", vc.name()),
                &var,
                vc.states(),
                -1,
            )?;
        }

        for (index, level) in self.profile.shift_levels().iter().enumerate() {
            writer.blank();
            let var = format!("shift_{index}_state");
            writer.line(&format!("{var} = 0"));
            self.emit_recompute(
                &mut writer,
                &format!("shift_{index}_recompute"),
                &var,
                level.states(),
                0,
            )?;
        }

        for control_profile in self.profile.control_profiles() {
            let ident = self.control_ident(control_profile.control())?;
            writer.blank();
            writer.line(&format!("{ident}_dstate = 0"));
            self.emit_update_fn(&mut writer, &ident);
        }

        Ok(writer.finish())
    }

    fn emit_registry(&self, writer: &mut ScriptWriter) {
        writer.line("active_updaters = {}");
        writer.blank();
        writer.line("function updaters_register(name, fn)");
        writer.push();
        writer.line("for i = 1, #active_updaters do");
        writer.push();
        writer.line("if active_updaters[i].name == name then");
        writer.push();
        writer.line("return");
        writer.pop();
        writer.line("end");
        writer.pop();
        writer.line("end");
        writer.line("active_updaters[#active_updaters + 1] = { name = name, fn = fn }");
        writer.pop();
        writer.line("end");
        writer.blank();
        writer.line("function updaters_unregister(name)");
        writer.push();
        writer.line("for i = 1, #active_updaters do");
        writer.push();
        writer.line("if active_updaters[i].name == name then");
        writer.push();
        writer.line("table.remove(active_updaters, i)");
        writer.line("return");
        writer.pop();
        writer.line("end");
        writer.pop();
        writer.line("end");
        writer.pop();
        writer.line("end");
        writer.blank();
        writer.line("function run_active_updaters()");
        writer.push();
        // Iterate a snapshot: update functions unregister themselves
        // mid-sweep.
        writer.line("local snapshot = {}");
        writer.line("for i = 1, #active_updaters do");
        writer.push();
        writer.line("snapshot[i] = active_updaters[i].fn");
        writer.pop();
        writer.line("end");
        writer.line("for i = 1, #snapshot do");
        writer.push();
        writer.line("snapshot[i]()");
        writer.pop();
        writer.line("end");
        writer.pop();
        writer.line("end");
    }

    /// One state-recompute function: non-default states in value order as
    /// an if/elseif chain, falling back to the default state's value (or
    /// the no-state marker for virtual controls).
    fn emit_recompute(
        &self,
        writer: &mut ScriptWriter,
        name: &str,
        var: &str,
        states: &[VirtualState],
        no_match: i32,
    ) -> Result<()> {
        let fallback = states
            .iter()
            .find(|s| s.is_default())
            .and_then(VirtualState::value)
            .unwrap_or(no_match);

        writer.line(&format!("function {name}()"));
        writer.push();
        writer.line(&format!("local s = {fallback}"));

        let mut chain_open = false;
        for state in states {
            if state.is_default() {
                continue;
            }
            let condition = self.state_condition(state)?;
            let value = state
                .value()
                .ok_or_else(|| anyhow::anyhow!("internal: state without an assigned value"))?;
            let keyword = if chain_open { "elseif" } else { "if" };
            writer.line(&format!("{keyword} {condition} then"));
            writer.push();
            writer.line(&format!("s = {value}"));
            writer.pop();
            chain_open = true;
        }
        if chain_open {
            writer.line("end");
        }

        writer.line(&format!("{var} = s"));
        writer.pop();
        writer.line("end");
        Ok(())
    }

    fn state_condition(&self, state: &VirtualState) -> Result<String> {
        let mut terms = Vec::new();
        for constraint in state.constraints() {
            let value = self.value_expr(constraint.control())?;
            terms.push(match constraint {
                ControlConstraint::Single { value: v, .. } => format!("{value} == {v}"),
                ControlConstraint::Range { from, to, .. } => {
                    format!("{value} >= {from} and {value} <= {to}")
                }
            });
        }
        Ok(terms.join(" and "))
    }

    /// The per-control update function: recompute the shifted state and,
    /// only on change, run old leave fully, then new enter, keeping the
    /// active-updaters registry in step with 0/non-0 transitions.
    fn emit_update_fn(&self, writer: &mut ScriptWriter, ident: &str) {
        writer.line(&format!("function {ident}_update()"));
        writer.push();
        writer.line(&format!("local new_state = {ident}_shifted_state()"));
        writer.line(&format!("if new_state == {ident}_dstate then"));
        writer.push();
        writer.line("return");
        writer.pop();
        writer.line("end");
        writer.line(&format!("local leave_fn = {ident}_leave_fns[{ident}_dstate]"));
        writer.line("if leave_fn then");
        writer.push();
        writer.line("leave_fn()");
        writer.pop();
        writer.line("end");
        writer.line(&format!("local enter_fn = {ident}_enter_fns[new_state]"));
        writer.line("if enter_fn then");
        writer.push();
        writer.line("enter_fn()");
        writer.pop();
        writer.line("end");
        writer.line(&format!("if {ident}_dstate == 0 and new_state ~= 0 then"));
        writer.push();
        writer.line(&format!("updaters_register(\"{ident}\", {ident}_update)"));
        writer.pop();
        writer.line("elseif new_state == 0 then");
        writer.push();
        writer.line(&format!("updaters_unregister(\"{ident}\")"));
        writer.pop();
        writer.line("end");
        writer.line(&format!("{ident}_dstate = new_state"));
        writer.pop();
        writer.line("end");
    }

    // ----- event fragments -------------------------------------------------

    /// The "on raw value changed" fragment for one raw control: dependent
    /// virtual-control recomputes, dependent shift-level recomputes, the
    /// control's own update, then either the global sweep (when any shift
    /// level depends on this control) or the dependent virtual controls'
    /// own updates.
    fn event_fragment(&self, control: Control) -> Result<String> {
        let map = self.profile.dependency_map();
        let dependents = map.get(&control);

        let mut writer = ScriptWriter::new();

        if let Some(deps) = dependents {
            for &vc_index in &deps.virtual_controls {
                let vc = &self.profile.virtual_controls()[vc_index];
                writer.line(&format!("vc_{}_recompute()", vc.name()));
            }
            for &level_index in &deps.shift_levels {
                writer.line(&format!("shift_{level_index}_recompute()"));
            }
        }

        if self.profile.control_profile_for(control).is_some() {
            let ident = self.control_ident(control)?;
            writer.line(&format!("{ident}_update()"));
        }

        if let Some(deps) = dependents {
            if !deps.shift_levels.is_empty() {
                // A shift-level change can alter the shifted state of many
                // otherwise-unchanged controls.
                writer.line("run_active_updaters()");
            } else {
                for &vc_index in &deps.virtual_controls {
                    let vc = &self.profile.virtual_controls()[vc_index];
                    if self.profile.control_profile_for(vc.control()).is_some() {
                        writer.line(&format!("vc_{}_update()", vc.name()));
                    }
                }
            }
        }

        Ok(writer.finish())
    }

    // ----- per-control code ------------------------------------------------

    fn control_code(&self, control_profile: &ControlProfile) -> Result<String> {
        let control = control_profile.control();
        let ident = self.control_ident(control)?;
        let num_levels = self.profile.shift_levels().len();

        let mut writer = ScriptWriter::new();
        self.emit_shifted_state_fn(&mut writer, &ident, control_profile, num_levels)?;

        // Two more folds over the same trees: enter bodies, then leave
        // bodies, sharing one numbering.
        writer.blank();
        let mut enter = ActionFnEmitter::new(&ident, ActionPhase::Enter);
        self.fold_profile(control_profile, num_levels, &mut enter);
        writer_append(&mut writer, enter.writer);

        let mut leave = ActionFnEmitter::new(&ident, ActionPhase::Leave);
        self.fold_profile(control_profile, num_levels, &mut leave);
        writer_append(&mut writer, leave.writer);

        writer.line(&format!("{}_enter_fns = {{ {} }}", ident, table_body(&enter.entries)));
        writer.line(&format!("{}_leave_fns = {{ {} }}", ident, table_body(&leave.entries)));
        Ok(writer.finish())
    }

    fn fold_profile(
        &self,
        control_profile: &ControlProfile,
        num_levels: usize,
        visitor: &mut dyn StateVisitor,
    ) {
        let control = control_profile.control();
        let mut next_index = 0;
        match control_profile {
            ControlProfile::Key(key_profile) => {
                key_profile
                    .tree
                    .fold_states(control, num_levels, &mut next_index, visitor);
            }
            ControlProfile::Virtual(vc_profile) => {
                for tree in vc_profile.trees.values() {
                    tree.fold_states(control, num_levels, &mut next_index, visitor);
                }
            }
        }
    }

    fn emit_shifted_state_fn(
        &self,
        writer: &mut ScriptWriter,
        ident: &str,
        control_profile: &ControlProfile,
        num_levels: usize,
    ) -> Result<()> {
        writer.line(&format!("function {ident}_shifted_state()"));
        writer.push();
        match control_profile {
            ControlProfile::Key(key_profile) => {
                // Raw 0 is "not pressed": the implicit no-action state.
                writer.line(&format!("if raw_key({}) == 0 then", key_profile.control.code));
                writer.push();
                writer.line("return 0");
                writer.pop();
                writer.line("end");

                let mut next_index = 0;
                let mut emitter = DispatchEmitter::new(writer);
                key_profile.tree.fold_states(
                    key_profile.control,
                    num_levels,
                    &mut next_index,
                    &mut emitter,
                );
                let chain_open = emitter.finish();
                if chain_open {
                    writer.line("end");
                    writer.line("return 0");
                }
            }
            ControlProfile::Virtual(vc_profile) => {
                let state_var = format!("vc_{}_state", self.virtual_name(vc_profile.control)?);
                let mut next_index = 0;
                let mut outer_open = false;
                for (&value, tree) in &vc_profile.trees {
                    let keyword = if outer_open { "elseif" } else { "if" };
                    writer.line(&format!("{keyword} {state_var} == {value} then"));
                    writer.push();
                    let mut emitter = DispatchEmitter::new(writer);
                    tree.fold_states(vc_profile.control, num_levels, &mut next_index, &mut emitter);
                    let chain_open = emitter.finish();
                    if chain_open {
                        writer.line("end");
                    }
                    writer.pop();
                    outer_open = true;
                }
                if outer_open {
                    writer.line("end");
                }
                // Any state without a tree dispatches to the no-action
                // state.
                writer.line("return 0");
            }
        }
        writer.pop();
        writer.line("end");
        Ok(())
    }
}

/// Which action phase an [`ActionFnEmitter`] generates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActionPhase {
    Enter,
    Leave,
}

/// Emits one named function per distinct state that has behavior in the
/// given phase, collecting the dispatch-table entries.
struct ActionFnEmitter {
    ident: String,
    phase: ActionPhase,
    writer: ScriptWriter,
    entries: Vec<(usize, String)>,
}

impl ActionFnEmitter {
    fn new(ident: &str, phase: ActionPhase) -> Self {
        Self {
            ident: ident.to_string(),
            phase,
            writer: ScriptWriter::new(),
            entries: Vec::new(),
        }
    }

    fn emit_combination(writer: &mut ScriptWriter, combination: &KeyCombination) {
        for modifier in &combination.modifiers {
            writer.line(&format!("press({modifier})"));
        }
        writer.line(&format!("press({})", combination.key));
        writer.line(&format!("release({})", combination.key));
        for modifier in combination.modifiers.iter().rev() {
            writer.line(&format!("release({modifier})"));
        }
    }

    fn emit_command(writer: &mut ScriptWriter, command: Command) {
        match command {
            Command::KeyPress(code) => writer.line(&format!("press({code})")),
            Command::KeyRelease(code) => writer.line(&format!("release({code})")),
            Command::Delay(ms) => writer.line(&format!("delay({ms})")),
        }
    }

    fn emit_repeat_task(writer: &mut ScriptWriter, ident: &str, body: impl Fn(&mut ScriptWriter)) {
        writer.line(&format!("task_start(\"{ident}\", function(task)"));
        writer.push();
        writer.line("repeat");
        writer.push();
        body(writer);
        writer.pop();
        writer.line("until task.cancelled");
        writer.pop();
        writer.line("end)");
    }
}

impl StateVisitor for ActionFnEmitter {
    fn leaf(&mut self, _control: Control, index: usize, action: &Action) {
        let has_behavior = match self.phase {
            ActionPhase::Enter => action.has_enter_behavior(),
            ActionPhase::Leave => action.has_leave_behavior(),
        };
        if !has_behavior {
            return;
        }

        let phase_name = match self.phase {
            ActionPhase::Enter => "enter",
            ActionPhase::Leave => "leave",
        };
        let fn_name = format!("{}_{}_{}", self.ident, phase_name, index);
        self.writer.line(&format!("function {fn_name}()"));
        self.writer.push();

        match (self.phase, action) {
            (ActionPhase::Enter, Action::Simple(simple)) => {
                if let Some(delay) = simple.repeat_delay_ms {
                    let combinations = simple.combinations.clone();
                    Self::emit_repeat_task(&mut self.writer, &self.ident, move |writer| {
                        for combination in &combinations {
                            Self::emit_combination(writer, combination);
                        }
                        writer.line(&format!("delay({delay})"));
                    });
                } else {
                    for combination in &simple.combinations {
                        Self::emit_combination(&mut self.writer, combination);
                    }
                }
            }
            (ActionPhase::Leave, Action::Simple(_)) => {
                // Leave behavior on a simple action is exactly the repeat
                // cancellation.
                self.writer.line(&format!("task_cancel(\"{}\")", self.ident));
            }
            (ActionPhase::Enter, Action::Advanced(advanced)) => {
                for &command in &advanced.enter {
                    Self::emit_command(&mut self.writer, command);
                }
                if !advanced.repeat.is_empty() {
                    let repeat = advanced.repeat.clone();
                    Self::emit_repeat_task(&mut self.writer, &self.ident, move |writer| {
                        for &command in &repeat {
                            Self::emit_command(writer, command);
                        }
                    });
                }
            }
            (ActionPhase::Leave, Action::Advanced(advanced)) => {
                if !advanced.repeat.is_empty() {
                    self.writer.line(&format!("task_cancel(\"{}\")", self.ident));
                }
                for &command in &advanced.leave {
                    Self::emit_command(&mut self.writer, command);
                }
            }
            // Rejected by the consistency check before any fold runs.
            (_, Action::Script) => {}
        }

        self.writer.pop();
        self.writer.line("end");
        self.writer.blank();
        self.entries.push((index, fn_name));
    }
}

/// Emits the nested if/elseif dispatch over shift-level states, returning
/// each leaf's distinct-state index. Shift levels are addressed by nesting
/// depth; sibling handlers share one if/elseif chain closed by a single
/// `end` after the last sibling.
struct DispatchEmitter<'w> {
    writer: &'w mut ScriptWriter,
    chain_open: Vec<bool>,
}

impl<'w> DispatchEmitter<'w> {
    fn new(writer: &'w mut ScriptWriter) -> Self {
        Self {
            writer,
            chain_open: vec![false],
        }
    }

    /// Closes the emitter, reporting whether a top-level chain was opened
    /// (the caller then owes the final `end`).
    fn finish(self) -> bool {
        debug_assert_eq!(self.chain_open.len(), 1, "unbalanced branch nesting");
        self.chain_open[0]
    }
}

impl StateVisitor for DispatchEmitter<'_> {
    fn leaf(&mut self, _control: Control, index: usize, _action: &Action) {
        self.writer.line(&format!("return {index}"));
    }

    fn enter_branch(&mut self, _control: Control, handler: &ShiftHandler) {
        let level = self.chain_open.len() - 1;
        let var = format!("shift_{level}_state");
        let condition = if handler.from_state() == handler.to_state() {
            format!("{var} == {}", handler.from_state())
        } else {
            format!(
                "{var} >= {} and {var} <= {}",
                handler.from_state(),
                handler.to_state()
            )
        };
        let open = self.chain_open.last_mut().expect("chain stack is never empty");
        let keyword = if *open { "elseif" } else { "if" };
        *open = true;
        self.writer.line(&format!("{keyword} {condition} then"));
        self.writer.push();
        self.chain_open.push(false);
    }

    fn leave_branch(&mut self, _control: Control, _handler: &ShiftHandler) {
        let child_open = self.chain_open.pop().expect("chain stack is never empty");
        if child_open {
            self.writer.line("end");
        }
        self.writer.pop();
    }
}

/// Counts the distinct states of one control profile.
#[must_use]
pub fn distinct_state_count(control_profile: &ControlProfile, num_levels: usize) -> usize {
    struct Counter;
    impl StateVisitor for Counter {
        fn leaf(&mut self, _control: Control, _index: usize, _action: &Action) {}
    }

    let control = control_profile.control();
    let mut next_index = 0;
    let mut counter = Counter;
    match control_profile {
        ControlProfile::Key(key_profile) => {
            key_profile
                .tree
                .fold_states(control, num_levels, &mut next_index, &mut counter);
        }
        ControlProfile::Virtual(vc_profile) => {
            for tree in vc_profile.trees.values() {
                tree.fold_states(control, num_levels, &mut next_index, &mut counter);
            }
        }
    }
    next_index
}

/// Replaces the volatile `generated` stamp for reproducible output.
#[must_use]
pub fn normalize_for_deterministic(content: &str) -> String {
    let Some(start) = content.find(" generated=\"") else {
        return content.to_string();
    };
    let value_start = start + " generated=\"".len();
    let Some(value_len) = content[value_start..].find('"') else {
        return content.to_string();
    };
    format!(
        "{} generated=\"<timestamp>{}",
        &content[..start],
        &content[value_start + value_len..]
    )
}

fn check_no_script(tree: &HandlerTree) -> Result<()> {
    for child in tree.children() {
        match child {
            HandlerChild::Action(Action::Script) => {
                anyhow::bail!(
                    "internal: script action reached the generator; validation must reject it"
                );
            }
            HandlerChild::Action(Action::Simple(_) | Action::Advanced(_)) => {}
            HandlerChild::Shift(handler) => check_no_script(handler.tree())?,
        }
    }
    Ok(())
}

fn writer_append(writer: &mut ScriptWriter, other: ScriptWriter) {
    let text = other.finish();
    for line in text.lines() {
        if line.is_empty() {
            writer.blank();
        } else {
            writer.line(line);
        }
    }
}

fn table_body(entries: &[(usize, String)]) -> String {
    entries
        .iter()
        .map(|(index, name)| format!("[{index}] = {name}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Escapes text for use in an XML attribute value.
fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::NameDb;
    use crate::parser::parse_profile_str;

    fn generate(xml: &str) -> String {
        let names = NameDb::load().unwrap();
        let profile = parse_profile_str(xml, &names).unwrap();
        RuntimeGenerator::new(&profile).generate().unwrap()
    }

    const SHIFTED: &str = r#"
        <profile name="Shifted">
          <virtualControls>
            <virtualControl name="mode">
              <state><single kind="key" code="288" value="1"/></state>
              <state/>
            </virtualControl>
          </virtualControls>
          <shiftLevels>
            <shiftLevel>
              <state/>
              <state><single kind="key" code="293" value="1"/></state>
            </shiftLevel>
          </shiftLevels>
          <controls>
            <control kind="key" code="304">
              <shift from="0" to="0">
                <action type="simple" repeatDelay="150">
                  <combination key="30" modifiers="29,42"/>
                </action>
              </shift>
              <shift from="1" to="1">
                <action type="advanced">
                  <enter><press code="31"/><release code="31"/></enter>
                  <leave><press code="32"/><release code="32"/></leave>
                </action>
              </shift>
            </control>
            <control kind="virtual" name="mode">
              <forState value="0">
                <shift from="0" to="1">
                  <action type="simple"><combination key="57"/></action>
                </shift>
              </forState>
            </control>
          </controls>
        </profile>
    "#;

    #[test]
    fn test_document_shape() {
        let doc = generate(SHIFTED);
        assert!(doc.starts_with("<runtime profile=\"Shifted\""));
        assert!(doc.contains("<prologue><![CDATA["));
        assert!(doc.contains("<event kind=\"key\" code=\"288\">"));
        assert!(doc.contains("<event kind=\"key\" code=\"293\">"));
        assert!(doc.contains("<event kind=\"key\" code=\"304\">"));
        assert!(doc.contains("<control kind=\"key\" code=\"304\">"));
        assert!(doc.contains("<control kind=\"virtual\" name=\"mode\">"));
        assert!(doc.contains("<epilogue/>"));
    }

    #[test]
    fn test_prologue_contents() {
        let doc = generate(SHIFTED);
        assert!(doc.contains("active_updaters = {}"));
        assert!(doc.contains("vc_mode_state = -1"));
        assert!(doc.contains("function vc_mode_recompute()"));
        assert!(doc.contains("shift_0_state = 0"));
        assert!(doc.contains("function shift_0_recompute()"));
        assert!(doc.contains("function key_304_update()"));
        assert!(doc.contains("function vc_mode_update()"));
        assert!(doc.contains("updaters_register(\"key_304\", key_304_update)"));
    }

    #[test]
    fn test_event_fragment_wiring() {
        let doc = generate(SHIFTED);

        // Key 288 feeds only the virtual control, which has a profile: its
        // fragment recomputes the virtual control and updates it directly.
        let fragment_288 = extract_between(&doc, "<event kind=\"key\" code=\"288\"><![CDATA[", "]]>");
        assert!(fragment_288.contains("vc_mode_recompute()"));
        assert!(fragment_288.contains("vc_mode_update()"));
        assert!(!fragment_288.contains("run_active_updaters()"));

        // Key 293 feeds shift level 0: its fragment sweeps.
        let fragment_293 = extract_between(&doc, "<event kind=\"key\" code=\"293\"><![CDATA[", "]]>");
        assert!(fragment_293.contains("shift_0_recompute()"));
        assert!(fragment_293.contains("run_active_updaters()"));

        // Key 304 only has its own profile.
        let fragment_304 = extract_between(&doc, "<event kind=\"key\" code=\"304\"><![CDATA[", "]]>");
        assert!(fragment_304.contains("key_304_update()"));
        assert!(!fragment_304.contains("recompute"));

        // Ordering: recompute precedes the sweep.
        let recompute_at = fragment_293.find("shift_0_recompute()").unwrap();
        let sweep_at = fragment_293.find("run_active_updaters()").unwrap();
        assert!(recompute_at < sweep_at);
    }

    #[test]
    fn test_key_dispatch_code() {
        let doc = generate(SHIFTED);
        let code = extract_between(&doc, "<control kind=\"key\" code=\"304\"><![CDATA[", "]]>");

        assert!(code.contains("function key_304_shifted_state()"));
        assert!(code.contains("if raw_key(304) == 0 then"));
        assert!(code.contains("if shift_0_state == 0 then"));
        assert!(code.contains("elseif shift_0_state == 1 then"));

        // Repeating simple action: cancellable task on enter, cancel on
        // leave.
        assert!(code.contains("function key_304_enter_1()"));
        assert!(code.contains("task_start(\"key_304\", function(task)"));
        assert!(code.contains("until task.cancelled"));
        assert!(code.contains("function key_304_leave_1()"));
        assert!(code.contains("task_cancel(\"key_304\")"));

        // Modifier ordering: pressed left to right, released in reverse.
        let press_29 = code.find("press(29)").unwrap();
        let press_42 = code.find("press(42)").unwrap();
        let press_30 = code.find("press(30)").unwrap();
        let release_30 = code.find("release(30)").unwrap();
        let release_42 = code.find("release(42)").unwrap();
        let release_29 = code.find("release(29)").unwrap();
        assert!(press_29 < press_42 && press_42 < press_30);
        assert!(release_30 < release_42 && release_42 < release_29);

        // Advanced action in state 2.
        assert!(code.contains("function key_304_enter_2()"));
        assert!(code.contains("function key_304_leave_2()"));

        assert!(code.contains("key_304_enter_fns = { [1] = key_304_enter_1, [2] = key_304_enter_2 }"));
        assert!(code.contains("key_304_leave_fns = { [1] = key_304_leave_1, [2] = key_304_leave_2 }"));
    }

    #[test]
    fn test_virtual_dispatch_code() {
        let doc = generate(SHIFTED);
        let code = extract_between(&doc, "<control kind=\"virtual\" name=\"mode\"><![CDATA[", "]]>");

        assert!(code.contains("function vc_mode_shifted_state()"));
        assert!(code.contains("if vc_mode_state == 0 then"));
        // The [0,1] range covers both shift states in one branch.
        assert!(code.contains("if shift_0_state >= 0 and shift_0_state <= 1 then"));
        // Fire-and-forget simple action: no leave function at all.
        assert!(code.contains("vc_mode_leave_fns = {  }"));
    }

    #[test]
    fn test_deterministic_after_normalization() {
        let first = normalize_for_deterministic(&generate(SHIFTED));
        let second = normalize_for_deterministic(&generate(SHIFTED));
        assert_eq!(first, second);
        assert!(first.contains("generated=\"<timestamp>\""));
    }

    #[test]
    fn test_leaf_only_profile() {
        let doc = generate(
            r#"
            <profile name="Plain">
              <controls>
                <control kind="key" code="305">
                  <action type="simple"><combination key="30"/></action>
                </control>
              </controls>
            </profile>
        "#,
        );
        let code = extract_between(&doc, "<control kind=\"key\" code=\"305\"><![CDATA[", "]]>");
        assert!(code.contains("if raw_key(305) == 0 then"));
        assert!(code.contains("return 1"));
        assert!(code.contains("key_305_enter_fns = { [1] = key_305_enter_1 }"));
        assert!(code.contains("key_305_leave_fns = {  }"));
    }

    fn extract_between<'d>(doc: &'d str, start: &str, end: &str) -> &'d str {
        let begin = doc.find(start).map(|at| at + start.len()).unwrap();
        let length = doc[begin..].find(end).unwrap();
        &doc[begin..begin + length]
    }
}

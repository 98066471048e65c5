//! Editable profile document serializer.
//!
//! Emits the canonical XML form of a profile. Serializing and reparsing
//! yields an equal object graph; numeric codes are written as-is even when
//! the name database knows a friendlier name, so documents survive name
//! table changes.

use crate::models::{
    Action, Command, ControlConstraint, ControlKind, ControlProfile, HandlerChild, HandlerTree,
    Profile, VirtualState,
};
use std::fmt::Write as _;

/// Serializes a profile to its editable XML document.
#[must_use]
pub fn write_profile(profile: &Profile) -> String {
    let mut doc = String::new();
    let _ = write!(doc, "<profile name=\"{}\"", escape(&profile.name));
    let _ = write!(doc, " autoLoad=\"{}\"", profile.auto_load);
    doc.push_str(">\n");

    if !profile.identity.is_empty() {
        doc.push_str("  <match");
        if let Some(name) = &profile.identity.name_contains {
            let _ = write!(doc, " name=\"{}\"", escape(name));
        }
        if let Some(vendor) = profile.identity.vendor {
            let _ = write!(doc, " vendor=\"0x{vendor:04x}\"");
        }
        if let Some(product) = profile.identity.product {
            let _ = write!(doc, " product=\"0x{product:04x}\"");
        }
        doc.push_str("/>\n");
    }

    if !profile.virtual_controls().is_empty() {
        doc.push_str("  <virtualControls>\n");
        for vc in profile.virtual_controls() {
            let _ = write!(doc, "    <virtualControl name=\"{}\">\n", escape(vc.name()));
            for state in vc.states() {
                write_state(&mut doc, state, profile, 6);
            }
            doc.push_str("    </virtualControl>\n");
        }
        doc.push_str("  </virtualControls>\n");
    }

    if !profile.shift_levels().is_empty() {
        doc.push_str("  <shiftLevels>\n");
        for level in profile.shift_levels() {
            doc.push_str("    <shiftLevel>\n");
            for state in level.states() {
                write_state(&mut doc, state, profile, 6);
            }
            doc.push_str("    </shiftLevel>\n");
        }
        doc.push_str("  </shiftLevels>\n");
    }

    if !profile.control_profiles().is_empty() {
        doc.push_str("  <controls>\n");
        for control_profile in profile.control_profiles() {
            write_control_profile(&mut doc, control_profile, profile);
        }
        doc.push_str("  </controls>\n");
    }

    doc.push_str("</profile>\n");
    doc
}

fn write_state(doc: &mut String, state: &VirtualState, profile: &Profile, indent: usize) {
    let pad = " ".repeat(indent);
    if state.constraints().is_empty() {
        let _ = writeln!(doc, "{pad}<state/>");
        return;
    }
    let _ = writeln!(doc, "{pad}<state>");
    for constraint in state.constraints() {
        let control = constraint.control();
        let reference = match control.kind {
            ControlKind::Key => format!("kind=\"key\" code=\"{}\"", control.code),
            ControlKind::Axis => format!("kind=\"axis\" code=\"{}\"", control.code),
            ControlKind::Virtual => {
                let name = profile
                    .virtual_control_by_code(control.code)
                    .map_or("", |vc| vc.name());
                format!("kind=\"virtual\" name=\"{}\"", escape(name))
            }
        };
        match constraint {
            ControlConstraint::Single { value, .. } => {
                let _ = writeln!(doc, "{pad}  <single {reference} value=\"{value}\"/>");
            }
            ControlConstraint::Range { from, to, .. } => {
                let _ = writeln!(doc, "{pad}  <range {reference} from=\"{from}\" to=\"{to}\"/>");
            }
        }
    }
    let _ = writeln!(doc, "{pad}</state>");
}

fn write_control_profile(doc: &mut String, control_profile: &ControlProfile, profile: &Profile) {
    match control_profile {
        ControlProfile::Key(key_profile) => {
            let _ = writeln!(
                doc,
                "    <control kind=\"key\" code=\"{}\">",
                key_profile.control.code
            );
            write_tree(doc, &key_profile.tree, 6);
            doc.push_str("    </control>\n");
        }
        ControlProfile::Virtual(vc_profile) => {
            let name = profile
                .virtual_control_by_code(vc_profile.control.code)
                .map_or("", |vc| vc.name());
            let _ = writeln!(doc, "    <control kind=\"virtual\" name=\"{}\">", escape(name));
            for (value, tree) in &vc_profile.trees {
                let _ = writeln!(doc, "      <forState value=\"{value}\">");
                write_tree(doc, tree, 8);
                doc.push_str("      </forState>\n");
            }
            doc.push_str("    </control>\n");
        }
    }
}

fn write_tree(doc: &mut String, tree: &HandlerTree, indent: usize) {
    let pad = " ".repeat(indent);
    for child in tree.children() {
        match child {
            HandlerChild::Action(action) => write_action(doc, action, indent),
            HandlerChild::Shift(handler) => {
                let _ = writeln!(
                    doc,
                    "{pad}<shift from=\"{}\" to=\"{}\">",
                    handler.from_state(),
                    handler.to_state()
                );
                write_tree(doc, handler.tree(), indent + 2);
                let _ = writeln!(doc, "{pad}</shift>");
            }
        }
    }
}

fn write_action(doc: &mut String, action: &Action, indent: usize) {
    let pad = " ".repeat(indent);
    match action {
        Action::Simple(simple) => {
            let _ = write!(doc, "{pad}<action type=\"simple\"");
            if let Some(delay) = simple.repeat_delay_ms {
                let _ = write!(doc, " repeatDelay=\"{delay}\"");
            }
            if simple.combinations.is_empty() {
                doc.push_str("/>\n");
                return;
            }
            doc.push_str(">\n");
            for combination in &simple.combinations {
                let _ = write!(doc, "{pad}  <combination key=\"{}\"", combination.key);
                if !combination.modifiers.is_empty() {
                    let modifiers = combination
                        .modifiers
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(",");
                    let _ = write!(doc, " modifiers=\"{modifiers}\"");
                }
                doc.push_str("/>\n");
            }
            let _ = writeln!(doc, "{pad}</action>");
        }
        Action::Advanced(advanced) => {
            let _ = writeln!(doc, "{pad}<action type=\"advanced\">");
            write_command_list(doc, "enter", &advanced.enter, indent + 2);
            write_command_list(doc, "repeat", &advanced.repeat, indent + 2);
            write_command_list(doc, "leave", &advanced.leave, indent + 2);
            let _ = writeln!(doc, "{pad}</action>");
        }
        // Script actions never come out of the parser; there is nothing to
        // serialize for them.
        Action::Script => {
            let _ = writeln!(doc, "{pad}<action type=\"script\"/>");
        }
    }
}

fn write_command_list(doc: &mut String, name: &str, commands: &[Command], indent: usize) {
    let pad = " ".repeat(indent);
    if commands.is_empty() {
        return;
    }
    let _ = writeln!(doc, "{pad}<{name}>");
    for command in commands {
        match command {
            Command::KeyPress(code) => {
                let _ = writeln!(doc, "{pad}  <press code=\"{code}\"/>");
            }
            Command::KeyRelease(code) => {
                let _ = writeln!(doc, "{pad}  <release code=\"{code}\"/>");
            }
            Command::Delay(ms) => {
                let _ = writeln!(doc, "{pad}  <delay ms=\"{ms}\"/>");
            }
        }
    }
    let _ = writeln!(doc, "{pad}</{name}>");
}

/// Escapes text for use in an XML attribute value.
fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

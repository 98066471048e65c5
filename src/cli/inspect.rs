//! Inspect command: summarize a profile's structure.

use crate::cli::common::{CliError, CliResult};
use crate::codegen::distinct_state_count;
use crate::models::{ControlKind, ControlProfile};
use crate::names::NameDb;
use crate::parser;
use clap::Args;
use serde_json::json;
use std::path::PathBuf;

/// Show a summary of a profile document
#[derive(Debug, Clone, Args)]
pub struct InspectArgs {
    /// Path to the profile XML document
    #[arg(short, long, value_name = "FILE")]
    pub profile: PathBuf,

    /// Emit machine-readable JSON instead of text
    #[arg(long)]
    pub json: bool,
}

impl InspectArgs {
    /// Execute the inspect command.
    pub fn execute(&self) -> CliResult<()> {
        let names = NameDb::load().map_err(|e| CliError::io(e.to_string()))?;
        let profile = parser::parse_profile(&self.profile, &names)
            .map_err(|e| CliError::validation(format!("{e:#}")))?;

        let num_levels = profile.shift_levels().len();
        let controls: Vec<_> = profile
            .control_profiles()
            .iter()
            .map(|control_profile| {
                let control = control_profile.control();
                let label = match control.kind {
                    ControlKind::Virtual => profile
                        .virtual_control_by_code(control.code)
                        .map_or_else(|| control.to_string(), |vc| format!("virtual {}", vc.name())),
                    _ => names
                        .name_for(control)
                        .map_or_else(|| control.to_string(), str::to_string),
                };
                let kind = match control_profile {
                    ControlProfile::Key(_) => "key",
                    ControlProfile::Virtual(_) => "virtual",
                };
                (label, kind, distinct_state_count(control_profile, num_levels))
            })
            .collect();

        if self.json {
            let output = json!({
                "name": profile.name,
                "autoLoad": profile.auto_load,
                "virtualControls": profile
                    .virtual_controls()
                    .iter()
                    .map(|vc| json!({ "name": vc.name(), "states": vc.num_states() }))
                    .collect::<Vec<_>>(),
                "shiftLevels": profile
                    .shift_levels()
                    .iter()
                    .map(|level| json!({ "states": level.num_states() }))
                    .collect::<Vec<_>>(),
                "controls": controls
                    .iter()
                    .map(|(label, kind, states)| {
                        json!({ "control": label, "kind": kind, "distinctStates": states })
                    })
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&output).unwrap());
            return Ok(());
        }

        println!("Profile: {}", profile.name);
        println!("  Auto-load: {}", profile.auto_load);
        if !profile.virtual_controls().is_empty() {
            println!("  Virtual controls:");
            for vc in profile.virtual_controls() {
                println!("    {} ({} states)", vc.name(), vc.num_states());
            }
        }
        if num_levels > 0 {
            println!("  Shift levels:");
            for (index, level) in profile.shift_levels().iter().enumerate() {
                println!("    level {index}: {} states", level.num_states());
            }
        }
        println!("  Controls:");
        for (label, kind, states) in &controls {
            println!("    {label} ({kind}): {states} distinct state(s)");
        }
        Ok(())
    }
}

//! Validate command for profile documents.

use crate::cli::common::{CliError, CliResult};
use crate::codegen::ProfileValidator;
use crate::names::NameDb;
use crate::parser;
use clap::Args;
use serde_json::json;
use std::path::PathBuf;

/// Validate a profile document
#[derive(Debug, Clone, Args)]
pub struct ValidateArgs {
    /// Path to the profile XML document
    #[arg(short, long, value_name = "FILE")]
    pub profile: PathBuf,

    /// Emit machine-readable JSON instead of text
    #[arg(long)]
    pub json: bool,
}

impl ValidateArgs {
    /// Execute the validate command.
    pub fn execute(&self) -> CliResult<()> {
        let names = NameDb::load().map_err(|e| CliError::io(e.to_string()))?;

        let profile = match parser::parse_profile(&self.profile, &names) {
            Ok(profile) => profile,
            Err(error) => {
                let message = format!("{error:#}");
                if self.json {
                    let output = json!({
                        "valid": false,
                        "errors": [{ "message": message }],
                        "warnings": [],
                    });
                    println!("{}", serde_json::to_string_pretty(&output).unwrap());
                } else {
                    eprintln!("Parse failed: {message}");
                }
                return Err(CliError::validation(message));
            }
        };

        let report = ProfileValidator::new(&profile).validate();

        if self.json {
            let output = json!({
                "valid": report.is_valid(),
                "errors": report
                    .errors
                    .iter()
                    .map(|e| json!({ "kind": e.kind.to_string(), "message": e.message }))
                    .collect::<Vec<_>>(),
                "warnings": report
                    .warnings
                    .iter()
                    .map(|w| json!({ "message": w.message }))
                    .collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&output).unwrap());
        } else if report.is_valid() {
            println!("Profile '{}' is valid", profile.name);
            for warning in &report.warnings {
                println!("  warning: {warning}");
            }
        } else {
            println!("{}", report.format_message());
        }

        if report.is_valid() {
            Ok(())
        } else {
            Err(CliError::validation("Profile validation failed"))
        }
    }
}

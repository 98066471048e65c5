//! Names command: list or search the control name database.

use crate::cli::common::{CliError, CliResult};
use crate::names::NameDb;
use clap::Args;
use serde_json::json;

/// List known key and axis names
#[derive(Debug, Clone, Args)]
pub struct NamesArgs {
    /// Only show entries whose name or alias contains this text
    #[arg(short, long, value_name = "TEXT")]
    pub filter: Option<String>,

    /// Emit machine-readable JSON instead of text
    #[arg(long)]
    pub json: bool,
}

impl NamesArgs {
    /// Execute the names command.
    pub fn execute(&self) -> CliResult<()> {
        let db = NameDb::load().map_err(|e| CliError::io(e.to_string()))?;
        let entries = match &self.filter {
            Some(filter) => db.search(filter),
            None => db.search(""),
        };

        if self.json {
            let output = entries
                .iter()
                .map(|(kind, code, name)| {
                    json!({ "kind": kind.to_string(), "code": code, "name": name })
                })
                .collect::<Vec<_>>();
            println!("{}", serde_json::to_string_pretty(&output).unwrap());
            return Ok(());
        }

        if entries.is_empty() {
            println!("No matching names");
            return Ok(());
        }
        for (kind, code, name) in entries {
            println!("{kind:7} {code:>5}  {name}");
        }
        Ok(())
    }
}

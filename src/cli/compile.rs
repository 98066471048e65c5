//! Compile command: profile document in, runtime document out.

use crate::cli::common::{CliError, CliResult};
use crate::codegen::{normalize_for_deterministic, ProfileValidator, RuntimeGenerator};
use crate::config::Config;
use crate::names::NameDb;
use crate::parser;
use clap::Args;
use std::path::PathBuf;

/// Compile a profile into its runtime document
#[derive(Debug, Clone, Args)]
pub struct CompileArgs {
    /// Path to the profile XML document
    #[arg(short, long, value_name = "FILE")]
    pub profile: PathBuf,

    /// Output directory (defaults to the configured output directory)
    #[arg(short, long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Write to this exact file instead of <out-dir>/<profile>.runtime.xml
    #[arg(long, value_name = "FILE", conflicts_with = "out_dir")]
    pub out_file: Option<PathBuf>,

    /// Use a stable timestamp for reproducible output (for testing)
    #[arg(long)]
    pub deterministic: bool,
}

impl CompileArgs {
    /// Execute the compile command.
    pub fn execute(&self) -> CliResult<()> {
        let names = NameDb::load().map_err(|e| CliError::io(e.to_string()))?;
        let profile = parser::parse_profile(&self.profile, &names)
            .map_err(|e| CliError::validation(format!("{e:#}")))?;

        // The parser enforces everything, but keep the reports aligned for
        // profiles produced by other frontends.
        let report = ProfileValidator::new(&profile).validate();
        if !report.is_valid() {
            return Err(CliError::validation(format!(
                "Profile validation failed:\n{}",
                report.format_message()
            )));
        }
        for warning in &report.warnings {
            eprintln!("warning: {warning}");
        }

        let mut runtime = RuntimeGenerator::new(&profile)
            .generate()
            .map_err(|e| CliError::io(format!("Failed to generate runtime document: {e}")))?;
        if self.deterministic {
            runtime = normalize_for_deterministic(&runtime);
        }

        let out_path = match &self.out_file {
            Some(path) => path.clone(),
            None => {
                let out_dir = match &self.out_dir {
                    Some(dir) => dir.clone(),
                    None => {
                        Config::load()
                            .map_err(|e| CliError::io(e.to_string()))?
                            .build
                            .output_dir
                    }
                };
                std::fs::create_dir_all(&out_dir).map_err(|e| {
                    CliError::io(format!(
                        "Failed to create output directory {}: {e}",
                        out_dir.display()
                    ))
                })?;
                let stem = self
                    .profile
                    .file_stem()
                    .map_or_else(|| "profile".to_string(), |s| s.to_string_lossy().to_string());
                out_dir.join(format!("{stem}.runtime.xml"))
            }
        };

        std::fs::write(&out_path, runtime)
            .map_err(|e| CliError::io(format!("Failed to write {}: {e}", out_path.display())))?;

        println!("Compiled profile '{}'", profile.name);
        println!("  Output: {}", out_path.display());
        Ok(())
    }
}

//! Check-config command - load, validate and print the effective settings

use clap::Args;
use colored::Colorize;
use cpu_p95_config::Settings;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct CheckConfigCommand {
    /// Only validate, do not print the settings
    #[arg(short, long)]
    quiet: bool,
}

impl CheckConfigCommand {
    pub fn execute(&self, config_path: Option<PathBuf>) -> anyhow::Result<()> {
        let settings = Settings::load(config_path)?;
        settings.validate()?;

        if !self.quiet {
            print!("{}", serde_yaml::to_string(&settings)?);
        }
        eprintln!("{}", "✓ Configuration is valid".green());
        Ok(())
    }
}

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use edito_core::{BuildPipeline, BuildRequest, load_config};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Interpret the configuration script and print its directives
    Check {
        /// Script to check instead of the default
        path: Option<PathBuf>,
    },
    /// Compile the configuration script into a loadable artifact
    Compile {
        /// Script to compile instead of the default
        path: Option<PathBuf>,
        /// Where to write the artifact
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the effective host settings
    Show,
    /// Show file locations
    Path,
}

pub fn run(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Check { path } => check(path.unwrap_or_else(edito_paths::config_source)),
        ConfigCommands::Compile { path, output } => {
            let source = path.unwrap_or_else(edito_paths::config_source);
            let output = output.unwrap_or_else(edito_paths::compiled_config);
            compile(source, output)
        }
        ConfigCommands::Show => show_settings(),
        ConfigCommands::Path => show_paths(),
    }
}

fn check(path: PathBuf) -> Result<()> {
    if !path.is_file() {
        println!("No configuration at {}", path.display());
        return Ok(());
    }

    let script = load_config(&path)?;
    for directive in &script.directives {
        println!("{directive}");
    }
    for skipped in &script.skipped {
        println!(
            "skipped {} on line {}: {}",
            skipped.method, skipped.line, skipped.reason
        );
    }
    if script.is_empty() {
        println!("No directives in {}", path.display());
    }
    Ok(())
}

fn compile(source: PathBuf, output: PathBuf) -> Result<()> {
    // Refuse to build something the host could not interpret
    load_config(&source)?;

    let settings = super::load_settings()?;
    tracing::debug!(
        cargo = %settings.build.cargo.display(),
        release = settings.build.release,
        "Compiling configuration"
    );
    let pipeline = BuildPipeline::new(settings.build);
    let artifact = pipeline
        .compile(&BuildRequest::config(&source, &output))
        .with_context(|| format!("Failed to compile {}", source.display()))?;
    println!("Compiled {} -> {}", source.display(), artifact.path.display());
    Ok(())
}

fn show_settings() -> Result<()> {
    let settings = super::load_settings()?;
    println!("{}", toml::to_string_pretty(&settings)?);
    Ok(())
}

fn show_paths() -> Result<()> {
    println!("Config source:   {}", edito_paths::config_source().display());
    println!("Compiled config: {}", edito_paths::compiled_config().display());
    println!("Settings:        {}", edito_paths::settings_file().display());
    println!("Plugin sources:  {}", edito_paths::plugin_source_dir().display());
    println!("Plugin store:    {}", edito_paths::plugin_dir().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        cmd: ConfigCommands,
    }

    #[test]
    fn test_config_args_parsing() {
        let cli = TestCli::parse_from(["test", "check"]);
        assert!(matches!(cli.cmd, ConfigCommands::Check { path: None }));

        let cli = TestCli::parse_from(["test", "compile", "my.rs", "-o", "out.so"]);
        assert!(matches!(
            cli.cmd,
            ConfigCommands::Compile { path: Some(ref p), output: Some(ref o) }
                if p == &PathBuf::from("my.rs") && o == &PathBuf::from("out.so")
        ));

        let cli = TestCli::parse_from(["test", "path"]);
        assert!(matches!(cli.cmd, ConfigCommands::Path));
    }

    #[test]
    fn test_check_missing_and_broken_files() {
        let dir = TempDir::new().unwrap();
        assert!(check(dir.path().join("config.rs")).is_ok());

        let broken = dir.path().join("broken.rs");
        std::fs::write(&broken, "pub fn init(editor: &mut ConfigEditor) {").unwrap();
        assert!(check(broken.clone()).is_err());
        assert!(compile(broken, dir.path().join("broken.so")).is_err());
    }
}

//! `edito start`: run the host startup sequence without a terminal

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use edito_core::build::BuildAction;
use edito_core::host::{ConfigOrigin, StartupReport};
use edito_core::{Host, HostPaths, MemorySurface};
use tracing::info;

#[derive(Args)]
pub struct StartArgs {
    /// Configuration script to use instead of the default
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Interpret the configuration without compiling it
    #[arg(long)]
    pub no_compile: bool,
}

pub fn run(args: StartArgs) -> Result<()> {
    let mut settings = super::load_settings()?;
    if args.no_compile {
        settings.compile_config = false;
    }

    let mut paths = HostPaths::from_settings(&settings);
    if let Some(config) = args.config {
        paths.compiled_config = config.with_extension(std::env::consts::DLL_EXTENSION);
        paths.config_source = config;
    }

    info!(
        config = %paths.config_source.display(),
        store = %paths.store_dir.display(),
        "Starting edito host"
    );
    let surface = Arc::new(MemorySurface::new());
    let host = Host::with_paths(settings, paths, surface.clone());
    let report = host.start()?;

    print_report(&report);
    if !surface.commands().is_empty() {
        println!("Commands:    {}", surface.commands().join(", "));
    }
    for message in surface.messages() {
        println!("Message:     {message}");
    }
    Ok(())
}

fn print_report(report: &StartupReport) {
    let config = match &report.config {
        ConfigOrigin::None => "none".to_string(),
        ConfigOrigin::Interpreted => "interpreted".to_string(),
        ConfigOrigin::Compiled { path } => format!("compiled ({})", path.display()),
    };
    println!("Config:      {config}");
    match &report.config_build {
        Some(BuildAction::UpToDate) => println!("Build:       up to date"),
        Some(BuildAction::Rebuilt) => println!("Build:       rebuilt"),
        Some(BuildAction::FellBack { reason }) => {
            println!("Build:       failed, using previous build");
            println!("{reason}");
        }
        None => {}
    }
    println!("Directives:  {}", report.directives.len());
    for skipped in &report.skipped {
        println!(
            "  skipped {} on line {}: {}",
            skipped.method, skipped.line, skipped.reason
        );
    }

    let installs = &report.installs;
    if !installs.installed.is_empty() || !installs.skipped.is_empty() || !installs.failed.is_empty()
    {
        println!(
            "Installed:   {} new, {} present, {} failed",
            installs.installed.len(),
            installs.skipped.len(),
            installs.failed.len()
        );
        for failure in &installs.failed {
            println!("  ✗ {}: {}", failure.name, failure.error);
        }
    }

    for name in &report.built {
        println!("Built:       {name}");
    }
    for failure in &report.build_failures {
        let note = if failure.kept_previous {
            " (previous build kept)"
        } else {
            ""
        };
        println!("  ✗ {}{note}: {}", failure.name, failure.reason);
    }

    if report.loaded.is_empty() {
        println!("Plugins:     none loaded");
    } else {
        println!("Plugins:     {}", report.loaded.join(", "));
    }
    for failure in &report.load_failures {
        println!("  ✗ {}: {}", failure.name, failure.error);
    }
}

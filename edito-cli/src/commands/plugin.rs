//! Plugin management commands

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use edito_core::{
    ArtifactStore, AutoInstaller, BuildPipeline, BuildRequest, Origin, PluginSpec, RegistryClient,
    Settings, load_config,
};
use tracing::debug;

/// Plugin management arguments
#[derive(Args)]
pub struct PluginArgs {
    #[command(subcommand)]
    pub command: PluginCommands,
}

/// Plugin subcommands
#[derive(Subcommand)]
pub enum PluginCommands {
    /// List installed plugins
    List,
    /// Search the package registry
    Search {
        /// Text to look for in names and descriptions
        query: String,
    },
    /// Install a prebuilt plugin from the package registry
    Install {
        /// Package name
        name: String,
    },
    /// Remove an installed plugin
    Uninstall {
        /// Plugin name
        name: String,
    },
    /// Build the plugins requested by `install_plugin` in the configuration
    Sync,
    /// Build a local plugin source file into the plugin store
    Build {
        /// Plugin source (`.rs`)
        source: PathBuf,
        /// Name to install under, the file stem if omitted
        #[arg(long)]
        name: Option<String>,
    },
}

/// Run plugin command
pub async fn run(args: PluginArgs) -> Result<()> {
    let settings = super::load_settings()?;
    let store = ArtifactStore::new(&settings.plugin_dir);
    debug!(store = %store.root().display(), registry = %settings.registry_url, "Plugin command");

    match args.command {
        PluginCommands::List => list_plugins(&store),
        PluginCommands::Search { query } => search(&settings, store, &query).await,
        PluginCommands::Install { name } => install(&settings, store, &name).await,
        PluginCommands::Uninstall { name } => uninstall(&settings, store, &name),
        PluginCommands::Sync => sync(&settings, store),
        PluginCommands::Build { source, name } => build(&settings, &store, source, name),
    }
}

fn list_plugins(store: &ArtifactStore) -> Result<()> {
    let names = store.list()?;
    if names.is_empty() {
        println!("No plugins installed");
        println!();
        println!("Plugin store: {}", store.root().display());
        println!();
        println!("To install a plugin:");
        println!("  edito plugin search <text>");
        println!("  edito plugin install <name>");
        return Ok(());
    }

    for name in names {
        let record = store.record_for(&name).unwrap_or_else(|e| {
            tracing::warn!("Failed to read install record for {}: {}", name, e);
            None
        });
        let origin = match record {
            Some(record) => match record.origin {
                Origin::Registry { version } => format!("registry v{version}"),
                Origin::Source {
                    repository,
                    version,
                } => format!("{repository} @ {version}"),
                Origin::Local { source } => format!("local {}", source.display()),
            },
            None => "unknown origin".to_string(),
        };
        println!("{name}    {origin}");
    }
    Ok(())
}

async fn search(settings: &Settings, store: ArtifactStore, query: &str) -> Result<()> {
    let client = RegistryClient::new(&settings.registry_url, store);
    client
        .refresh()
        .await
        .with_context(|| format!("Failed to fetch catalog from {}", client.base_url()))?;

    let matches = client.search(query);
    if matches.is_empty() {
        println!("No packages match '{query}'");
        return Ok(());
    }
    for package in matches {
        let description = if package.description.is_empty() {
            "No description"
        } else {
            &package.description
        };
        println!("{} v{}    {}", package.name, package.version, description);
    }
    Ok(())
}

async fn install(settings: &Settings, store: ArtifactStore, name: &str) -> Result<()> {
    let client = RegistryClient::new(&settings.registry_url, store);
    client.refresh().await?;
    let path = client.install(name).await?;
    println!("Installed {name} to {}", path.display());
    Ok(())
}

fn uninstall(settings: &Settings, store: ArtifactStore, name: &str) -> Result<()> {
    RegistryClient::new(&settings.registry_url, store).uninstall(name)?;
    println!("Uninstalled {name}");
    Ok(())
}

fn sync(settings: &Settings, store: ArtifactStore) -> Result<()> {
    let script = load_config(&edito_paths::config_source())?;
    let specs: Vec<PluginSpec> = script
        .directives
        .iter()
        .filter_map(PluginSpec::from_directive)
        .collect();
    if specs.is_empty() {
        println!("No install_plugin requests in the configuration");
        return Ok(());
    }

    let installer = AutoInstaller::with_pipeline(store, BuildPipeline::new(settings.build.clone()));
    let report = installer.check_and_install(&specs);
    for name in &report.installed {
        println!("✓ {name} installed");
    }
    for name in &report.skipped {
        println!("○ {name} already installed");
    }
    for failure in &report.failed {
        tracing::warn!(plugin = %failure.name, error = %failure.error, "Install failed");
        println!("✗ {}: {}", failure.name, failure.error);
    }
    if !report.is_success() {
        bail!("{} plugin(s) failed to install", report.failed.len());
    }
    Ok(())
}

fn build(
    settings: &Settings,
    store: &ArtifactStore,
    source: PathBuf,
    name: Option<String>,
) -> Result<()> {
    let name = match name {
        Some(name) => name,
        None => plugin_name(&source)?,
    };

    store.ensure_dir()?;
    let output = store.artifact_path(&name)?;
    let pipeline = BuildPipeline::new(settings.build.clone());
    pipeline
        .compile(&BuildRequest::plugin(&source, &output))
        .with_context(|| format!("Failed to build {}", source.display()))?;
    store.record(&name, Origin::Local { source })?;

    println!("Built {name} -> {}", output.display());
    Ok(())
}

fn plugin_name(source: &std::path::Path) -> Result<String> {
    match source.file_stem().and_then(|s| s.to_str()) {
        Some(stem) if !stem.is_empty() => Ok(stem.to_string()),
        _ => bail!("Cannot derive a plugin name from {}", source.display()),
    }
}

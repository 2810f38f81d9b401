//! Letterpress - a build tool for static, email-ready HTML templates.

mod build;
mod cli;
mod compiler;
mod config;
mod init;
mod logger;
mod reload;
mod serve;
mod tasks;
mod watch;

use anyhow::{Result, bail};
use build::{BuildContext, build_site};
use clap::Parser;
use cli::{Cli, Commands};
use config::SiteConfig;
use init::new_site;
use serve::serve_site;
use std::{path::Path, sync::Arc};

fn main() -> Result<()> {
    let cli: &'static Cli = Box::leak(Box::new(Cli::parse()));
    let config: &'static SiteConfig = Box::leak(Box::new(load_config(cli)?));

    match &cli.command {
        Commands::Init { name } => new_site(config, name.is_some()),
        Commands::Build { .. } => {
            let ctx = BuildContext::new(config)?;
            build_site(&ctx)
        }
        Commands::Serve { .. } => {
            let ctx = Arc::new(BuildContext::new(config)?);
            build_site(&ctx)?;
            serve_site(config, ctx)
        }
    }
}

/// Load and validate configuration from CLI arguments
fn load_config(cli: &'static Cli) -> Result<SiteConfig> {
    let root = cli.root.as_deref().unwrap_or(Path::new("./"));
    let config_path = root.join(&cli.config);

    let mut config = if config_path.exists() {
        SiteConfig::from_path(&config_path)?
    } else {
        SiteConfig::default()
    };
    config.update_with_cli(cli);

    // Validate config state based on command
    let config_exists = config.config_path.exists();
    match (cli.is_init(), config_exists) {
        (true, true) => {
            bail!("Config file already exists. Remove it manually or init in a different path.")
        }
        (false, false) => bail!("Config file not found."),
        _ => {}
    }

    if !cli.is_init() {
        config.validate()?;
    }

    Ok(config)
}

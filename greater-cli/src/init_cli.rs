//! `greater init`

use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::Path;

use greater_core::config::{InstallConfig, InstallMode};

use crate::resolve_config_path;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// How the project consumes the library: vendored or hybrid
    #[clap(long, default_value = "hybrid")]
    pub mode: InstallMode,

    /// Pin a registry ref instead of following the latest release
    #[clap(long = "ref")]
    pub git_ref: Option<String>,

    /// Require signed registry tags for every install
    #[clap(long)]
    pub verify_signatures: bool,

    /// Replace an existing components.json
    #[clap(long)]
    pub force: bool,
}

pub fn execute(config_path: Option<&Path>, args: InitArgs) -> Result<()> {
    let path = resolve_config_path(config_path);

    if path.exists() && !args.force {
        bail!(
            "{} already exists\n\nRe-run with --force to replace it.",
            path.display()
        );
    }

    let config = InstallConfig {
        install_mode: args.mode,
        git_ref: args.git_ref,
        verify_signatures: args.verify_signatures,
        ..InstallConfig::default()
    };
    config
        .save(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    println!("✓ Created {} ({} mode)", path.display(), config.install_mode);
    println!("  Components install into {}", config.aliases.greater);
    Ok(())
}

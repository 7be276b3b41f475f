//! `greater add`

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use greater_core::audit::AuditLog;
use greater_core::config::alias_dir;
use greater_core::install::{InstallOptions, InstallOutcome, Installer};
use greater_core::integrity::GitTagProbe;
use greater_core::registry::{FetchOptions, FALLBACK_REF};

use crate::ProjectContext;

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Components, faces or shared modules to install
    #[clap(required = true)]
    pub names: Vec<String>,

    /// Registry ref to install from (overrides components.json)
    #[clap(long = "ref")]
    pub git_ref: Option<String>,

    /// Overwrite files that already exist
    #[clap(long)]
    pub force: bool,

    /// Install without checking file checksums (not recommended)
    #[clap(long)]
    pub skip_verify: bool,

    /// Require a valid signature on the registry tag
    #[clap(long)]
    pub verify_signature: bool,

    /// Install directory (defaults to the `greater` alias)
    #[clap(long)]
    pub target: Option<PathBuf>,

    /// Bypass the cached registry index
    #[clap(long)]
    pub refresh: bool,

    /// Git checkout of the registry repository used by `--verify-signature`
    /// (defaults to `registry.checkout`, then the current directory)
    #[clap(long)]
    pub repo: Option<PathBuf>,
}

pub async fn execute(ctx: &ProjectContext, args: AddArgs) -> Result<()> {
    let fetcher = ctx.fetcher()?;
    let cache = ctx.index_cache(fetcher.clone());

    let resolved = cache
        .resolve_ref(args.git_ref.as_deref(), ctx.config.git_ref.as_deref(), FALLBACK_REF)
        .await;
    info!("Installing from {} ({})", resolved.git_ref, resolved.source);

    let index = cache
        .fetch_registry_index(
            &resolved.git_ref,
            &FetchOptions {
                force_refresh: args.refresh,
                ..FetchOptions::default()
            },
        )
        .await
        .with_context(|| format!("Failed to load registry index for {}", resolved.git_ref))?;

    let target = match args.target {
        Some(target) => target,
        None => alias_dir(&ctx.project_root, &ctx.config.aliases.greater)
            .context("Invalid aliases.greater in components.json")?,
    };

    let probe = GitTagProbe::new(Arc::new(ctx.git_runner(args.repo)));
    let installer = Installer::new(fetcher, index, resolved.git_ref.clone(), &ctx.config, &target)
        .with_audit_log(AuditLog::new(&ctx.paths.audit_log))
        .with_signature_probe(Arc::new(probe));

    let options = InstallOptions {
        force: args.force,
        skip_verification: args.skip_verify,
        verify_signature: args.verify_signature || ctx.config.verify_signatures,
    };

    for name in &args.names {
        let outcomes = installer
            .install(name, options)
            .await
            .with_context(|| format!("Failed to install '{name}'"))?;

        for outcome in &outcomes {
            print_outcome(outcome);
        }
    }

    println!("\nInstalled into {} from {}", target.display(), resolved.git_ref);
    Ok(())
}

fn print_outcome(outcome: &InstallOutcome) {
    let status = if outcome.verified() {
        "verified"
    } else {
        "unverified"
    };
    let verb = if outcome.replaced() { "Updated" } else { "Added" };

    println!(
        "✓ {} {} {} ({} files, {})",
        verb,
        outcome.kind,
        outcome.name,
        outcome.files.len(),
        status
    );
    for file in &outcome.files {
        if file.rewrites > 0 {
            println!(
                "    {} ({} imports rewritten)",
                file.destination.display(),
                file.rewrites
            );
        } else {
            println!("    {}", file.destination.display());
        }
    }
}

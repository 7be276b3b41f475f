//! `greater cache`

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::ProjectContext;

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Delete cached registry indexes
    Clear {
        /// Only clear the entry for this ref
        #[clap(long = "ref")]
        git_ref: Option<String>,
    },

    /// Print the cache directory
    Path,
}

impl CacheCommand {
    pub fn execute(self, ctx: &ProjectContext) -> Result<()> {
        let cache = ctx.index_cache(ctx.fetcher()?);

        match self {
            CacheCommand::Clear { git_ref: Some(git_ref) } => {
                let removed = cache
                    .clear_ref(&git_ref)
                    .with_context(|| format!("Failed to clear cache for {git_ref}"))?;
                println!("Removed {removed} cached files for {git_ref}");
            }
            CacheCommand::Clear { git_ref: None } => {
                let removed = cache.clear().context("Failed to clear registry cache")?;
                println!(
                    "Removed {removed} cached files from {}",
                    cache.cache_dir().display()
                );
            }
            CacheCommand::Path => println!("{}", cache.cache_dir().display()),
        }

        Ok(())
    }
}

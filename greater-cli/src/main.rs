//! Greater - install Svelte components from the versioned Greater registry
//!
//! Entry point: argument parsing, logging setup and command dispatch.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use greater_core::config::{InstallConfig, CONFIG_FILE};
use greater_core::integrity::GitCommandRunner;
use greater_core::paths::GreaterPaths;
use greater_core::registry::{GitHubRawFetcher, RegistryIndexCache};

mod audit_cli;
mod cache_cli;
mod init_cli;
mod install_cli;
mod registry_cli;

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "greater",
    about = "Install Greater components from the versioned registry",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Set log level
    #[clap(long, default_value = "warn", global = true)]
    log_level: LogLevel,

    /// Path to components.json (defaults to ./components.json)
    #[clap(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
enum Command {
    /// Install components, faces or shared modules into the project
    Add(install_cli::AddArgs),

    /// List what the registry offers at a ref
    List(registry_cli::ListArgs),

    /// Show which registry ref would be used
    Resolve(registry_cli::ResolveArgs),

    /// Check the signature on a registry tag
    VerifyTag(audit_cli::VerifyTagArgs),

    /// Manage the local registry index cache
    Cache {
        #[clap(subcommand)]
        command: cache_cli::CacheCommand,
    },

    /// Show recent entries from the audit log
    Audit(audit_cli::AuditArgs),

    /// Create components.json in the current project
    Init(init_cli::InitArgs),
}

/// Initialize tracing with CLI flags. Logs go to stderr, never stdout.
fn initialize_tracing(log_level: &LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_filter_directive()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// `--config`, or `components.json` in the working directory
pub(crate) fn resolve_config_path(config_path: Option<&Path>) -> PathBuf {
    config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
}

/// Everything a command needs to know about the project it runs in
pub(crate) struct ProjectContext {
    pub project_root: PathBuf,
    pub config: InstallConfig,
    pub paths: GreaterPaths,
}

impl ProjectContext {
    fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_path = resolve_config_path(config_path);
        let project_root = match config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let config = InstallConfig::load_from_path(&config_path)
            .with_context(|| format!("Failed to load {}", config_path.display()))?;
        let paths = GreaterPaths::discover()?;

        debug!(
            "Project root {} (mode: {}, cache: {})",
            project_root.display(),
            config.install_mode,
            paths.cache_dir.display()
        );

        Ok(Self {
            project_root,
            config,
            paths,
        })
    }

    pub fn fetcher(&self) -> Result<Arc<GitHubRawFetcher>> {
        let fetcher =
            GitHubRawFetcher::new(&self.config.registry).context("Failed to create registry client")?;
        Ok(Arc::new(fetcher))
    }

    pub fn index_cache(&self, fetcher: Arc<GitHubRawFetcher>) -> RegistryIndexCache {
        RegistryIndexCache::new(fetcher, &self.paths.cache_dir)
            .with_default_branch(self.config.registry.default_branch.clone())
            .with_ttl(self.config.registry.cache_ttl())
    }

    /// Git runner for tag checks: `--repo`, then `registry.checkout`, then
    /// the working directory
    pub fn git_runner(&self, repo: Option<PathBuf>) -> GitCommandRunner {
        match repo.or_else(|| self.config.registry.checkout_dir(&self.project_root)) {
            Some(dir) => {
                debug!("Running git in {}", dir.display());
                GitCommandRunner::default().in_dir(dir)
            }
            None => GitCommandRunner::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_tracing(&cli.log_level);

    let config_path = cli.config.as_deref();
    if let Command::Init(args) = cli.command {
        return init_cli::execute(config_path, args);
    }

    let ctx = ProjectContext::load(config_path)?;
    match cli.command {
        Command::Add(args) => install_cli::execute(&ctx, args).await,
        Command::List(args) => registry_cli::execute_list(&ctx, args).await,
        Command::Resolve(args) => registry_cli::execute_resolve(&ctx, args).await,
        Command::VerifyTag(args) => audit_cli::execute_verify_tag(&ctx, args).await,
        Command::Cache { command } => command.execute(&ctx),
        Command::Audit(args) => audit_cli::execute_audit(&ctx, args).await,
        Command::Init(_) => unreachable!("init handled before loading the project"),
    }
}

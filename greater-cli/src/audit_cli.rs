//! `greater audit` and `greater verify-tag`

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};
use tracing::warn;

use greater_core::audit::{AuditAction, AuditLog, AuditLogEntry, AuditQuery, VerificationRecord};
use greater_core::integrity::{verify_git_tag, GitTagProbe, SignatureStatus};

use crate::ProjectContext;

#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Maximum number of entries to show
    #[clap(long, default_value = "20")]
    pub limit: usize,

    /// Only show one kind of action (install, update, verify, security-warning, ...)
    #[clap(long)]
    pub action: Option<AuditAction>,

    /// Only show entries for one component
    #[clap(long)]
    pub component: Option<String>,

    /// Only show entries at or after this RFC 3339 timestamp
    #[clap(long)]
    pub since: Option<DateTime<Utc>>,

    /// Output as JSON
    #[clap(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct VerifyTagArgs {
    /// Tag to verify
    #[clap(value_name = "REF")]
    pub git_ref: String,

    /// Git checkout of the registry repository (defaults to `registry.checkout`,
    /// then the current directory)
    #[clap(long)]
    pub repo: Option<PathBuf>,

    /// Output as JSON
    #[clap(long)]
    pub json: bool,
}

/// Table row for audit entries
#[derive(Tabled)]
struct AuditRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "Ref")]
    git_ref: String,
    #[tabled(rename = "OK")]
    success: &'static str,
    #[tabled(rename = "Detail")]
    detail: String,
}

impl From<&AuditLogEntry> for AuditRow {
    fn from(entry: &AuditLogEntry) -> Self {
        let detail = entry
            .error_message
            .clone()
            .or_else(|| entry.warnings.as_ref().map(|w| w.join("; ")))
            .or_else(|| entry.signature_status.map(|s| format!("signature: {s}")))
            .unwrap_or_default();

        Self {
            time: entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            action: entry.action.to_string(),
            component: entry.component.clone().unwrap_or_default(),
            git_ref: entry.git_ref.clone().unwrap_or_default(),
            success: if entry.success { "yes" } else { "no" },
            detail,
        }
    }
}

pub async fn execute_audit(ctx: &ProjectContext, args: AuditArgs) -> Result<()> {
    let log = AuditLog::new(&ctx.paths.audit_log);
    let entries = log
        .read(&AuditQuery {
            limit: Some(args.limit),
            action: args.action,
            component: args.component,
            since: args.since,
        })
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No audit entries in {}", log.path().display());
        return Ok(());
    }

    let rows: Vec<AuditRow> = entries.iter().map(AuditRow::from).collect();
    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string();

    println!("{table}");
    Ok(())
}

pub async fn execute_verify_tag(ctx: &ProjectContext, args: VerifyTagArgs) -> Result<()> {
    let probe = GitTagProbe::new(Arc::new(ctx.git_runner(args.repo)));
    let result = verify_git_tag(&probe, &args.git_ref).await;

    let record = VerificationRecord {
        component: None,
        git_ref: args.git_ref.clone(),
        report: None,
        signature: Some(result.clone()),
    };
    if let Err(e) = AuditLog::new(&ctx.paths.audit_log).log_verification(&record).await {
        warn!("Failed to write verification to audit log: {}", e);
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Tag:       {}", result.git_ref);
        println!("Status:    {}", result.signature_status);
        if let Some(signer) = &result.signer {
            println!("Signer:    {signer}");
        }
        if let Some(key_id) = &result.key_id {
            println!("Key:       {key_id}");
        }
        if let Some(message) = &result.error_message {
            println!("Error:     {message}");
        }
    }

    match result.signature_status {
        SignatureStatus::Valid => Ok(()),
        status => bail!("Tag '{}' is not verified ({})", args.git_ref, status),
    }
}

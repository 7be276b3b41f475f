//! `greater list` and `greater resolve`

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

use greater_core::registry::{FetchOptions, RegistryIndex, ResolvedRef, FALLBACK_REF};

use crate::ProjectContext;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only show components matching this query (name, description, tags)
    pub query: Option<String>,

    /// Registry ref to list (overrides components.json)
    #[clap(long = "ref")]
    pub git_ref: Option<String>,

    /// Output as JSON
    #[clap(long)]
    pub json: bool,

    /// Bypass the cached registry index
    #[clap(long)]
    pub refresh: bool,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Explicit ref; wins over components.json and the latest pointer
    #[clap(long = "ref")]
    pub git_ref: Option<String>,

    /// Output as JSON
    #[clap(long)]
    pub json: bool,
}

/// Table row for registry entries
#[derive(Tabled, Serialize)]
struct EntryRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: &'static str,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Files")]
    files: usize,
    #[tabled(rename = "Description")]
    description: String,
}

fn entry_rows(index: &RegistryIndex, query: Option<&str>) -> Vec<EntryRow> {
    let describe = |d: &Option<String>| d.clone().unwrap_or_default();

    if let Some(query) = query {
        return index
            .search(query)
            .into_iter()
            .map(|c| EntryRow {
                name: c.name.clone(),
                kind: "component",
                version: c.version.clone(),
                files: c.files.len(),
                description: describe(&c.description),
            })
            .collect();
    }

    let components = index.components.values().map(|c| EntryRow {
        name: c.name.clone(),
        kind: "component",
        version: c.version.clone(),
        files: c.files.len(),
        description: describe(&c.description),
    });
    let faces = index.faces.values().map(|f| EntryRow {
        name: f.name.clone(),
        kind: "face",
        version: f.version.clone(),
        files: f.files.len(),
        description: describe(&f.description),
    });
    let shared = index.shared.values().map(|s| EntryRow {
        name: s.name.clone(),
        kind: "shared",
        version: s.version.clone(),
        files: s.files.len(),
        description: describe(&s.description),
    });

    components.chain(faces).chain(shared).collect()
}

pub async fn execute_list(ctx: &ProjectContext, args: ListArgs) -> Result<()> {
    let cache = ctx.index_cache(ctx.fetcher()?);
    let resolved = cache
        .resolve_ref(args.git_ref.as_deref(), ctx.config.git_ref.as_deref(), FALLBACK_REF)
        .await;

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

    let rows = entry_rows(&index, args.query.as_deref());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty() {
        println!("No registry entries found at {}", resolved.git_ref);
        return Ok(());
    }

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string();

    println!("Greater registry {} (v{})\n", resolved.git_ref, index.version);
    println!("{table}");
    Ok(())
}

pub async fn execute_resolve(ctx: &ProjectContext, args: ResolveArgs) -> Result<()> {
    let cache = ctx.index_cache(ctx.fetcher()?);
    let resolved: ResolvedRef = cache
        .resolve_ref(args.git_ref.as_deref(), ctx.config.git_ref.as_deref(), FALLBACK_REF)
        .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&resolved)?);
    } else {
        println!("{} (source: {})", resolved.git_ref, resolved.source);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> RegistryIndex {
        RegistryIndex::from_slice(
            br#"{
  "schemaVersion": "1.0.0",
  "version": "4.2.0",
  "ref": "greater-v4.2.0",
  "generatedAt": "2026-01-12T00:00:00Z",
  "components": {
    "button": { "name": "button", "version": "4.2.0", "description": "Button", "files": [] },
    "timeline": { "name": "timeline", "version": "4.2.0", "files": [], "tags": ["social"] }
  },
  "faces": {
    "social": { "name": "social", "version": "4.2.0", "components": ["timeline"] }
  },
  "shared": {
    "auth": { "name": "auth", "version": "4.2.0", "files": [] }
  }
}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_rows_cover_every_entry_kind() {
        let rows = entry_rows(&index(), None);
        let kinds: Vec<(&str, &str)> = rows.iter().map(|r| (r.name.as_str(), r.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("button", "component"),
                ("timeline", "component"),
                ("social", "face"),
                ("auth", "shared"),
            ]
        );
    }

    #[test]
    fn test_query_searches_components() {
        let rows = entry_rows(&index(), Some("social"));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "timeline");
    }
}

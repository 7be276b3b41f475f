//! Import specifier rewriting for script, stylesheet and Svelte sources

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::ops::Range;
use std::path::Path;

use super::mappings::{build_path_mappings, is_library_specifier, transform_path, PathMapping};
use super::scanner::{sanitize, ScanMode};
use crate::config::InstallConfig;

/// `import x from '...'`, `import type { X } from '...'`, `import '...'`
static STATIC_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bimport\s+(?:type\s+)?(?:[^'";]*?\bfrom\s*)?(['"])([^'"\n]*)['"]"#)
        .expect("valid static import regex")
});

/// `export * from '...'`, `export { a } from '...'`
static EXPORT_FROM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bexport\s+(?:type\s+)?(?:\*(?:\s+as\s+[\w$]+)?|\{[^}]*\})\s*from\s*(['"])([^'"\n]*)['"]"#)
        .expect("valid export regex")
});

/// `import('...')`
static DYNAMIC_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bimport\s*\(\s*(['"])([^'"\n]*)['"]"#).expect("valid dynamic import regex")
});

/// `@import '...'`, `@import url("...")`
static CSS_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"@import\s+(?:url\(\s*)?(['"])([^'"\n]*)['"]"#).expect("valid css import regex")
});

static SVELTE_SCRIPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<script\b[^>]*>(.*?)</script>").expect("valid script block regex"));

static SVELTE_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<style\b[^>]*>(.*?)</style>").expect("valid style block regex"));

/// A line that starts with a JS module statement
static JS_MODULE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:import|export)\b").expect("valid module line regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Svelte,
    Css,
    Script,
}

impl FileKind {
    /// Kind implied by a file extension, if it is one we rewrite
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "svelte" => Some(FileKind::Svelte),
            "css" | "scss" | "pcss" | "postcss" => Some(FileKind::Css),
            "js" | "ts" | "mjs" | "cjs" | "jsx" | "tsx" => Some(FileKind::Script),
            _ => None,
        }
    }

    /// Kind from the extension, else from the content itself
    pub fn detect(content: &str, file_path: Option<&str>) -> Self {
        if let Some(kind) = file_path.and_then(Self::from_path) {
            return kind;
        }

        if content.contains("<script") || content.contains("<style") {
            FileKind::Svelte
        } else if content.contains("@import") && !JS_MODULE_LINE.is_match(content) {
            FileKind::Css
        } else {
            FileKind::Script
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rewrite {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransformOutput {
    pub content: String,
    /// Applied rewrites in source order
    pub rewrites: Vec<Rewrite>,
}

impl TransformOutput {
    pub fn changed(&self) -> bool {
        !self.rewrites.is_empty()
    }
}

/// Byte ranges of every real import specifier in `source`
fn specifier_ranges(source: &str, mode: ScanMode) -> Vec<Range<usize>> {
    let sanitized = sanitize(source, mode);
    let patterns: Vec<&Regex> = match mode {
        ScanMode::Script => vec![&*STATIC_IMPORT, &*EXPORT_FROM, &*DYNAMIC_IMPORT],
        ScanMode::Css => vec![&*CSS_IMPORT],
    };

    let mut ranges: Vec<Range<usize>> = patterns
        .iter()
        .flat_map(|re| {
            re.captures_iter(&sanitized)
                .filter_map(|caps| caps.get(2).map(|m| m.range()))
                .collect::<Vec<_>>()
        })
        .collect();

    ranges.sort_by_key(|r| r.start);
    ranges.dedup_by_key(|r| r.start);
    ranges
}

fn rewrite_source(source: &str, mode: ScanMode, mappings: &[PathMapping], rewrites: &mut Vec<Rewrite>) -> String {
    let edits: Vec<(Range<usize>, String)> = specifier_ranges(source, mode)
        .into_iter()
        .filter_map(|range| {
            let original = &source[range.clone()];
            transform_path(original, mappings).map(|to| (range, to))
        })
        .collect();

    let mut output = source.to_string();
    for (range, to) in edits.iter().rev() {
        output.replace_range(range.clone(), to);
    }

    rewrites.extend(edits.into_iter().map(|(range, to)| Rewrite {
        from: source[range].to_string(),
        to,
    }));
    output
}

fn rewrite_svelte(source: &str, mappings: &[PathMapping], rewrites: &mut Vec<Rewrite>) -> String {
    let mut regions: Vec<(Range<usize>, ScanMode)> = SVELTE_SCRIPT
        .captures_iter(source)
        .filter_map(|caps| caps.get(1).map(|m| (m.range(), ScanMode::Script)))
        .chain(
            SVELTE_STYLE
                .captures_iter(source)
                .filter_map(|caps| caps.get(1).map(|m| (m.range(), ScanMode::Css))),
        )
        .collect();
    regions.sort_by_key(|(range, _)| range.start);

    let replacements: Vec<(Range<usize>, String)> = regions
        .into_iter()
        .map(|(range, mode)| {
            let body = rewrite_source(&source[range.clone()], mode, mappings, rewrites);
            (range, body)
        })
        .collect();

    let mut output = source.to_string();
    for (range, body) in replacements.into_iter().rev() {
        output.replace_range(range, &body);
    }
    output
}

/// Rewrite imports with a prebuilt mapping set
pub fn transform_imports_with(content: &str, mappings: &[PathMapping], file_path: Option<&str>) -> TransformOutput {
    let mut rewrites = Vec::new();
    let content = match FileKind::detect(content, file_path) {
        FileKind::Svelte => rewrite_svelte(content, mappings, &mut rewrites),
        FileKind::Css => rewrite_source(content, ScanMode::Css, mappings, &mut rewrites),
        FileKind::Script => rewrite_source(content, ScanMode::Script, mappings, &mut rewrites),
    };

    TransformOutput { content, rewrites }
}

/// Rewrite library imports in `content` for the project's install topology
pub fn transform_imports(content: &str, config: &InstallConfig, file_path: Option<&str>) -> TransformOutput {
    transform_imports_with(content, &build_path_mappings(config), file_path)
}

/// Whether any real import (not a comment or string) targets the library
pub fn has_greater_imports(content: &str, file_path: Option<&str>) -> bool {
    let is_greater = |source: &str, mode: ScanMode| {
        specifier_ranges(source, mode)
            .into_iter()
            .any(|range| is_library_specifier(&source[range]))
    };

    match FileKind::detect(content, file_path) {
        FileKind::Svelte => {
            SVELTE_SCRIPT
                .captures_iter(content)
                .filter_map(|caps| caps.get(1))
                .any(|m| is_greater(m.as_str(), ScanMode::Script))
                || SVELTE_STYLE
                    .captures_iter(content)
                    .filter_map(|caps| caps.get(1))
                    .any(|m| is_greater(m.as_str(), ScanMode::Css))
        }
        FileKind::Css => is_greater(content, ScanMode::Css),
        FileKind::Script => is_greater(content, ScanMode::Script),
    }
}

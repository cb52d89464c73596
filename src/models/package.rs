// src/models/package.rs

//! The persisted package document and its projections.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).unwrap()
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

/// A top-level declaration extracted from a source file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decl {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub doc: String,
}

impl Decl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            doc: String::new(),
        }
    }
}

/// An example function extracted from a test file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub doc: String,
}

/// A source file reference carried by a package document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub browse_url: String,
}

/// The extracted record for one import path.
///
/// Created on the first successful fetch, mutated only through
/// [`crate::store::Store::put`], destroyed by delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDoc {
    /// Canonical import path; the globally unique key.
    pub import_path: String,

    /// Import-path prefix for all packages in the project. Empty for the
    /// standard library.
    #[serde(default)]
    pub project_root: String,

    #[serde(default)]
    pub project_name: String,

    #[serde(default)]
    pub project_url: String,

    /// Package identifier. Empty means "directory only, no code".
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "is_false")]
    pub is_command: bool,

    #[serde(default)]
    pub synopsis: String,

    #[serde(default)]
    pub doc: String,

    #[serde(default)]
    pub imports: Vec<String>,

    #[serde(default)]
    pub test_imports: Vec<String>,

    #[serde(default)]
    pub files: Vec<SourceFile>,

    #[serde(default)]
    pub consts: Vec<Decl>,

    #[serde(default)]
    pub vars: Vec<Decl>,

    #[serde(default)]
    pub funcs: Vec<Decl>,

    #[serde(default)]
    pub types: Vec<Decl>,

    #[serde(default)]
    pub examples: Vec<Example>,

    /// Extraction problems. Non-empty means the record is degraded.
    #[serde(default)]
    pub errors: Vec<String>,

    /// True when oversized inputs were dropped during extraction.
    #[serde(default, skip_serializing_if = "is_false")]
    pub truncated: bool,

    /// Import-path-like strings recognized in README files.
    #[serde(default)]
    pub references: Vec<String>,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub stars: u32,

    #[serde(default, skip_serializing_if = "is_false")]
    pub fork: bool,

    /// Wall clock of the last successful fetch.
    #[serde(default = "epoch")]
    pub updated: DateTime<Utc>,

    /// Opaque cache-validation token from the fetcher. Stable iff the source
    /// is unchanged.
    #[serde(default)]
    pub etag: String,

    #[serde(default)]
    pub vcs: String,

    #[serde(default)]
    pub browse_url: String,

    /// Format specifier for source-line links, e.g. `%s#L%d`.
    #[serde(default)]
    pub line_fmt: String,
}

impl Default for PackageDoc {
    fn default() -> Self {
        Self {
            import_path: String::new(),
            project_root: String::new(),
            project_name: String::new(),
            project_url: String::new(),
            name: String::new(),
            is_command: false,
            synopsis: String::new(),
            doc: String::new(),
            imports: Vec::new(),
            test_imports: Vec::new(),
            files: Vec::new(),
            consts: Vec::new(),
            vars: Vec::new(),
            funcs: Vec::new(),
            types: Vec::new(),
            examples: Vec::new(),
            errors: Vec::new(),
            truncated: false,
            references: Vec::new(),
            stars: 0,
            fork: false,
            updated: epoch(),
            etag: String::new(),
            vcs: String::new(),
            browse_url: String::new(),
            line_fmt: String::new(),
        }
    }
}

impl PackageDoc {
    /// Last segment of the import path.
    pub fn base_name(&self) -> &str {
        self.import_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.import_path)
    }
}

/// Lightweight projection used by listings and query results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub path: String,
    #[serde(default)]
    pub synopsis: String,
    #[serde(default)]
    pub import_count: u64,
    #[serde(default)]
    pub stars: u32,
    #[serde(default)]
    pub fork: bool,
}

impl Package {
    pub fn new(path: impl Into<String>, synopsis: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            synopsis: synopsis.into(),
            ..Self::default()
        }
    }
}

/// Classification of an incoming resolve request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Human,
    Robot,
    Query,
    Refresh,
}

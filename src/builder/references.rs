// src/builder/references.rs

//! Extraction of import-path references from README files.
//!
//! Recognizes a fixed allowlist of shapes: documentation-site URLs,
//! `go get` commands, and quoted import paths. Anything else in a README is
//! noise.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use super::path::is_valid_remote_path;

fn doc_site_pat() -> &'static Regex {
    static PAT: OnceLock<Regex> = OnceLock::new();
    PAT.get_or_init(|| {
        Regex::new(
            r"https?://(?:gopkgdoc\.appspot\.com/pkg/|go\.pkgdoc\.org/|godoc\.org/|pkg\.go\.dev/)([-a-zA-Z0-9~+_./]+)",
        )
        .expect("valid regex")
    })
}

fn go_get_pat() -> &'static Regex {
    static PAT: OnceLock<Regex> = OnceLock::new();
    PAT.get_or_init(|| Regex::new(r"\bgo\s+get\s+([-a-zA-Z0-9~+_./]+)").expect("valid regex"))
}

fn quoted_pat() -> &'static Regex {
    static PAT: OnceLock<Regex> = OnceLock::new();
    PAT.get_or_init(|| Regex::new(r#""([-a-zA-Z0-9~+_./]+)""#).expect("valid regex"))
}

/// Add every recognizable import path in `content` to `references`.
pub fn add_references(references: &mut BTreeSet<String>, content: &str) {
    for pat in [doc_site_pat(), go_get_pat(), quoted_pat()] {
        for captures in pat.captures_iter(content) {
            let path = captures[1].trim_matches('/');
            if is_valid_remote_path(path) {
                references.insert(path.to_string());
            }
        }
    }
}

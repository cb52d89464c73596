// src/builder/path.rs

//! Import path classification.
//!
//! A valid remote path is `host/elem/...` where the host has at least two
//! dot-separated labels and no element starts with `.` or `_` or equals
//! `testdata`. A standard-library path is one whose first segment contains
//! no dot.

use std::sync::OnceLock;

use regex::Regex;

fn valid_host() -> &'static Regex {
    static PAT: OnceLock<Regex> = OnceLock::new();
    PAT.get_or_init(|| Regex::new(r"^[-a-z0-9]+(?:\.[-a-z0-9]+)+(?::[0-9]+)?$").expect("valid regex"))
}

fn valid_element() -> &'static Regex {
    static PAT: OnceLock<Regex> = OnceLock::new();
    PAT.get_or_init(|| Regex::new(r"^[-A-Za-z0-9~+][-A-Za-z0-9_.]*$").expect("valid regex"))
}

fn version_element() -> &'static Regex {
    static PAT: OnceLock<Regex> = OnceLock::new();
    PAT.get_or_init(|| Regex::new(r"^v[0-9]+$").expect("valid regex"))
}

fn version_suffix() -> &'static Regex {
    static PAT: OnceLock<Regex> = OnceLock::new();
    PAT.get_or_init(|| Regex::new(r"\.v[0-9]+$").expect("valid regex"))
}

/// True if `s` can appear as a path element below the host.
pub fn is_valid_path_element(s: &str) -> bool {
    valid_element().is_match(s) && s != "testdata"
}

/// True if `path` is a valid remote import path.
pub fn is_valid_remote_path(path: &str) -> bool {
    let mut parts = path.split('/');
    let Some(host) = parts.next() else {
        return false;
    };
    if !valid_host().is_match(host) {
        return false;
    }
    let mut rest = 0;
    for part in parts {
        if !is_valid_path_element(part) {
            return false;
        }
        rest += 1;
    }
    rest > 0
}

/// True if `path` names a standard-library package: every element valid and
/// the first segment free of dots.
pub fn is_standard_path(path: &str) -> bool {
    let mut parts = path.split('/').peekable();
    let Some(first) = parts.peek() else {
        return false;
    };
    if first.is_empty() || first.contains('.') {
        return false;
    }
    parts.all(is_valid_path_element)
}

/// True if `path` is importable at all: standard library or valid remote.
pub fn is_valid_path(path: &str) -> bool {
    is_standard_path(path) || is_valid_remote_path(path)
}

const EXCLUDED_ELEMENTS: &[&str] = &["testdata", "internal", "third_party"];

/// True if any path segment marks the package as unexported corpus
/// (`testdata`, `internal`, `third_party`).
pub fn is_excluded(path: &str) -> bool {
    path.split('/').any(|seg| EXCLUDED_ELEMENTS.contains(&seg))
}

/// Guess the display name of the package at `import_path`, stripping the
/// decorations hosting conventions add around the real name.
pub fn display_name(import_path: &str) -> String {
    let segments: Vec<&str> = import_path.split('/').filter(|s| !s.is_empty()).collect();
    let Some(&last) = segments.last() else {
        return String::new();
    };

    // gopkg-style version elements point back at the previous segment.
    let mut base = last;
    if version_element().is_match(base) && segments.len() >= 2 {
        base = segments[segments.len() - 2];
    }

    let mut name = base.to_string();
    for suffix in [".git", ".hg", ".bzr", ".svn"] {
        if let Some(stripped) = name.strip_suffix(suffix) {
            name = stripped.to_string();
            break;
        }
    }
    if let Some(m) = version_suffix().find(&name) {
        name.truncate(m.start());
    }
    if let Some(stripped) = name.strip_suffix(".go") {
        name = stripped.to_string();
    }
    if let Some(stripped) = name.strip_suffix("-go") {
        name = stripped.to_string();
    }
    if let Some(stripped) = name.strip_prefix("go-") {
        name = stripped.to_string();
    }
    if let Some(i) = name.rfind('.') {
        name = name[i + 1..].to_string();
    }
    name
}

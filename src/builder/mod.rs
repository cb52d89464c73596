// src/builder/mod.rs

//! Doc builder: turns a fetched [`Directory`] into a [`PackageDoc`].

pub mod path;
pub mod references;
pub mod source;

use std::collections::BTreeSet;
use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;

use crate::error::{Error, Result};
use crate::models::{Directory, PackageDoc, SourceFile};

/// Files larger than this are dropped and the document marked truncated.
const MAX_FILE_BYTES: usize = 512 * 1024;

fn readme_pat() -> &'static Regex {
    static PAT: OnceLock<Regex> = OnceLock::new();
    PAT.get_or_init(|| Regex::new(r"^(?i:readme)(?:$|\.)").expect("valid regex"))
}

/// True if a file with name `n` belongs in the documentation set: a README,
/// or a Go file not hidden by a leading `_` or `.`.
pub fn is_doc_file(n: &str) -> bool {
    if n.ends_with(".go") && !n.starts_with('_') && !n.starts_with('.') {
        return true;
    }
    readme_pat().is_match(n)
}

/// Leading sentences that are build tags, license banners, or editor
/// directives rather than documentation.
const BAD_SYNOPSIS_PREFIXES: &[&str] = &["+build", "COPYRIGHT", "### ", "-*- ", "vim:"];

/// Derive a one-line synopsis from a package doc comment: the first
/// sentence, whitespace collapsed, or empty when the leading text is not
/// prose.
pub fn synopsis(doc: &str) -> String {
    let trimmed = doc.trim_start();
    for prefix in BAD_SYNOPSIS_PREFIXES {
        if trimmed.starts_with(prefix) {
            return String::new();
        }
    }

    // First paragraph, then first sentence within it.
    let paragraph = trimmed.split("\n\n").next().unwrap_or("");
    let mut end = paragraph.len();
    let bytes = paragraph.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'.' && bytes.get(i + 1).is_none_or(|c| c.is_ascii_whitespace()) {
            end = i + 1;
            break;
        }
    }
    paragraph[..end]
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build a package document from a directory listing.
///
/// A directory with no Go files still yields a document when subdirectories
/// exist (a "directory only" record with an empty name); with neither it is
/// NotFound. A canonical import comment that disagrees with the requested
/// path yields NotFound with a redirect.
pub fn build_doc(dir: &Directory) -> Result<PackageDoc> {
    if dir.files.is_empty() && dir.subdirectories.is_empty() {
        return Err(Error::not_found("No Go files or subdirectories."));
    }

    let mut pdoc = PackageDoc {
        import_path: dir.import_path.clone(),
        project_root: dir.project_root.clone(),
        project_name: dir.project_name.clone(),
        project_url: dir.project_url.clone(),
        updated: Utc::now(),
        etag: dir.etag.clone(),
        vcs: dir.vcs.clone(),
        browse_url: dir.browse_url.clone(),
        line_fmt: dir.line_fmt.clone(),
        stars: dir.stars,
        fork: dir.fork,
        ..PackageDoc::default()
    };

    let mut files: Vec<_> = dir.files.iter().collect();
    files.sort_by(|a, b| a.name.cmp(&b.name));

    let mut references = BTreeSet::new();
    let mut scans = Vec::new();
    let mut test_scans = Vec::new();

    for file in files {
        if file.data.len() > MAX_FILE_BYTES {
            pdoc.truncated = true;
            continue;
        }
        pdoc.files.push(SourceFile {
            name: file.name.clone(),
            browse_url: file.browse_url.clone(),
        });
        if readme_pat().is_match(&file.name) {
            references::add_references(&mut references, &String::from_utf8_lossy(&file.data));
            continue;
        }
        if !file.name.ends_with(".go") {
            continue;
        }
        match source::scan(&file.data) {
            Ok(scanned) => {
                if file.name.ends_with("_test.go") {
                    test_scans.push(scanned);
                } else {
                    scans.push(scanned);
                }
            }
            Err(message) => pdoc.errors.push(format!("{}: {message}", file.name)),
        }
    }

    // Pick the package among the non-test files. "documentation" is the
    // conventional name for doc-only files accompanying another package.
    let mut names: Vec<&str> = scans
        .iter()
        .map(|s| s.package_name.as_str())
        .filter(|n| *n != "documentation")
        .collect();
    names.sort();
    names.dedup();
    if names.len() > 1 {
        pdoc.errors
            .push(format!("multiple packages in directory: {}", names.join(", ")));
    }
    let package_name = names.first().copied().unwrap_or_default().to_string();

    let mut imports = BTreeSet::new();
    for scanned in scans.iter().filter(|s| s.package_name == package_name) {
        if pdoc.doc.is_empty() && !scanned.doc.is_empty() {
            pdoc.doc = scanned.doc.clone();
        }
        if let Some(canonical) = &scanned.canonical_import {
            if *canonical != dir.import_path {
                return Err(Error::redirect(
                    format!(
                        "import path {} does not match canonical {canonical}",
                        dir.import_path
                    ),
                    canonical.clone(),
                ));
            }
        }
        imports.extend(scanned.imports.iter().cloned());
        pdoc.consts.extend(scanned.consts.iter().cloned());
        pdoc.vars.extend(scanned.vars.iter().cloned());
        pdoc.funcs.extend(scanned.funcs.iter().cloned());
        pdoc.types.extend(scanned.types.iter().cloned());
    }

    let mut test_imports = BTreeSet::new();
    for scanned in &test_scans {
        test_imports.extend(scanned.imports.iter().cloned());
        pdoc.examples.extend(scanned.examples.iter().cloned());
    }

    pdoc.name = package_name;
    pdoc.is_command = pdoc.name == "main";
    pdoc.imports = imports.into_iter().collect();
    pdoc.test_imports = test_imports.into_iter().collect();
    pdoc.synopsis = synopsis(&pdoc.doc);
    pdoc.references = references.into_iter().collect();

    // Hosts without cache validation get a content hash, so refreshes can
    // still detect an unchanged directory.
    if pdoc.etag.is_empty() {
        pdoc.etag = crate::utils::http::content_etag(dir.files.iter().map(|f| f.data.as_slice()));
    }

    Ok(pdoc)
}

// src/builder/source.rs

//! Line-level scanner for Go source files.
//!
//! Extracts the facts the package document needs: the package clause and its
//! doc comment, a canonical import comment, imports, exported top-level
//! declarations, and example functions. Anything deeper than declarations is
//! out of scope for an API index.

use std::sync::OnceLock;

use regex::Regex;

use crate::models::{Decl, Example};

/// Facts extracted from one source file.
#[derive(Debug, Default)]
pub struct ScannedFile {
    pub package_name: String,
    /// Canonical path from a `package x // import "..."` comment.
    pub canonical_import: Option<String>,
    /// Package doc comment, when this file carries one.
    pub doc: String,
    pub imports: Vec<String>,
    pub consts: Vec<Decl>,
    pub vars: Vec<Decl>,
    pub funcs: Vec<Decl>,
    pub types: Vec<Decl>,
    pub examples: Vec<Example>,
}

fn package_clause() -> &'static Regex {
    static PAT: OnceLock<Regex> = OnceLock::new();
    PAT.get_or_init(|| {
        Regex::new(r#"^package\s+([A-Za-z_][A-Za-z0-9_]*)(?:\s*//\s*import\s+"([^"]+)")?"#)
            .expect("valid regex")
    })
}

fn func_decl() -> &'static Regex {
    static PAT: OnceLock<Regex> = OnceLock::new();
    PAT.get_or_init(|| {
        Regex::new(r"^func\s+(?:\([^)]*\)\s*)?([A-Za-z_][A-Za-z0-9_]*)\s*[(\[]")
            .expect("valid regex")
    })
}

fn type_decl() -> &'static Regex {
    static PAT: OnceLock<Regex> = OnceLock::new();
    PAT.get_or_init(|| Regex::new(r"^type\s+([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex"))
}

fn value_decl() -> &'static Regex {
    static PAT: OnceLock<Regex> = OnceLock::new();
    PAT.get_or_init(|| {
        Regex::new(r"^(const|var)\s+([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex")
    })
}

fn ident() -> &'static Regex {
    static PAT: OnceLock<Regex> = OnceLock::new();
    PAT.get_or_init(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex"))
}

fn quoted_import() -> &'static Regex {
    static PAT: OnceLock<Regex> = OnceLock::new();
    PAT.get_or_init(|| Regex::new(r#""([^"]+)""#).expect("valid regex"))
}

fn exported(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

fn is_directive(line: &str) -> bool {
    line.starts_with("+build") || line.starts_with("go:") || line.starts_with("line ")
}

#[derive(PartialEq)]
enum Section {
    Code,
    ImportBlock,
    ConstBlock,
    VarBlock,
    TypeBlock,
}

/// Scan one Go source file. Returns a message instead of a file when the
/// scanner cannot find a package clause.
pub fn scan(data: &[u8]) -> Result<ScannedFile, String> {
    let text = String::from_utf8_lossy(data);
    let mut out = ScannedFile::default();

    let mut pending_doc: Vec<String> = Vec::new();
    let mut in_block_comment = false;
    let mut seen_package = false;
    let mut section = Section::Code;

    for raw in text.lines() {
        let line = raw.trim_end();

        if in_block_comment {
            // Code sharing a line with a comment close is rare enough to
            // treat the whole line as comment.
            if line.contains("*/") {
                in_block_comment = false;
            } else {
                pending_doc.push(line.trim_start_matches(['*', ' ', '\t']).to_string());
            }
            continue;
        }

        if let Some(comment) = line.strip_prefix("//") {
            let comment = comment.strip_prefix(' ').unwrap_or(comment);
            if !is_directive(comment) {
                pending_doc.push(comment.to_string());
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("/*") {
            if let Some(end) = rest.find("*/") {
                pending_doc.push(rest[..end].trim().to_string());
            } else {
                in_block_comment = true;
                pending_doc.push(rest.trim().to_string());
            }
            continue;
        }

        if line.is_empty() {
            pending_doc.clear();
            continue;
        }

        // Multi-line grouped declarations.
        match section {
            Section::ImportBlock => {
                if line.starts_with(')') {
                    section = Section::Code;
                } else if let Some(c) = quoted_import().captures(line) {
                    out.imports.push(c[1].to_string());
                }
                continue;
            }
            Section::ConstBlock | Section::VarBlock | Section::TypeBlock => {
                if line.starts_with(')') {
                    section = Section::Code;
                    continue;
                }
                if let Some(c) = ident().captures(line.trim_start()) {
                    let name = c[1].to_string();
                    if exported(&name) {
                        let decl = Decl::new(name);
                        match section {
                            Section::ConstBlock => push_unique(&mut out.consts, decl),
                            Section::VarBlock => push_unique(&mut out.vars, decl),
                            Section::TypeBlock => push_unique(&mut out.types, decl),
                            _ => unreachable!(),
                        }
                    }
                }
                continue;
            }
            Section::Code => {}
        }

        if !seen_package {
            if let Some(c) = package_clause().captures(line) {
                out.package_name = c[1].to_string();
                out.canonical_import = c.get(2).map(|m| m.as_str().to_string());
                out.doc = drain_doc(&mut pending_doc);
                seen_package = true;
                continue;
            }
            pending_doc.clear();
            continue;
        }

        // Only unindented lines open top-level declarations.
        if raw.starts_with(char::is_whitespace) {
            continue;
        }

        if line == "import (" || line.starts_with("import (") {
            section = Section::ImportBlock;
        } else if line.starts_with("import") {
            if let Some(c) = quoted_import().captures(line) {
                out.imports.push(c[1].to_string());
            }
        } else if line.starts_with("const (") {
            section = Section::ConstBlock;
        } else if line.starts_with("var (") {
            section = Section::VarBlock;
        } else if line.starts_with("type (") {
            section = Section::TypeBlock;
        } else if let Some(c) = func_decl().captures(line) {
            let name = c[1].to_string();
            let doc = drain_doc(&mut pending_doc);
            if let Some(example) = name.strip_prefix("Example") {
                out.examples.push(Example {
                    name: example.trim_start_matches('_').to_string(),
                    doc,
                });
            } else if exported(&name) {
                push_unique(&mut out.funcs, Decl { name, doc });
            }
        } else if let Some(c) = type_decl().captures(line) {
            let name = c[1].to_string();
            if exported(&name) {
                let doc = drain_doc(&mut pending_doc);
                push_unique(&mut out.types, Decl { name, doc });
            }
        } else if let Some(c) = value_decl().captures(line) {
            let kind = c[1].to_string();
            let name = c[2].to_string();
            if exported(&name) {
                let decl = Decl::new(name);
                if kind == "const" {
                    push_unique(&mut out.consts, decl);
                } else {
                    push_unique(&mut out.vars, decl);
                }
            }
        }
        pending_doc.clear();
    }

    if !seen_package {
        return Err("expected package clause".to_string());
    }

    out.imports.sort();
    out.imports.dedup();
    Ok(out)
}

fn drain_doc(pending: &mut Vec<String>) -> String {
    let doc = pending.join("\n").trim().to_string();
    pending.clear();
    doc
}

fn push_unique(decls: &mut Vec<Decl>, decl: Decl) {
    if !decls.iter().any(|d| d.name == decl.name) {
        decls.push(decl);
    }
}

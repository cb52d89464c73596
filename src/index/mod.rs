// src/index/mod.rs

//! Index term derivation and document scoring.
//!
//! Terms are namespaced (`project:`, `import:`, `all:`) or stemmed text
//! tokens drawn from the project name, package name, and synopsis. The
//! document score gates indexing (zero means "do not index") and breaks
//! ranking ties.

pub mod stem;
pub mod stop;

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use crate::builder::path::{is_excluded, is_valid_path, is_standard_path};
use crate::models::PackageDoc;

pub use stem::stem;
pub use stop::is_stop_word;

/// Fixed synonym map, applied before stemming so that both sides of a
/// synonym land on the same index entry.
const SYNONYMS: &[(&str, &str)] = &[
    ("redis", "redisdb"), // "redis" alone stems to "redi"
    ("rand", "random"),
];

fn synonym(token: &str) -> &str {
    SYNONYMS
        .iter()
        .find(|(from, _)| *from == token)
        .map(|(_, to)| *to)
        .unwrap_or(token)
}

fn http_pat() -> &'static Regex {
    static PAT: OnceLock<Regex> = OnceLock::new();
    PAT.get_or_init(|| Regex::new(r"https?://\S+").expect("valid regex"))
}

/// Normalize a raw token into an index term: synonym substitution followed
/// by stemming. Returns None for stop words.
fn normalize(token: &str) -> Option<String> {
    if stop::is_stop_word(token) {
        return None;
    }
    Some(stem::stem(synonym(token)))
}

/// Split free text into lowercase word tokens.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .unicode_words()
        .map(str::to_string)
        .collect()
}

/// Parse free text into normalized index terms.
pub fn parse_query(q: &str) -> Vec<String> {
    tokenize(q).iter().filter_map(|t| normalize(t)).collect()
}

/// Project root normalized for the `project:` namespace; the standard
/// library indexes under `project:go`.
pub fn normalize_project_root(project_root: &str) -> &str {
    if project_root.is_empty() {
        "go"
    } else {
        project_root
    }
}

/// Derive the deduplicated set of index terms for a document with the given
/// score. `project:` and `import:` terms are emitted regardless of score so
/// the importer graph stays queryable; text terms and the corpus-wide `all:`
/// marker require a positive score.
pub fn document_terms(pdoc: &PackageDoc, score: f64) -> Vec<String> {
    let mut terms = BTreeSet::new();

    terms.insert(format!(
        "project:{}",
        normalize_project_root(&pdoc.project_root)
    ));

    for path in &pdoc.imports {
        if is_valid_path(path) {
            terms.insert(format!("import:{path}"));
        }
    }

    if score > 0.0 {
        if is_standard_path(&pdoc.import_path) {
            for term in parse_query(&pdoc.import_path) {
                terms.insert(term);
            }
        } else {
            terms.insert("all:".to_string());
            for term in parse_query(&pdoc.project_name) {
                terms.insert(term);
            }
            for term in parse_query(&pdoc.name) {
                terms.insert(term);
            }
        }

        // Synopsis, with URLs stripped. A leading "package" token within the
        // first four words is boilerplate, not a term.
        let synopsis = http_pat().replace_all(&pdoc.synopsis, "");
        for (i, token) in synopsis.to_lowercase().unicode_words().enumerate() {
            if stop::is_stop_word(token) || (i <= 3 && token == "package") {
                continue;
            }
            terms.insert(stem::stem(synonym(token)));
        }
    }

    terms.into_iter().collect()
}

/// Real-valued document score. Zero means the document must not be indexed
/// for text search.
pub fn document_score(pdoc: &PackageDoc) -> f64 {
    if pdoc.name.is_empty()
        || pdoc.is_command
        || !pdoc.errors.is_empty()
        || pdoc.import_path.ends_with(".go")
        || is_excluded(&pdoc.import_path)
    {
        return 0.0;
    }

    if pdoc.imports.iter().any(|p| p.ends_with(".go")) {
        return 0.0;
    }

    if !pdoc.truncated
        && pdoc.consts.is_empty()
        && pdoc.vars.is_empty()
        && pdoc.funcs.is_empty()
        && pdoc.types.is_empty()
        && pdoc.examples.is_empty()
    {
        return 0.0;
    }

    let mut r = 1.0;

    if pdoc.doc.is_empty() && pdoc.synopsis.is_empty() {
        r *= 0.95;
    }
    if pdoc.base_name() != pdoc.name {
        r *= 0.9;
    }

    let below_root = pdoc
        .import_path
        .strip_prefix(&pdoc.project_root)
        .unwrap_or("");
    for _ in 0..below_root.matches('/').count() {
        r *= 0.99;
    }
    if below_root.find("/src/").is_some_and(|i| i > 0) {
        r *= 0.95;
    }

    r
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Decl;

    fn strconv_doc() -> PackageDoc {
        PackageDoc {
            import_path: "strconv".to_string(),
            project_root: String::new(),
            project_name: "Go".to_string(),
            name: "strconv".to_string(),
            synopsis: "Package strconv implements conversions to and from string \
                       representations of basic data types."
                .to_string(),
            doc: "Package strconv implements conversions to and from string representations\n\
                  of basic data types."
                .to_string(),
            imports: vec![
                "errors".to_string(),
                "math".to_string(),
                "unicode/utf8".to_string(),
            ],
            funcs: vec![Decl::new("Atoi")],
            ..PackageDoc::default()
        }
    }

    fn oauth_doc() -> PackageDoc {
        PackageDoc {
            import_path: "github.com/user/repo/dir".to_string(),
            project_root: "github.com/user/repo".to_string(),
            project_name: "go-oauth".to_string(),
            project_url: "https://github.com/user/repo/".to_string(),
            name: "dir".to_string(),
            synopsis: "Package dir implements a subset of the OAuth client interface \
                       as defined in RFC 5849."
                .to_string(),
            doc: "Package oauth implements a subset of the OAuth client interface as \
                  defined in RFC 5849."
                .to_string(),
            imports: vec![
                "bytes".to_string(),
                "errors".to_string(),
                "net/http".to_string(),
            ],
            test_imports: vec!["testing".to_string()],
            funcs: vec![Decl::new("NewClient")],
            ..PackageDoc::default()
        }
    }

    #[test]
    fn test_standard_package_terms() {
        let pdoc = strconv_doc();
        let score = document_score(&pdoc);
        assert!(score > 0.0);
        let terms = document_terms(&pdoc, score);
        assert_eq!(
            terms,
            vec![
                "bas",
                "convert",
                "dat",
                "import:errors",
                "import:math",
                "import:unicode/utf8",
                "project:go",
                "repres",
                "strconv",
                "string",
                "typ",
            ]
        );
    }

    #[test]
    fn test_remote_package_terms() {
        let pdoc = oauth_doc();
        let score = document_score(&pdoc);
        assert!(score > 0.0);
        let terms = document_terms(&pdoc, score);
        assert_eq!(
            terms,
            vec![
                "5849",
                "all:",
                "cly",
                "defin",
                "dir",
                "go",
                "import:bytes",
                "import:errors",
                "import:net/http",
                "interfac",
                "oau",
                "project:github.com/user/repo",
                "rfc",
                "subset",
            ]
        );
    }

    #[test]
    fn test_zero_score_restricts_namespaces() {
        let mut pdoc = strconv_doc();
        pdoc.errors.push("build failed".to_string());
        let score = document_score(&pdoc);
        assert_eq!(score, 0.0);
        for term in document_terms(&pdoc, score) {
            assert!(
                term.starts_with("project:") || term.starts_with("import:"),
                "unexpected term {term}"
            );
        }
    }

    #[test]
    fn test_score_gates() {
        let base = oauth_doc();

        let mut cmd = base.clone();
        cmd.is_command = true;
        assert_eq!(document_score(&cmd), 0.0);

        let mut unnamed = base.clone();
        unnamed.name.clear();
        assert_eq!(document_score(&unnamed), 0.0);

        let mut empty = base.clone();
        empty.funcs.clear();
        assert_eq!(document_score(&empty), 0.0);

        let mut internal = base.clone();
        internal.import_path = "github.com/user/repo/internal/dir".to_string();
        assert_eq!(document_score(&internal), 0.0);

        let mut go_import = base.clone();
        go_import.imports.push("github.com/user/repo/x.go".to_string());
        assert_eq!(document_score(&go_import), 0.0);
    }

    #[test]
    fn test_score_multipliers() {
        let base = oauth_doc();
        let below_root = document_score(&base);
        assert!((below_root - 0.99).abs() < 1e-9);

        let mut renamed = base.clone();
        renamed.name = "oauth".to_string();
        let renamed_score = document_score(&renamed);
        assert!((renamed_score - 0.99 * 0.9).abs() < 1e-9);

        let mut bare = base.clone();
        bare.doc.clear();
        bare.synopsis.clear();
        let bare_score = document_score(&bare);
        assert!((bare_score - 0.99 * 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_term_normalization_stable() {
        // Normalizing an already-normalized term is a fixed point, and
        // synonyms apply before stemming.
        for word in [
            "string", "convert", "random", "redisdb", "go", "strconv", "dir", "subset",
        ] {
            let first = normalize(word).unwrap();
            let second = normalize(&first).unwrap();
            assert_eq!(first, second, "normalize({word:?}) not stable");
        }
        assert_eq!(normalize("redis").unwrap(), "redisdb");
        assert_eq!(normalize("rand").unwrap(), "random");
        assert_eq!(normalize("the"), None);
    }

    #[test]
    fn test_parse_query_matches_document_terms() {
        let pdoc = strconv_doc();
        let terms = document_terms(&pdoc, document_score(&pdoc));
        for q in ["string conversions", "Basic Data Types"] {
            for term in parse_query(q) {
                assert!(terms.contains(&term), "query term {term} missing");
            }
        }
    }
}

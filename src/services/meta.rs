// src/services/meta.rs

//! Dynamic host resolution through `go-import` meta tags.
//!
//! `GET https://<path>?go-get=1` (falling back to http) yields an HTML page
//! whose `<meta name="go-import" content="root vcs repo-url">` tag names the
//! repository for the import path. Exactly one tag may match, on a path
//! segment boundary.

use scraper::{Html, Selector};

use crate::error::{Error, Result};
use crate::utils::HttpClient;

/// The resolved go-import record for one import path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaImport {
    /// Import-path prefix covering the whole repository.
    pub project_root: String,
    pub project_name: String,
    pub project_url: String,
    /// Repository location with the scheme stripped, e.g.
    /// `github.com/user/repo`.
    pub repo: String,
    pub vcs: String,
    /// Scheme of the repository URL (`https`, `git`, ...).
    pub scheme: String,
    /// Path below the project root, with leading slash, possibly empty.
    pub dir: String,
}

/// Parse a go-get discovery page. `scheme` is the scheme the page was
/// fetched over, used to build the project URL.
pub fn parse_meta(scheme: &str, import_path: &str, body: &str) -> Result<MetaImport> {
    let document = Html::parse_document(body);
    let selector = Selector::parse("meta").expect("valid selector");

    let mut found: Option<MetaImport> = None;
    for element in document.select(&selector) {
        let name = element.value().attr("name").unwrap_or("");
        if !name.eq_ignore_ascii_case("go-import") {
            continue;
        }
        let content = element.value().attr("content").unwrap_or("");
        let fields: Vec<&str> = content.split_whitespace().collect();
        let [project_root, vcs, repo_url] = fields[..] else {
            continue;
        };

        // The declared root must prefix the import path on a segment
        // boundary.
        if !import_path.starts_with(project_root)
            || !(import_path.len() == project_root.len()
                || import_path.as_bytes()[project_root.len()] == b'/')
        {
            continue;
        }
        if found.is_some() {
            return Err(Error::not_found(format!(
                "More than one <meta> found at {scheme}://{import_path}"
            )));
        }

        let repo_url = repo_url
            .strip_suffix(&format!(".{vcs}"))
            .unwrap_or(repo_url);
        let Some((repo_scheme, repo)) = repo_url.split_once("://") else {
            return Err(Error::not_found("Bad repo URL in <meta>."));
        };

        found = Some(MetaImport {
            project_root: project_root.to_string(),
            project_name: project_root
                .rsplit('/')
                .next()
                .unwrap_or(project_root)
                .to_string(),
            project_url: format!("{scheme}://{project_root}"),
            repo: repo.to_string(),
            vcs: vcs.to_string(),
            scheme: repo_scheme.to_string(),
            dir: import_path[project_root.len()..].to_string(),
        });
    }

    found.ok_or_else(|| Error::not_found("<meta> not found."))
}

/// Fetch and parse the go-get discovery page for `import_path`.
pub async fn fetch_meta(client: &HttpClient, import_path: &str) -> Result<MetaImport> {
    let mut uri = import_path.to_string();
    if !uri.contains('/') {
        // Add a slash for the root of a domain.
        uri.push('/');
    }
    uri.push_str("?go-get=1");

    let mut scheme = "https";
    let body = match client.get_response(&format!("https://{uri}")).await {
        Ok(resp) if resp.status().as_u16() == 200 => resp.text().await.map_err(|e| {
            Error::remote(host_of(import_path), e)
        })?,
        _ => {
            scheme = "http";
            let resp = client.get_response(&format!("http://{uri}")).await?;
            resp.text()
                .await
                .map_err(|e| Error::remote(host_of(import_path), e))?
        }
    };

    parse_meta(scheme, import_path, &body)
}

fn host_of(import_path: &str) -> &str {
    import_path.split('/').next().unwrap_or(import_path)
}

// src/services/github.rs

//! GitHub API client: repository directories, gists, the Go repository
//! mirror for the standard library, and the recently-pushed poll.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use super::{best_tag, MatchMap};
use crate::builder::path::is_valid_path_element;
use crate::builder::is_doc_file;
use crate::config::GitHubConfig;
use crate::error::{Error, Result};
use crate::models::{Directory, RemoteFile};
use crate::utils::{expand, HttpClient};

const RAW_ACCEPT: &str = "application/vnd.github-blob.raw";

/// A fork younger than this at its last push has no history of its own.
const QUICK_FORK_WINDOW: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Deserialize)]
struct Repo {
    #[serde(default)]
    default_branch: Option<String>,
    #[serde(default)]
    fork: bool,
    #[serde(default)]
    stargazers_count: u32,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pushed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct Ref {
    #[serde(rename = "ref")]
    name: String,
    object: RefObject,
}

#[derive(Debug, Deserialize)]
struct RefObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(rename = "type")]
    kind: String,
    name: String,
    #[serde(default)]
    git_url: String,
    #[serde(default)]
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct Gist {
    #[serde(default)]
    files: std::collections::BTreeMap<String, GistFile>,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    history: Vec<GistVersion>,
}

#[derive(Debug, Deserialize)]
struct GistFile {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct GistVersion {
    version: String,
}

/// One entry from the recently-pushed poll.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoUpdate {
    pub full_name: String,
    pub pushed_at: String,
    #[serde(default)]
    pub fork: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(default)]
    items: Vec<RepoUpdate>,
}

/// GitHub-backed fetcher. Base URLs are configurable so tests can point at
/// a mock server.
#[derive(Debug, Clone)]
pub struct GitHubHost {
    api_base: String,
    web_base: String,
    client_id: Option<String>,
    client_secret: Option<String>,
}

impl Default for GitHubHost {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            web_base: "https://github.com".to_string(),
            client_id: None,
            client_secret: None,
        }
    }
}

impl GitHubHost {
    pub fn from_config(config: &GitHubConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            ..Self::default()
        }
    }

    pub fn with_bases(api_base: impl Into<String>, web_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            web_base: web_base.into(),
            ..Self::default()
        }
    }

    /// API URL with credentials appended when configured.
    fn api_url(&self, path_and_query: &str) -> String {
        let mut url = format!("{}{}", self.api_base, path_and_query);
        if let (Some(id), Some(secret)) = (&self.client_id, &self.client_secret) {
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&format!("client_id={id}&client_secret={secret}"));
        }
        url
    }

    async fn refs(&self, client: &HttpClient, owner: &str, repo: &str) -> Result<Vec<Ref>> {
        client
            .get_json(&self.api_url(&format!("/repos/{owner}/{repo}/git/refs")))
            .await
    }

    /// Fetch one repository directory.
    pub async fn fetch(
        &self,
        client: &HttpClient,
        m: &MatchMap,
        saved_etag: &str,
    ) -> Result<Directory> {
        let owner = &m["owner"];
        let repo = &m["repo"];
        let dir = m.get("dir").map(String::as_str).unwrap_or("");

        let repo_meta: Repo = client
            .get_json(&self.api_url(&format!("/repos/{owner}/{repo}")))
            .await?;

        if repo_meta.fork {
            if let (Some(created), Some(pushed)) = (repo_meta.created_at, repo_meta.pushed_at) {
                if pushed - created < Duration::seconds(QUICK_FORK_WINDOW) {
                    return Err(Error::QuickFork);
                }
            }
        }

        let mut tags = std::collections::HashMap::new();
        for r in self.refs(client, owner, repo).await? {
            if let Some(name) = r.name.strip_prefix("refs/heads/") {
                tags.insert(name.to_string(), r.object.sha);
            } else if let Some(name) = r.name.strip_prefix("refs/tags/") {
                tags.insert(name.to_string(), r.object.sha);
            }
        }
        let default_branch = repo_meta.default_branch.as_deref().unwrap_or("master");
        let (tag, commit) = best_tag(&tags, default_branch)?;

        if commit == saved_etag {
            return Err(Error::NotModified);
        }

        let contents: Vec<Content> = client
            .get_json(&self.api_url(&format!("/repos/{owner}/{repo}/contents{dir}?ref={tag}")))
            .await?;
        if contents.is_empty() {
            return Err(Error::not_found("No files in directory."));
        }

        // The API resolves paths case-insensitively; requests for the wrong
        // casing must not produce a duplicate package.
        let canonical_prefix = format!("{}/repos/{owner}/{repo}/", self.api_base);
        if !contents[0].git_url.starts_with(&canonical_prefix) {
            return Err(Error::not_found("GitHub import path has incorrect case."));
        }

        let mut files = Vec::new();
        let mut data_urls = Vec::new();
        let mut subdirectories = Vec::new();
        for item in contents {
            if item.kind == "dir" {
                if is_valid_path_element(&item.name) {
                    subdirectories.push(item.name);
                }
            } else if is_doc_file(&item.name) {
                files.push(RemoteFile {
                    name: item.name,
                    data: Vec::new(),
                    browse_url: item.html_url,
                });
                data_urls.push(self.credentialed(&item.git_url));
            }
        }

        let bodies = client.fetch_all(&data_urls, Some(RAW_ACCEPT)).await?;
        for (file, body) in files.iter_mut().zip(bodies) {
            file.data = body;
        }

        let browse_url = if dir.is_empty() {
            format!("{}/{owner}/{repo}", self.web_base)
        } else {
            format!("{}/{owner}/{repo}/tree/{tag}{dir}", self.web_base)
        };

        Ok(Directory {
            browse_url,
            etag: commit,
            files,
            line_fmt: "%s#L%d".to_string(),
            project_name: repo.clone(),
            project_root: format!("github.com/{owner}/{repo}"),
            project_url: format!("{}/{owner}/{repo}", self.web_base),
            subdirectories,
            vcs: "git".to_string(),
            stars: repo_meta.stargazers_count,
            fork: repo_meta.fork,
            ..Directory::default()
        })
    }

    fn credentialed(&self, url: &str) -> String {
        if let (Some(id), Some(secret)) = (&self.client_id, &self.client_secret) {
            let sep = if url.contains('?') { '&' } else { '?' };
            format!("{url}{sep}client_id={id}&client_secret={secret}")
        } else {
            url.to_string()
        }
    }

    /// Fetch a gist as a single flat directory.
    pub async fn fetch_gist(
        &self,
        client: &HttpClient,
        m: &MatchMap,
        saved_etag: &str,
    ) -> Result<Directory> {
        let gist_id = &m["gist"];
        let gist: Gist = client
            .get_json(&self.api_url(&format!("/gists/{gist_id}")))
            .await?;

        let Some(head) = gist.history.first() else {
            return Err(Error::not_found("History not found."));
        };
        if head.version == saved_etag {
            return Err(Error::NotModified);
        }

        let files = gist
            .files
            .into_iter()
            .filter(|(name, _)| is_doc_file(name))
            .map(|(name, file)| RemoteFile {
                browse_url: format!("{}#file-{}", gist.html_url, name.replace('.', "-")),
                data: file.content.into_bytes(),
                name,
            })
            .collect();

        Ok(Directory {
            browse_url: gist.html_url.clone(),
            etag: head.version.clone(),
            files,
            line_fmt: "%s-L%d".to_string(),
            project_name: gist_id.clone(),
            project_root: format!("gist.github.com/{gist_id}.git"),
            project_url: gist.html_url,
            vcs: "git".to_string(),
            ..Directory::default()
        })
    }

    /// Fetch a standard-library directory from the Go repository mirror.
    pub async fn fetch_standard(
        &self,
        client: &HttpClient,
        import_path: &str,
        saved_etag: &str,
    ) -> Result<Directory> {
        let mut m = MatchMap::new();
        m.insert("importPath".to_string(), import_path.to_string());
        m.insert("owner".to_string(), "golang".to_string());
        m.insert("repo".to_string(), "go".to_string());
        m.insert("dir".to_string(), format!("/src/{import_path}"));

        let mut dir = self.fetch(client, &m, saved_etag).await?;
        dir.project_root = String::new();
        dir.project_name = "Go".to_string();
        dir.project_url = "https://golang.org/".to_string();
        Ok(dir)
    }

    /// Recently pushed Go repositories, ascending by push time, together
    /// with the new high-water mark.
    pub async fn updates(
        &self,
        client: &HttpClient,
        pushed_after: &str,
    ) -> Result<(String, Vec<RepoUpdate>)> {
        let pushed_after = if pushed_after.is_empty() {
            (Utc::now() - Duration::hours(24))
                .format("%Y-%m-%dT%H:%M:%SZ")
                .to_string()
        } else {
            pushed_after.to_string()
        };

        let url = self.api_url(&expand(
            "/search/repositories?order=asc&sort=updated&q=fork:true+language:Go+pushed:>{after}",
            &MatchMap::from([("after".to_string(), pushed_after.clone())]),
            &[],
        ));
        let results: SearchResults = client.get_json(&url).await?;

        let mut max_pushed_at = pushed_after;
        for item in &results.items {
            if item.pushed_at > max_pushed_at {
                max_pushed_at = item.pushed_at.clone();
            }
        }
        Ok((max_pushed_at, results.items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> HttpClient {
        HttpClient::new(
            "docdex-test",
            std::time::Duration::from_secs(5),
            std::time::Duration::from_secs(5),
        )
        .unwrap()
    }

    fn match_map(dir: &str) -> MatchMap {
        let mut m = MatchMap::from([
            ("importPath".to_string(), "github.com/user/repo".to_string()),
            ("owner".to_string(), "user".to_string()),
            ("repo".to_string(), "repo".to_string()),
        ]);
        if !dir.is_empty() {
            m.insert("dir".to_string(), dir.to_string());
        }
        m
    }

    async fn mount_repo(server: &MockServer, fork: bool) {
        Mock::given(method("GET"))
            .and(path("/repos/user/repo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "default_branch": "main",
                "fork": fork,
                "stargazers_count": 42,
                "created_at": "2020-01-01T00:00:00Z",
                "pushed_at": "2024-06-01T00:00:00Z",
            })))
            .mount(server)
            .await;
    }

    async fn mount_refs(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/repos/user/repo/git/refs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"ref": "refs/heads/main", "object": {"type": "commit", "sha": "c0ffee"}},
                {"ref": "refs/tags/v1.0.0", "object": {"type": "commit", "sha": "facade"}},
            ])))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_fetch_directory() {
        let server = MockServer::start().await;
        mount_repo(&server, false).await;
        mount_refs(&server).await;

        let base = server.uri();
        Mock::given(method("GET"))
            .and(path("/repos/user/repo/contents"))
            .and(query_param("ref", "main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"type": "file", "name": "doc.go",
                 "git_url": format!("{base}/repos/user/repo/git/blobs/1"),
                 "html_url": "https://github.com/user/repo/blob/main/doc.go"},
                {"type": "file", "name": "Makefile",
                 "git_url": format!("{base}/repos/user/repo/git/blobs/2"),
                 "html_url": ""},
                {"type": "dir", "name": "internal",
                 "git_url": format!("{base}/repos/user/repo/git/trees/3"),
                 "html_url": ""},
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/user/repo/git/blobs/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("package repo\n"))
            .mount(&server)
            .await;

        let host = GitHubHost::with_bases(server.uri(), "https://github.com");
        let dir = host.fetch(&client(), &match_map(""), "").await.unwrap();

        assert_eq!(dir.etag, "c0ffee");
        assert_eq!(dir.project_root, "github.com/user/repo");
        assert_eq!(dir.subdirectories, vec!["internal"]);
        assert_eq!(dir.files.len(), 1);
        assert_eq!(dir.files[0].name, "doc.go");
        assert_eq!(dir.files[0].data, b"package repo\n");
        assert_eq!(dir.line_fmt, "%s#L%d");
        assert_eq!(dir.stars, 42);
        assert!(!dir.fork);
    }

    #[tokio::test]
    async fn test_fetch_not_modified() {
        let server = MockServer::start().await;
        mount_repo(&server, false).await;
        mount_refs(&server).await;

        let host = GitHubHost::with_bases(server.uri(), "https://github.com");
        let err = host
            .fetch(&client(), &match_map(""), "c0ffee")
            .await
            .unwrap_err();
        assert!(err.is_not_modified());
    }

    #[tokio::test]
    async fn test_fetch_incorrect_case() {
        let server = MockServer::start().await;
        mount_repo(&server, false).await;
        mount_refs(&server).await;

        Mock::given(method("GET"))
            .and(path("/repos/user/repo/contents"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"type": "file", "name": "doc.go",
                 "git_url": format!("{}/repos/User/Repo/git/blobs/1", server.uri()),
                 "html_url": ""},
            ])))
            .mount(&server)
            .await;

        let host = GitHubHost::with_bases(server.uri(), "https://github.com");
        let err = host.fetch(&client(), &match_map(""), "").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("incorrect case"));
    }

    #[tokio::test]
    async fn test_fetch_quick_fork() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/user/repo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "default_branch": "main",
                "fork": true,
                "created_at": "2024-06-01T00:00:00Z",
                "pushed_at": "2024-06-02T00:00:00Z",
            })))
            .mount(&server)
            .await;

        let host = GitHubHost::with_bases(server.uri(), "https://github.com");
        let err = host.fetch(&client(), &match_map(""), "").await.unwrap_err();
        assert!(err.is_quick_fork());
    }

    #[tokio::test]
    async fn test_fetch_missing_repo_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let host = GitHubHost::with_bases(server.uri(), "https://github.com");
        let err = host.fetch(&client(), &match_map(""), "").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_fetch_gist() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gists/abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "files": {
                    "main.go": {"content": "package main\n"},
                    "notes.txt": {"content": "irrelevant"},
                },
                "html_url": "https://gist.github.com/abc123",
                "history": [{"version": "v2"}, {"version": "v1"}],
            })))
            .mount(&server)
            .await;

        let host = GitHubHost::with_bases(server.uri(), "https://github.com");
        let m = MatchMap::from([("gist".to_string(), "abc123".to_string())]);
        let dir = host.fetch_gist(&client(), &m, "").await.unwrap();
        assert_eq!(dir.etag, "v2");
        assert_eq!(dir.files.len(), 1);
        assert_eq!(dir.files[0].name, "main.go");
        assert_eq!(dir.project_root, "gist.github.com/abc123.git");

        let err = host.fetch_gist(&client(), &m, "v2").await.unwrap_err();
        assert!(err.is_not_modified());
    }

    #[tokio::test]
    async fn test_updates_advances_high_water_mark() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {"full_name": "user/alpha", "pushed_at": "2026-01-01T10:00:00Z", "fork": false},
                    {"full_name": "user/beta", "pushed_at": "2026-01-01T11:00:00Z", "fork": true},
                ],
            })))
            .mount(&server)
            .await;

        let host = GitHubHost::with_bases(server.uri(), "https://github.com");
        let (hwm, updates) = host
            .updates(&client(), "2026-01-01T00:00:00Z")
            .await
            .unwrap();
        assert_eq!(hwm, "2026-01-01T11:00:00Z");
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].full_name, "user/alpha");
    }

    #[tokio::test]
    async fn test_credentials_appended() {
        let host = GitHubHost {
            client_id: Some("id".to_string()),
            client_secret: Some("secret".to_string()),
            ..GitHubHost::default()
        };
        assert_eq!(
            host.api_url("/repos/a/b"),
            "https://api.github.com/repos/a/b?client_id=id&client_secret=secret"
        );
        assert_eq!(
            host.api_url("/repos/a/b/contents/x?ref=main"),
            "https://api.github.com/repos/a/b/contents/x?ref=main&client_id=id&client_secret=secret"
        );
    }
}

// src/services/bitbucket.rs

//! Bitbucket API client. Repositories may be git or mercurial; the scm is
//! discovered once and then pinned by the etag prefix.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use super::{best_tag, MatchMap};
use crate::builder::is_doc_file;
use crate::error::{Error, Result};
use crate::models::{Directory, RemoteFile};
use crate::utils::HttpClient;

fn etag_scm() -> &'static Regex {
    static PAT: OnceLock<Regex> = OnceLock::new();
    PAT.get_or_init(|| Regex::new(r"^(hg|git)-").expect("valid regex"))
}

fn default_branch(vcs: &str) -> &'static str {
    match vcs {
        "hg" => "default",
        _ => "master",
    }
}

#[derive(Debug, Deserialize)]
struct Repo {
    scm: String,
}

#[derive(Debug, Deserialize)]
struct Node {
    node: String,
}

#[derive(Debug, Deserialize)]
struct Listing {
    #[serde(default)]
    directories: Vec<String>,
    #[serde(default)]
    files: Vec<ListedFile>,
}

#[derive(Debug, Deserialize)]
struct ListedFile {
    path: String,
}

#[derive(Debug, Clone)]
pub struct BitbucketHost {
    api_base: String,
    web_base: String,
}

impl Default for BitbucketHost {
    fn default() -> Self {
        Self {
            api_base: "https://api.bitbucket.org/1.0".to_string(),
            web_base: "https://bitbucket.org".to_string(),
        }
    }
}

impl BitbucketHost {
    pub fn with_bases(api_base: impl Into<String>, web_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            web_base: web_base.into(),
        }
    }

    pub async fn fetch(
        &self,
        client: &HttpClient,
        m: &MatchMap,
        saved_etag: &str,
    ) -> Result<Directory> {
        let owner = &m["owner"];
        let repo = &m["repo"];
        let dir = m.get("dir").map(String::as_str).unwrap_or("");

        // The scm choice is sticky: a saved etag names it, otherwise ask.
        let vcs = match etag_scm().captures(saved_etag) {
            Some(c) => c[1].to_string(),
            None => {
                let repo_meta: Repo = client
                    .get_json(&format!("{}/repositories/{owner}/{repo}", self.api_base))
                    .await?;
                repo_meta.scm
            }
        };

        let mut tags = HashMap::new();
        for node_type in ["branches", "tags"] {
            let nodes: HashMap<String, Node> = client
                .get_json(&format!(
                    "{}/repositories/{owner}/{repo}/{node_type}",
                    self.api_base
                ))
                .await?;
            for (name, node) in nodes {
                tags.insert(name, node.node);
            }
        }

        let (tag, commit) = best_tag(&tags, default_branch(&vcs))?;
        let etag = format!("{vcs}-{commit}");
        if etag == saved_etag {
            return Err(Error::NotModified);
        }

        let listing: Listing = client
            .get_json(&format!(
                "{}/repositories/{owner}/{repo}/src/{tag}{dir}/",
                self.api_base
            ))
            .await?;

        let mut files = Vec::new();
        let mut data_urls = Vec::new();
        for listed in &listing.files {
            let name = listed.path.rsplit('/').next().unwrap_or(&listed.path);
            if !is_doc_file(name) {
                continue;
            }
            files.push(RemoteFile {
                name: name.to_string(),
                data: Vec::new(),
                browse_url: format!(
                    "{}/{owner}/{repo}/src/{tag}/{}",
                    self.web_base, listed.path
                ),
            });
            data_urls.push(format!(
                "{}/repositories/{owner}/{repo}/raw/{tag}/{}",
                self.api_base, listed.path
            ));
        }

        let bodies = client.fetch_all(&data_urls, None).await?;
        for (file, body) in files.iter_mut().zip(bodies) {
            file.data = body;
        }

        Ok(Directory {
            browse_url: format!("{}/{owner}/{repo}/src/{tag}{dir}", self.web_base),
            etag,
            files,
            line_fmt: "%s#cl-%d".to_string(),
            project_name: repo.clone(),
            project_root: format!("bitbucket.org/{owner}/{repo}"),
            project_url: format!("{}/{owner}/{repo}/", self.web_base),
            subdirectories: listing.directories,
            vcs,
            ..Directory::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> HttpClient {
        HttpClient::new(
            "docdex-test",
            std::time::Duration::from_secs(5),
            std::time::Duration::from_secs(5),
        )
        .unwrap()
    }

    fn match_map() -> MatchMap {
        MatchMap::from([
            (
                "importPath".to_string(),
                "bitbucket.org/user/repo".to_string(),
            ),
            ("owner".to_string(), "user".to_string()),
            ("repo".to_string(), "repo".to_string()),
        ])
    }

    async fn mount_tree(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/repositories/user/repo/branches"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"default": {"node": "beefed"}})),
            )
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repositories/user/repo/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repositories/user/repo/src/default/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "directories": ["sub"],
                "files": [{"path": "thing.go"}, {"path": "notes.txt"}],
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repositories/user/repo/raw/default/thing.go"))
            .respond_with(ResponseTemplate::new(200).set_body_string("package thing\n"))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_fetch_discovers_scm() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repositories/user/repo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"scm": "hg"})))
            .mount(&server)
            .await;
        mount_tree(&server).await;

        let host = BitbucketHost::with_bases(server.uri(), "https://bitbucket.org");
        let dir = host.fetch(&client(), &match_map(), "").await.unwrap();
        assert_eq!(dir.vcs, "hg");
        assert_eq!(dir.etag, "hg-beefed");
        assert_eq!(dir.subdirectories, vec!["sub"]);
        assert_eq!(dir.files.len(), 1);
        assert_eq!(dir.files[0].data, b"package thing\n");
        assert_eq!(dir.line_fmt, "%s#cl-%d");
    }

    #[tokio::test]
    async fn test_fetch_sticky_scm_and_not_modified() {
        let server = MockServer::start().await;
        // No /repositories/user/repo mock: the etag prefix must pin the scm
        // without a discovery request.
        mount_tree(&server).await;

        let host = BitbucketHost::with_bases(server.uri(), "https://bitbucket.org");
        let err = host
            .fetch(&client(), &match_map(), "hg-beefed")
            .await
            .unwrap_err();
        assert!(err.is_not_modified());
    }
}

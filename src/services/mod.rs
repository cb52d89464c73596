// src/services/mod.rs

//! Source acquisition.
//!
//! A registry of hosting services turns an import path into a [`Directory`]
//! listing with file bodies. Paths are dispatched by prefix first, then by
//! regular expression; a prefix match with a regex miss is a hard NotFound.
//! Standard-library paths route to the Go repository mirror. Paths no static
//! service claims fall through to dynamic go-import meta resolution.

pub mod bitbucket;
pub mod github;
pub mod meta;
pub mod vcs;

use std::collections::HashMap;

use regex::Regex;

use crate::builder::path::{is_standard_path, is_valid_remote_path};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::Directory;
use crate::utils::HttpClient;

/// Named captures of a service pattern plus the request context.
pub type MatchMap = HashMap<String, String>;

/// Pick the effective revision: a tag literally named `go1` wins, then the
/// host's default branch.
pub(crate) fn best_tag(
    tags: &HashMap<String, String>,
    default_branch: &str,
) -> Result<(String, String)> {
    if let Some(commit) = tags.get("go1") {
        return Ok(("go1".to_string(), commit.clone()));
    }
    if let Some(commit) = tags.get(default_branch) {
        return Ok((default_branch.to_string(), commit.clone()));
    }
    Err(Error::not_found("Tag or branch not found."))
}

enum ServiceKind {
    GitHub,
    Gist,
    Bitbucket,
    GenericVcs,
}

struct Service {
    prefix: &'static str,
    pattern: Regex,
    kind: ServiceKind,
}

impl Service {
    /// Match `import_path` against this service. `Ok(None)` means "not
    /// ours"; a prefix hit with a pattern miss is a hard NotFound.
    fn matches(&self, import_path: &str) -> Result<Option<MatchMap>> {
        if !import_path.starts_with(self.prefix) {
            return Ok(None);
        }
        let Some(captures) = self.pattern.captures(import_path) else {
            if self.prefix.is_empty() {
                return Ok(None);
            }
            return Err(Error::not_found(
                "Import path prefix matches known service, but pattern does not.",
            ));
        };
        let mut map = MatchMap::new();
        map.insert("importPath".to_string(), import_path.to_string());
        for name in self.pattern.capture_names().flatten() {
            if let Some(value) = captures.name(name) {
                map.insert(name.to_string(), value.as_str().to_string());
            }
        }
        Ok(Some(map))
    }
}

/// The polymorphic fetcher: one entry point over all hosting services.
pub struct Fetcher {
    client: HttpClient,
    github: github::GitHubHost,
    bitbucket: bitbucket::BitbucketHost,
    vcs: vcs::VcsHost,
    services: Vec<Service>,
}

impl Fetcher {
    pub fn new(client: HttpClient, config: &Config) -> Self {
        Self::with_hosts(
            client,
            github::GitHubHost::from_config(&config.github),
            bitbucket::BitbucketHost::default(),
            vcs::VcsHost::new(&config.crawler.repo_root),
        )
    }

    /// Construction with explicit hosts, used by tests to point the API
    /// clients at mock servers.
    pub fn with_hosts(
        client: HttpClient,
        github: github::GitHubHost,
        bitbucket: bitbucket::BitbucketHost,
        vcs: vcs::VcsHost,
    ) -> Self {
        let services = vec![
            Service {
                prefix: "github.com/",
                pattern: Regex::new(
                    r"^github\.com/(?P<owner>[a-z0-9A-Z_.\-]+)/(?P<repo>[a-z0-9A-Z_.\-]+)(?P<dir>/[a-z0-9A-Z_.\-/]*)?$",
                )
                .expect("valid regex"),
                kind: ServiceKind::GitHub,
            },
            Service {
                prefix: "gist.github.com/",
                pattern: Regex::new(r"^gist\.github\.com/(?P<gist>[a-z0-9A-Z_.\-]+)\.git$")
                    .expect("valid regex"),
                kind: ServiceKind::Gist,
            },
            Service {
                prefix: "bitbucket.org/",
                pattern: Regex::new(
                    r"^bitbucket\.org/(?P<owner>[a-z0-9A-Z_.\-]+)/(?P<repo>[a-z0-9A-Z_.\-]+)(?P<dir>/[a-z0-9A-Z_.\-/]*)?$",
                )
                .expect("valid regex"),
                kind: ServiceKind::Bitbucket,
            },
            // Fallthrough: explicit VCS suffix on an arbitrary host.
            Service {
                prefix: "",
                pattern: Regex::new(
                    r"^(?P<repo>(?:[a-z0-9.\-]+\.)+[a-z0-9.\-]+(?::[0-9]+)?/[A-Za-z0-9_.\-/]*?)\.(?P<vcs>bzr|git|hg|svn)(?P<dir>/[A-Za-z0-9_.\-/]*)?$",
                )
                .expect("valid regex"),
                kind: ServiceKind::GenericVcs,
            },
        ];
        Self {
            client,
            github,
            bitbucket,
            vcs,
            services,
        }
    }

    /// Fetch the directory for `import_path`, using `saved_etag` for
    /// conditional refresh.
    pub async fn fetch(&self, import_path: &str, saved_etag: &str) -> Result<Directory> {
        let mut dir = if is_standard_path(import_path) {
            self.github
                .fetch_standard(&self.client, import_path, saved_etag)
                .await?
        } else if is_valid_remote_path(import_path) {
            match self.fetch_static(import_path, saved_etag).await? {
                Some(dir) => dir,
                None => self.fetch_dynamic(import_path, saved_etag).await?,
            }
        } else {
            return Err(Error::not_found(format!(
                "Import path not valid: {import_path}"
            )));
        };

        dir.import_path = import_path.to_string();
        if dir.resolved_path.is_empty() {
            dir.resolved_path = import_path.to_string();
        }
        Ok(dir)
    }

    /// Try every statically registered service. `Ok(None)` means no service
    /// claimed the path.
    async fn fetch_static(&self, import_path: &str, saved_etag: &str) -> Result<Option<Directory>> {
        for service in &self.services {
            let Some(match_map) = service.matches(import_path)? else {
                continue;
            };
            let dir = match service.kind {
                ServiceKind::GitHub => {
                    self.github
                        .fetch(&self.client, &match_map, saved_etag)
                        .await?
                }
                ServiceKind::Gist => {
                    self.github
                        .fetch_gist(&self.client, &match_map, saved_etag)
                        .await?
                }
                ServiceKind::Bitbucket => {
                    self.bitbucket
                        .fetch(&self.client, &match_map, saved_etag)
                        .await?
                }
                ServiceKind::GenericVcs => self.vcs.fetch(&match_map, saved_etag).await?,
            };
            return Ok(Some(dir));
        }
        Ok(None)
    }

    /// Resolve an unknown host through its go-import meta tags, then
    /// delegate to a static service by repository URL or to the generic VCS
    /// handler.
    async fn fetch_dynamic(&self, import_path: &str, saved_etag: &str) -> Result<Directory> {
        let resolved = meta::fetch_meta(&self.client, import_path).await?;

        if resolved.project_root != import_path {
            // Fixed point: the root page must declare itself as the root.
            let root_meta = meta::fetch_meta(&self.client, &resolved.project_root).await?;
            if root_meta.project_root != resolved.project_root {
                return Err(Error::not_found("Project root mismatch."));
            }
        }

        let repo_path = format!("{}{}", resolved.repo, resolved.dir);
        let mut dir = match self.fetch_static(&repo_path, saved_etag).await? {
            Some(dir) => dir,
            None => {
                let mut match_map = MatchMap::new();
                match_map.insert("importPath".to_string(), import_path.to_string());
                match_map.insert("repo".to_string(), resolved.repo.clone());
                match_map.insert("vcs".to_string(), resolved.vcs.clone());
                match_map.insert("dir".to_string(), resolved.dir.clone());
                match_map.insert("scheme".to_string(), resolved.scheme.clone());
                self.vcs.fetch(&match_map, saved_etag).await?
            }
        };

        dir.import_path = import_path.to_string();
        dir.resolved_path = repo_path;
        dir.project_root = resolved.project_root;
        dir.project_name = resolved.project_name;
        dir.project_url = resolved.project_url;
        Ok(dir)
    }

    /// Recently pushed repositories on the primary hosting service.
    pub async fn github_updates(
        &self,
        pushed_after: &str,
    ) -> Result<(String, Vec<github::RepoUpdate>)> {
        self.github.updates(&self.client, pushed_after).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(prefix: &'static str, pattern: &str) -> Service {
        Service {
            prefix,
            pattern: Regex::new(pattern).expect("valid regex"),
            kind: ServiceKind::GitHub,
        }
    }

    #[test]
    fn test_match_extracts_captures() {
        let svc = service(
            "github.com/",
            r"^github\.com/(?P<owner>[a-z0-9A-Z_.\-]+)/(?P<repo>[a-z0-9A-Z_.\-]+)(?P<dir>/[a-z0-9A-Z_.\-/]*)?$",
        );
        let m = svc
            .matches("github.com/user/repo/sub/dir")
            .unwrap()
            .unwrap();
        assert_eq!(m["owner"], "user");
        assert_eq!(m["repo"], "repo");
        assert_eq!(m["dir"], "/sub/dir");
        assert_eq!(m["importPath"], "github.com/user/repo/sub/dir");
    }

    #[test]
    fn test_prefix_miss_is_not_ours() {
        let svc = service("github.com/", r"^github\.com/(?P<owner>[a-z]+)$");
        assert!(svc.matches("bitbucket.org/user/repo").unwrap().is_none());
    }

    #[test]
    fn test_prefix_hit_with_pattern_miss_is_not_found() {
        let svc = service("github.com/", r"^github\.com/(?P<owner>[a-z]+)/(?P<repo>[a-z]+)$");
        let err = svc.matches("github.com/only-owner").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_fallthrough_service_never_hard_fails() {
        let svc = Service {
            prefix: "",
            pattern: Regex::new(r"\.git$").expect("valid regex"),
            kind: ServiceKind::GenericVcs,
        };
        assert!(svc.matches("example.com/no/match").unwrap().is_none());
    }

    #[test]
    fn test_best_tag_prefers_go1() {
        let tags = HashMap::from([
            ("go1".to_string(), "sha-go1".to_string()),
            ("main".to_string(), "sha-main".to_string()),
        ]);
        assert_eq!(
            best_tag(&tags, "main").unwrap(),
            ("go1".to_string(), "sha-go1".to_string())
        );

        let tags = HashMap::from([("main".to_string(), "sha-main".to_string())]);
        assert_eq!(
            best_tag(&tags, "main").unwrap(),
            ("main".to_string(), "sha-main".to_string())
        );
        assert!(best_tag(&tags, "master").unwrap_err().is_not_found());
    }
}

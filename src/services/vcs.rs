// src/services/vcs.rs

//! Generic VCS handler: import paths that name their VCS explicitly
//! (`host/path.git/dir`). Works from a local checkout under a configured
//! root directory. Only git is wired up; the other recognized systems
//! report NotFound until someone needs them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tokio::process::Command;

use super::{best_tag, MatchMap};
use crate::builder::is_doc_file;
use crate::error::{Error, Result};
use crate::models::{Directory, RemoteFile};

fn ls_remote_pat() -> &'static Regex {
    static PAT: OnceLock<Regex> = OnceLock::new();
    PAT.get_or_init(|| {
        Regex::new(r"(?m)^([0-9a-f]{40})\s+refs/(?:tags|heads)/(.+)$").expect("valid regex")
    })
}

const GIT_SCHEMES: &[&str] = &["https", "http", "git"];

/// Parse `git ls-remote` output into a tag/branch → commit map.
fn parse_ls_remote(output: &str) -> HashMap<String, String> {
    ls_remote_pat()
        .captures_iter(output)
        .map(|c| (c[2].to_string(), c[1].to_string()))
        .collect()
}

/// Order the candidate schemes, honoring a sticky choice from a previous
/// etag or a scheme the meta tag declared.
fn candidate_schemes(sticky: Option<&str>) -> Vec<&'static str> {
    if let Some(sticky) = sticky {
        if let Some(&s) = GIT_SCHEMES.iter().find(|&&s| s == sticky) {
            return vec![s];
        }
    }
    GIT_SCHEMES.to_vec()
}

pub struct VcsHost {
    root: PathBuf,
}

impl VcsHost {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn fetch(&self, m: &MatchMap, saved_etag: &str) -> Result<Directory> {
        let vcs = m.get("vcs").map(String::as_str).unwrap_or("");
        if vcs != "git" {
            return Err(Error::not_found(format!("VCS not supported: {vcs}")));
        }
        let repo = &m["repo"];
        let dir = m.get("dir").map(String::as_str).unwrap_or("");

        // Scheme choice is sticky: meta declaration first, then the saved
        // etag.
        let sticky = m
            .get("scheme")
            .map(String::as_str)
            .filter(|s| !s.is_empty())
            .or_else(|| saved_etag.split_once('-').map(|(scheme, _)| scheme));

        let (_tag, etag, _commit) = self
            .download_git(&candidate_schemes(sticky), repo, saved_etag)
            .await?;

        let checkout = self.root.join(format!("{repo}.git"));
        let listing_dir = checkout.join(dir.trim_start_matches('/'));
        let (files, subdirectories) = read_checkout(&listing_dir).await?;

        Ok(Directory {
            import_path: m["importPath"].clone(),
            resolved_path: m["importPath"].clone(),
            project_root: format!("{repo}.{vcs}"),
            project_name: repo.rsplit('/').next().unwrap_or(repo).to_string(),
            vcs: vcs.to_string(),
            etag,
            files,
            subdirectories,
            ..Directory::default()
        })
    }

    /// Sync the local working copy to the best remote revision. Returns the
    /// selected tag, the new etag, and the commit.
    async fn download_git(
        &self,
        schemes: &[&str],
        repo: &str,
        saved_etag: &str,
    ) -> Result<(String, String, String)> {
        let host = repo.split('/').next().unwrap_or(repo).to_string();

        let mut refs_output = None;
        let mut used_scheme = "";
        for scheme in schemes {
            let url = format!("{scheme}://{repo}.git");
            let output = Command::new("git")
                .args(["ls-remote", "--heads", "--tags", &url])
                .output()
                .await?;
            if output.status.success() {
                refs_output = Some(String::from_utf8_lossy(&output.stdout).into_owned());
                used_scheme = scheme;
                break;
            }
        }
        let Some(refs_output) = refs_output else {
            return Err(Error::not_found("VCS not found"));
        };

        let tags = parse_ls_remote(&refs_output);
        let (tag, commit) = best_tag(&tags, "master")?;
        let etag = format!("{used_scheme}-{commit}");
        if etag == saved_etag {
            return Err(Error::NotModified);
        }

        let checkout = self.root.join(format!("{repo}.git"));
        let head = tokio::fs::read_to_string(checkout.join(".git/HEAD")).await;
        match head {
            Ok(contents) if contents.trim_end() == commit => {
                // Working copy already at the wanted commit.
                return Ok((tag, etag, commit));
            }
            Ok(_) => {
                run_git(&checkout, &["fetch"], &host).await?;
            }
            Err(_) => {
                tokio::fs::create_dir_all(&checkout).await?;
                let url = format!("{used_scheme}://{repo}");
                let parent = checkout.parent().unwrap_or(Path::new("."));
                run_git(
                    parent,
                    &["clone", &url, &checkout.to_string_lossy()],
                    &host,
                )
                .await?;
            }
        }

        run_git(&checkout, &["checkout", "--detach", "--force", &commit], &host).await?;
        Ok((tag, etag, commit))
    }
}

async fn run_git(cwd: &Path, args: &[&str], host: &str) -> Result<()> {
    tracing::debug!("git {} (in {})", args.join(" "), cwd.display());
    let status = Command::new("git").args(args).current_dir(cwd).status().await?;
    if !status.success() {
        return Err(Error::remote(host, format!("git {} failed", args[0])));
    }
    Ok(())
}

/// Slurp the doc files and subdirectories of a checked-out directory.
async fn read_checkout(dir: &Path) -> Result<(Vec<RemoteFile>, Vec<String>)> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::not_found(format!("{} not in checkout", dir.display())));
        }
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    let mut subdirectories = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let kind = entry.file_type().await?;
        if kind.is_dir() {
            if name != ".git" {
                subdirectories.push(name);
            }
        } else if is_doc_file(&name) {
            files.push(RemoteFile {
                data: tokio::fs::read(entry.path()).await?,
                name,
                browse_url: String::new(),
            });
        }
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));
    subdirectories.sort();
    Ok((files, subdirectories))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ls_remote() {
        let output = "\
0123456789abcdef0123456789abcdef01234567\trefs/heads/master\n\
89abcdef0123456789abcdef0123456789abcdef\trefs/tags/go1\n\
89abcdef0123456789abcdef0123456789abcdef\trefs/tags/go1^{}\n";
        let tags = parse_ls_remote(output);
        assert_eq!(
            tags.get("master").map(String::as_str),
            Some("0123456789abcdef0123456789abcdef01234567")
        );
        assert!(tags.contains_key("go1"));
    }

    #[test]
    fn test_candidate_schemes_sticky() {
        assert_eq!(candidate_schemes(Some("git")), vec!["git"]);
        assert_eq!(candidate_schemes(Some("https")), vec!["https"]);
        assert_eq!(candidate_schemes(Some("ssh")), GIT_SCHEMES.to_vec());
        assert_eq!(candidate_schemes(None), GIT_SCHEMES.to_vec());
    }

    #[tokio::test]
    async fn test_unsupported_vcs() {
        let host = VcsHost::new("/tmp/docdex-test");
        let m = MatchMap::from([
            ("importPath".to_string(), "example.com/x.hg".to_string()),
            ("repo".to_string(), "example.com/x".to_string()),
            ("vcs".to_string(), "hg".to_string()),
        ]);
        let err = host.fetch(&m, "").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_read_checkout_missing_directory() {
        let err = read_checkout(Path::new("/tmp/docdex-test/definitely-missing"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}

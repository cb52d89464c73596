// src/pipeline/crawl.rs

//! One fetch→build→store cycle, with the exclusion rules applied up front
//! and the next-crawl policy applied on the way out.

use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use tracing::{info, warn};

use crate::builder::{self, path as pathrules};
use crate::error::{Error, Result};
use crate::models::PackageDoc;
use crate::services::Fetcher;
use crate::store::Store;

/// Packages with no importers and no upstream commits for this long are
/// dropped on the next NotModified instead of refreshed forever.
const INACTIVE_AGE_SECS: i64 = 2 * 365 * 24 * 60 * 60;

fn nested_project_pat() -> &'static Regex {
    static PAT: OnceLock<Regex> = OnceLock::new();
    PAT.get_or_init(|| {
        Regex::new(r"/(?:github\.com|launchpad\.net|code\.google\.com/p|bitbucket\.org|labix\.org)/")
            .expect("valid regex")
    })
}

fn epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(0, 0).unwrap()
}

/// Drives fetch→build→store for one import path at a time.
pub struct Crawler {
    store: Store,
    fetcher: Arc<Fetcher>,
    max_age: Duration,
}

impl Crawler {
    pub fn new(store: Store, fetcher: Arc<Fetcher>, max_age: Duration) -> Self {
        Self {
            store,
            fetcher,
            max_age,
        }
    }

    /// Reject paths the crawler must never fetch. The error is always a
    /// NotFound kind, sometimes carrying a canonical redirect.
    async fn check_excluded(&self, import_path: &str) -> Result<()> {
        // Old curated-extension aliases moved wholesale.
        if let Some(rest) = import_path.strip_prefix("code.google.com/p/go.") {
            return Err(Error::redirect(
                "Project moved.",
                format!("golang.org/x/{rest}"),
            ));
        }

        // Mirrors of the Go source tree inside other repositories.
        for marker in ["/src/pkg/", "/libgo/go/"] {
            if let Some(i) = import_path.find(marker) {
                if pathrules::is_standard_path(&import_path[i + marker.len()..]) {
                    return Err(Error::not_found("Go source tree mirror."));
                }
            }
        }

        if pathrules::is_excluded(import_path) {
            return Err(Error::not_found("Hidden path element."));
        }

        // A recognized host nested inside another package path, where the
        // inner path is already indexed, is a vendored copy.
        if let Some(m) = nested_project_pat().find(import_path) {
            let inner = &import_path[m.start() + 1..];
            if self.store.exists(inner).await? {
                return Err(Error::not_found("Copy of other project."));
            }
        }

        if self.store.is_blocked(import_path).await? {
            return Err(Error::not_found("Blocked."));
        }

        Ok(())
    }

    /// Next scheduled crawl: the base freshness window, stretched for noisy
    /// hosts and degraded records, stretched hard for gist-style ephemera.
    fn next_crawl_time(&self, import_path: &str, degraded: bool, start: DateTime<Utc>) -> DateTime<Utc> {
        let factor = if import_path.starts_with("gist.github.com/") {
            30
        } else if import_path.starts_with("github.com/") || degraded {
            7
        } else {
            1
        };
        start + chrono::Duration::from_std(self.max_age * factor).unwrap_or(chrono::Duration::days(1))
    }

    /// Fetch the package documentation and update the store.
    ///
    /// `Ok(Some(_))` carries the fresh (or still-valid) document.
    /// `Ok(None)` means the record is gone (deleted on NotModified of an
    /// inactive package). NotFound and QuickFork errors are returned after
    /// the record has been deleted; other errors leave the store untouched
    /// for the scheduler's backoff.
    pub async fn crawl_doc(
        &self,
        source: &str,
        import_path: &str,
        pdoc: Option<PackageDoc>,
        has_subdirs: bool,
        next_crawl: DateTime<Utc>,
    ) -> Result<Option<PackageDoc>> {
        let start = Utc::now();
        let saved_etag = pdoc.as_ref().map(|d| d.etag.clone()).unwrap_or_default();
        let late = if next_crawl > epoch() && start > next_crawl {
            (start - next_crawl).num_hours()
        } else {
            0
        };

        if let Err(e) = self.check_excluded(import_path).await {
            info!(source, import_path, outcome = "excluded", %e);
            if e.is_not_found() {
                self.store.delete(import_path).await?;
            }
            return Err(e);
        }

        let fetched = self.fetcher.fetch(import_path, &saved_etag).await;
        let fetch_ms = (Utc::now() - start).num_milliseconds();

        let outcome = match fetched {
            Ok(dir) => builder::build_doc(&dir).and_then(|built| {
                if built.name.is_empty() && !has_subdirs {
                    Err(Error::not_found("No Go files or subdirectories."))
                } else if !saved_etag.is_empty() && built.etag == saved_etag {
                    // Hosts without their own validation surface unchanged
                    // content through the builder's content etag.
                    Err(Error::NotModified)
                } else {
                    Ok(built)
                }
            }),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(built) => {
                let degraded = !built.errors.is_empty();
                let next = self.next_crawl_time(import_path, degraded, start);
                self.store.put(&built, next).await?;
                self.discover_referenced(&built).await?;
                info!(
                    source,
                    import_path,
                    late,
                    fetch_ms,
                    etag = %built.etag,
                    outcome = "put"
                );
                Ok(Some(built))
            }
            Err(e) if e.is_not_modified() => {
                let Some(existing) = pdoc else {
                    return Err(Error::not_found("Unmodified package was never stored."));
                };
                // A package nobody imports and nobody commits to has aged
                // out of the corpus.
                let inactive = (start - existing.updated).num_seconds() > INACTIVE_AGE_SECS
                    && self.store.importer_count(import_path).await? == 0;
                if inactive {
                    info!(source, import_path, fetch_ms, outcome = "inactive, deleted");
                    self.store.delete(import_path).await?;
                    return Ok(None);
                }
                let next = self.next_crawl_time(import_path, false, start);
                self.store
                    .touch_next_crawl(&existing.project_root, &existing.etag, next)
                    .await?;
                info!(source, import_path, late, fetch_ms, outcome = "touch");
                Ok(Some(existing))
            }
            Err(e) if e.is_not_found() => {
                info!(source, import_path, fetch_ms, outcome = "notfound", %e);
                self.store.delete(import_path).await?;
                Err(e)
            }
            Err(e) if e.is_quick_fork() => {
                info!(source, import_path, fetch_ms, outcome = "quick fork, deleted");
                self.store.delete(import_path).await?;
                Err(e)
            }
            Err(e) => {
                warn!(source, import_path, fetch_ms, outcome = "error", %e);
                Err(e)
            }
        }
    }

    /// Imports and README references seed the new-crawl queue.
    async fn discover_referenced(&self, pdoc: &PackageDoc) -> Result<()> {
        for path in pdoc.imports.iter().chain(pdoc.references.iter()) {
            if !pathrules::is_valid_remote_path(path)
                || pathrules::is_excluded(path)
                || self.store.exists(path).await?
            {
                continue;
            }
            self.store.bump_crawl(path).await?;
        }
        Ok(())
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }
}

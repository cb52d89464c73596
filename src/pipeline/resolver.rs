// src/pipeline/resolver.rs

//! The package resolver: the single entry point the front-end calls.
//!
//! Serves stored documents on the fast path and spawns bounded inline
//! crawls when a record is missing or stale. An abandoned resolver request
//! does not cancel its crawl; the crawl completes and persists so the work
//! is kept.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tracing::info;

use crate::builder::path::{is_standard_path, is_valid_path};
use crate::error::{Error, Result};
use crate::models::{Package, PackageDoc, RequestKind};
use crate::store::{Store, CURSOR_PATH};

use super::crawl::Crawler;

/// Outcome of a front-end search request.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// The query is a known import path; send the client to its page.
    Redirect(String),
    Results(Vec<Package>),
}

pub struct Resolver {
    store: Store,
    crawler: Arc<Crawler>,
    get_timeout: Duration,
    first_get_timeout: Duration,
}

impl Resolver {
    pub fn new(
        store: Store,
        crawler: Arc<Crawler>,
        get_timeout: Duration,
        first_get_timeout: Duration,
    ) -> Self {
        Self {
            store,
            crawler,
            get_timeout,
            first_get_timeout,
        }
    }

    /// Resolve `path` for one request, crawling inline when the request
    /// kind calls for it. Returns the document (when one exists) and the
    /// known packages below the path.
    pub async fn resolve(
        &self,
        path: &str,
        kind: RequestKind,
    ) -> Result<(Option<PackageDoc>, Vec<Package>)> {
        if path == CURSOR_PATH {
            // The scheduler's cursor alias must never resolve for clients.
            return Err(Error::not_found("Not found."));
        }

        let (pdoc, subdirs, next_crawl) = self.store.get(path).await?;
        let zero = Utc.timestamp_opt(0, 0).unwrap();

        let needs_crawl = match kind {
            RequestKind::Human => next_crawl < Utc::now(),
            RequestKind::Robot => next_crawl == zero && !subdirs.is_empty(),
            RequestKind::Query => next_crawl == zero && subdirs.is_empty(),
            RequestKind::Refresh => true,
        };
        if !needs_crawl {
            return Ok((pdoc, subdirs));
        }

        let timeout = if pdoc.is_none() {
            self.first_get_timeout
        } else {
            self.get_timeout
        };

        // The crawl is detached: dropping the timeout leaves it running to
        // completion, so its result is persisted either way.
        let crawler = Arc::clone(&self.crawler);
        let crawl_path = path.to_string();
        let crawl_pdoc = pdoc.clone();
        let has_subdirs = !subdirs.is_empty();
        let handle = tokio::spawn(async move {
            crawler
                .crawl_doc("web", &crawl_path, crawl_pdoc, has_subdirs, next_crawl)
                .await
        });

        let outcome = match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(Error::store(format!("crawl task failed: {join_error}"))),
            Err(_) => Err(Error::RefreshTimeout),
        };

        match outcome {
            Ok(fresh) => Ok((fresh, subdirs)),
            // The fetcher says the path is gone (possibly with a canonical
            // redirect); the stale copy has already been deleted.
            Err(e) if e.is_not_found() => Err(e),
            Err(Error::QuickFork) => Err(Error::not_found("Repository is a dead-end fork.")),
            Err(e) => {
                if pdoc.is_some() {
                    info!(path, "serving stored copy after crawl error: {e}");
                    return Ok((pdoc, subdirs));
                }
                Err(e)
            }
        }
    }

    /// Evaluate a search box query. Import-path-shaped input with a stored
    /// record short-circuits to a redirect instead of a term query.
    pub async fn search(&self, q: &str) -> Result<SearchOutcome> {
        let q = q.trim().trim_end_matches('/');
        if is_valid_path(q) {
            let (pdoc, _, _) = self.store.get(q).await?;
            if pdoc.is_some() {
                return Ok(SearchOutcome::Redirect(q.to_string()));
            }
        }
        Ok(SearchOutcome::Results(self.store.query(q).await?))
    }

    /// Whether a page view may bump the popularity score: human traffic to
    /// a real, healthy, non-command remote package, not arriving from the
    /// site's own popular-packages list.
    pub fn counts_for_popularity(
        pdoc: &PackageDoc,
        kind: RequestKind,
        self_referral: bool,
    ) -> bool {
        kind == RequestKind::Human
            && !pdoc.name.is_empty()
            && !is_standard_path(&pdoc.import_path)
            && !pdoc.is_command
            && pdoc.errors.is_empty()
            && !self_referral
    }
}

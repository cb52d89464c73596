// src/pipeline/background.rs

//! Background tasks: the crawl maintenance loop and the hosting-service
//! update poller. Each task has its own interval; a zero interval disables
//! it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tracing::{error, info};

use crate::error::Result;
use crate::services::Fetcher;
use crate::store::{Store, CURSOR_PATH};

use super::crawl::Crawler;

/// High-water mark key for the recently-pushed poll.
const GITHUB_UPDATED_META: &str = "githubUpdated";

pub struct Scheduler {
    crawler: Arc<Crawler>,
    store: Store,
    fetcher: Arc<Fetcher>,
    crawl_interval: Duration,
    github_interval: Duration,
}

impl Scheduler {
    pub fn new(
        crawler: Arc<Crawler>,
        store: Store,
        fetcher: Arc<Fetcher>,
        crawl_interval: Duration,
        github_interval: Duration,
    ) -> Self {
        Self {
            crawler,
            store,
            fetcher,
            crawl_interval,
            github_interval,
        }
    }

    /// Run the task loop forever. Task failures are logged, never fatal.
    pub async fn run(&self) {
        let mut next_crawl = tokio::time::Instant::now();
        let mut next_github = tokio::time::Instant::now();

        let mut sleep = Duration::from_secs(60);
        for interval in [self.crawl_interval, self.github_interval] {
            if !interval.is_zero() && interval < sleep {
                sleep = interval;
            }
        }

        loop {
            let now = tokio::time::Instant::now();

            if !self.github_interval.is_zero() && now >= next_github {
                if let Err(e) = self.read_github_updates().await {
                    error!("github updates task: {e}");
                }
                next_github = tokio::time::Instant::now() + self.github_interval;
            }

            if !self.crawl_interval.is_zero() && now >= next_crawl {
                if let Err(e) = self.do_crawl().await {
                    error!("crawl task: {e}");
                }
                next_crawl = tokio::time::Instant::now() + self.crawl_interval;
            }

            tokio::time::sleep(sleep).await;
        }
    }

    /// One scheduler step: prefer a queued first-time path, otherwise
    /// refresh the record due next.
    pub async fn do_crawl(&self) -> Result<()> {
        // Look for a new package to crawl.
        if let Some((path, has_subdirs)) = self.store.pop_new_crawl().await? {
            let epoch = Utc.timestamp_opt(0, 0).unwrap();
            let result = self
                .crawler
                .crawl_doc("new", &path, None, has_subdirs, epoch)
                .await;
            if !matches!(result, Ok(Some(_))) {
                // First crawls get no retries; quarantine the path.
                self.store.add_bad_crawl(&path).await?;
            }
            return Ok(());
        }

        // Refresh the existing record that is due next.
        let (pdoc, subdirs, next_crawl) = self.store.get(CURSOR_PATH).await?;
        let Some(pdoc) = pdoc else {
            return Ok(());
        };
        if next_crawl > Utc::now() {
            return Ok(());
        }

        let result = self
            .crawler
            .crawl_doc(
                "crawl",
                &pdoc.import_path.clone(),
                Some(pdoc.clone()),
                !subdirs.is_empty(),
                next_crawl,
            )
            .await;
        if let Err(e) = result {
            if !e.is_not_found() && !e.is_quick_fork() {
                // Transient failure: push the schedule forward so the
                // cursor advances instead of stalling on this package.
                let backoff = Utc::now()
                    + chrono::Duration::from_std(self.crawler.max_age() / 3)
                        .unwrap_or(chrono::Duration::hours(8));
                self.store
                    .touch_next_crawl(&pdoc.project_root, &pdoc.etag, backoff)
                    .await?;
            }
        }
        Ok(())
    }

    /// Poll the hosting service for recently pushed repositories and pull
    /// their crawl schedules to now. The high-water mark is persisted only
    /// after every bump succeeded.
    pub async fn read_github_updates(&self) -> Result<()> {
        let since = self
            .store
            .get_meta(GITHUB_UPDATED_META)
            .await?
            .unwrap_or_default();
        let (high_water_mark, updates) = self.fetcher.github_updates(&since).await?;

        for update in &updates {
            self.store
                .bump_crawl(&format!("github.com/{}", update.full_name))
                .await?;
        }
        info!(
            count = updates.len(),
            %high_water_mark,
            "github updates bumped"
        );
        self.store
            .set_meta(GITHUB_UPDATED_META, &high_water_mark)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::bitbucket::BitbucketHost;
    use crate::services::github::GitHubHost;
    use crate::services::vcs::VcsHost;
    use crate::utils::HttpClient;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn scheduler_with_mock_github(server: &MockServer) -> Scheduler {
        let client = HttpClient::new(
            "docdex-test",
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
        .unwrap();
        let fetcher = Arc::new(Fetcher::with_hosts(
            client,
            GitHubHost::with_bases(server.uri(), "https://github.com"),
            BitbucketHost::default(),
            VcsHost::new("/tmp/docdex-test"),
        ));
        let store = Store::memory();
        let crawler = Arc::new(Crawler::new(
            store.clone(),
            Arc::clone(&fetcher),
            Duration::from_secs(3600),
        ));
        Scheduler::new(
            crawler,
            store,
            fetcher,
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn test_github_updates_persist_high_water_mark() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {"full_name": "user/alpha", "pushed_at": "2026-01-01T10:00:00Z"},
                ],
            })))
            .mount(&server)
            .await;

        let scheduler = scheduler_with_mock_github(&server).await;
        scheduler.read_github_updates().await.unwrap();

        assert_eq!(
            scheduler
                .store
                .get_meta(GITHUB_UPDATED_META)
                .await
                .unwrap()
                .as_deref(),
            Some("2026-01-01T10:00:00Z")
        );
        // The unknown repository landed on the new-crawl queue.
        let (path, _) = scheduler.store.pop_new_crawl().await.unwrap().unwrap();
        assert_eq!(path, "github.com/user/alpha");
    }

    #[tokio::test]
    async fn test_github_updates_failure_keeps_high_water_mark() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let scheduler = scheduler_with_mock_github(&server).await;
        scheduler
            .store
            .set_meta(GITHUB_UPDATED_META, "2026-01-01T00:00:00Z")
            .await
            .unwrap();
        assert!(scheduler.read_github_updates().await.is_err());
        assert_eq!(
            scheduler
                .store
                .get_meta(GITHUB_UPDATED_META)
                .await
                .unwrap()
                .as_deref(),
            Some("2026-01-01T00:00:00Z")
        );
    }

    #[tokio::test]
    async fn test_failed_first_crawl_is_quarantined() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let scheduler = scheduler_with_mock_github(&server).await;
        scheduler
            .store
            .bump_crawl("github.com/user/missing")
            .await
            .unwrap();

        scheduler.do_crawl().await.unwrap();

        // Queue drained, path quarantined: bumping it again is a no-op.
        assert!(scheduler.store.pop_new_crawl().await.unwrap().is_none());
        scheduler
            .store
            .bump_crawl("github.com/user/missing")
            .await
            .unwrap();
        assert!(scheduler.store.pop_new_crawl().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_do_crawl_idles_when_nothing_due() {
        let server = MockServer::start().await;
        let scheduler = scheduler_with_mock_github(&server).await;
        // Empty store: the step is a no-op rather than an error.
        scheduler.do_crawl().await.unwrap();
    }
}

//! Drives one crawl job: pops targets from the frontier, runs them on pooled
//! sessions and feeds discovered links back in until the frontier empties or
//! the request budget is spent.
//!
//! The scheduler loop is the only owner of the frontier. Workers run as
//! spawned tasks and report back over a channel, so completions are handled
//! one at a time and in the order they finish.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::browser::pool::{PooledSession, SessionPool};
use crate::crawler::aggregator::{CrawlReport, ResultAggregator};
use crate::crawler::filter::LinkFilter;
use crate::crawler::frontier::Frontier;
use crate::crawler::job::CrawlJob;
use crate::crawler::processor::PageProcessor;
use crate::crawler::task::{CrawlTarget, PageResult, PageSuccess};
use crate::error::CrawlError;

/// Lifecycle of a scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Frontier seeded, nothing dispatched yet
    Idle,
    /// Dispatching targets
    Running,
    /// Request budget spent; waiting for in-flight pages, remaining targets discarded
    Draining,
    /// Frontier ran dry before the budget was spent
    Exhausted,
    /// Report produced
    Completed,
}

/// Message sent by a worker when its page is done
struct Completion {
    target: CrawlTarget,
    outcome: Result<PageSuccess, CrawlError>,
}

pub struct CrawlScheduler {
    job: CrawlJob,
    pool: Arc<SessionPool>,
    processor: Arc<PageProcessor>,
    filter: LinkFilter,
    frontier: Frontier,
    aggregator: ResultAggregator,
    state: SchedulerState,
    /// State the job was in before completing
    finished_as: Option<SchedulerState>,

    /// Targets handed to workers, retries included
    dispatched: usize,
    /// Targets ever accepted into the frontier, seeds included
    enqueued: usize,
    /// Retries waiting in the frontier; each holds one unit of request budget
    pending_retries: usize,
    in_flight: usize,
    /// Targets thrown away when the budget ran out
    discarded: usize,
}

impl CrawlScheduler {
    /// Seed the frontier for `job`. Seeds beyond the request budget are dropped.
    pub fn new(job: CrawlJob, pool: Arc<SessionPool>, filter: LinkFilter) -> Self {
        let mut frontier = Frontier::new(job.max_depth, job.options.dedupe);
        let mut enqueued = 0;

        for target in job.seed_targets() {
            if enqueued >= job.max_requests {
                debug!("Request budget covers only {} seeds, dropping {}", job.max_requests, target.url);
                continue;
            }
            if frontier.push(target) {
                enqueued += 1;
            }
        }

        Self {
            processor: Arc::new(PageProcessor::for_job(&job)),
            job,
            pool,
            filter,
            frontier,
            aggregator: ResultAggregator::new(),
            state: SchedulerState::Idle,
            finished_as: None,
            dispatched: 0,
            enqueued,
            pending_retries: 0,
            in_flight: 0,
            discarded: 0,
        }
    }

    /// Whether the job ended by spending its budget (`Draining`) or by
    /// running out of targets (`Exhausted`)
    pub fn finished_as(&self) -> Option<SchedulerState> {
        self.finished_as
    }

    /// Run the job to completion.
    ///
    /// Page-level failures end up in the report, and so does every target
    /// left queued when the pool can no longer lend a session. In-flight
    /// pages always finish before the report is produced.
    pub async fn run(&mut self) -> Result<CrawlReport, CrawlError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Completion>();

        info!(
            "Starting crawl job {} with {} seeds (maxRequests={}, maxDepth={}, maxConcurrency={})",
            self.job.id,
            self.job.seeds.len(),
            self.job.max_requests,
            self.job.max_depth,
            self.job.options.max_concurrency
        );
        self.transition(SchedulerState::Running);

        loop {
            while let Ok(done) = rx.try_recv() {
                self.complete(done).await;
            }

            if self.state == SchedulerState::Running && self.dispatched >= self.job.max_requests {
                self.transition(SchedulerState::Draining);
                self.discarded = self.frontier.clear();
                if self.discarded > 0 {
                    info!("Request budget reached, discarding {} queued targets", self.discarded);
                }
            }

            if self.state == SchedulerState::Running && !self.frontier.is_empty() {
                // Suspends here while every session is busy
                match self.pool.acquire().await {
                    Ok(session) => {
                        if let Some(target) = self.frontier.pop() {
                            self.dispatch(target, session, tx.clone());
                        }
                    }
                    Err(e) => self.abandon_queue(&e).await,
                }
                continue;
            }

            if self.in_flight > 0 {
                match rx.recv().await {
                    Some(done) => self.complete(done).await,
                    None => break,
                }
                continue;
            }

            if self.state == SchedulerState::Running {
                self.transition(SchedulerState::Exhausted);
            }
            break;
        }

        self.finished_as = Some(self.state);
        self.transition(SchedulerState::Completed);

        let report = self.aggregator.clone().finalize().await;
        info!(
            "Crawl job {} completed: {} pages ({} succeeded, {} failed, {} discarded) in {:.2}s",
            self.job.id,
            report.stats.requests_total,
            report.stats.succeeded,
            report.stats.failed,
            self.discarded,
            report.stats.crawl_duration
        );

        Ok(report)
    }

    fn transition(&mut self, next: SchedulerState) {
        debug!("Crawl job {}: {:?} -> {:?}", self.job.id, self.state, next);
        self.state = next;
    }

    fn dispatch(&mut self, target: CrawlTarget, mut session: PooledSession, tx: mpsc::UnboundedSender<Completion>) {
        if target.retry_count > 0 {
            self.pending_retries = self.pending_retries.saturating_sub(1);
        }
        self.dispatched += 1;
        self.in_flight += 1;

        debug!(
            "Dispatching {} (depth {}, attempt {}, {}/{})",
            target.url,
            target.depth,
            target.retry_count + 1,
            self.dispatched,
            self.job.max_requests
        );

        let processor = Arc::clone(&self.processor);
        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(processor.try_process(&mut *session, &target))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(CrawlError::extraction("page handler panicked")));

            // Hand the session back before reporting so the next dispatch can take it
            drop(session);
            let _ = tx.send(Completion { target, outcome });
        });
    }

    /// Record every queued target as failed with `error` and stop dispatching
    async fn abandon_queue(&mut self, error: &CrawlError) {
        warn!("No session available for crawl job {}: {}", self.job.id, error);
        self.transition(SchedulerState::Draining);
        while let Some(target) = self.frontier.pop() {
            self.aggregator.record(PageResult::failure(&target, error)).await;
        }
        self.pending_retries = 0;
    }

    async fn complete(&mut self, done: Completion) {
        self.in_flight -= 1;
        let Completion { target, outcome } = done;

        match outcome {
            Ok(page) => {
                debug!("Crawled {} ({} links)", page.url, page.links.len());
                if self.state == SchedulerState::Running {
                    self.enqueue_links(&target, &page);
                }
                self.aggregator.record(PageResult::Success(page)).await;
            }
            Err(e) if self.should_retry(&target, &e) => {
                warn!(
                    "Retrying {} after error (attempt {} of {}): {}",
                    target.url,
                    target.retry_count + 1,
                    self.job.options.max_request_retries + 1,
                    e
                );
                self.pending_retries += 1;
                self.frontier.requeue(target.retried());
            }
            Err(e) => {
                warn!("Error crawling {}: {}", target.url, e);
                self.aggregator.record(PageResult::failure(&target, &e)).await;
            }
        }
    }

    fn should_retry(&self, target: &CrawlTarget, error: &CrawlError) -> bool {
        error.is_transient()
            && self.state == SchedulerState::Running
            && target.retry_count < self.job.options.max_request_retries
            && self.dispatched + self.pending_retries < self.job.max_requests
    }

    fn enqueue_links(&mut self, target: &CrawlTarget, page: &PageSuccess) {
        if target.depth >= self.job.max_depth {
            return;
        }

        for link in &page.links {
            if self.enqueued >= self.job.max_requests {
                debug!("Request budget fully enqueued, not following more links from {}", target.url);
                break;
            }
            if !self.filter.should_follow(&target.url, &link.url) {
                continue;
            }
            if self.frontier.push(target.child(link.url.as_str())) {
                self.enqueued += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::testing::{FakeFactory, FakeSite};
    use crate::crawler::task::CrawlOptions;
    use std::time::Duration;

    fn options(max_concurrency: usize) -> CrawlOptions {
        CrawlOptions {
            navigation_timeout_secs: 5,
            request_handler_timeout_secs: 5,
            max_concurrency,
            ..CrawlOptions::default()
        }
    }

    async fn scheduler_for(
        site: &FakeSite,
        seeds: &[&str],
        max_requests: usize,
        max_depth: u32,
        options: CrawlOptions,
    ) -> CrawlScheduler {
        let job = CrawlJob::new(seeds, max_requests, max_depth, options).unwrap();
        let pool = SessionPool::connect(Arc::new(FakeFactory::new(site.clone())), job.options.max_concurrency)
            .await
            .unwrap();
        CrawlScheduler::new(job, pool, LinkFilter::default())
    }

    #[tokio::test]
    async fn test_single_seed_without_children() {
        let site = FakeSite::new();
        site.page("https://example.com/").links(&["https://example.com/a", "https://example.com/b"]);
        site.page("https://example.com/a");

        let mut scheduler = scheduler_for(&site, &["https://example.com"], 1, 0, options(2)).await;
        assert_eq!(scheduler.state, SchedulerState::Idle);

        let report = scheduler.run().await.unwrap();

        assert_eq!(report.pages.len(), 1);
        assert_eq!(report.stats.requests_total, 1);
        assert_eq!(report.pages[0].url(), "https://example.com/");
        assert!(report.pages[0].is_success());
        assert_eq!(site.visits("https://example.com/a"), 0);
        assert_eq!(scheduler.state, SchedulerState::Completed);
        assert_eq!(scheduler.finished_as(), Some(SchedulerState::Draining));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_child_is_recorded_as_failure() {
        let site = FakeSite::new();
        site.page("https://example.com/").links(&[
            "https://example.com/one",
            "https://example.com/two",
            "https://example.com/three",
            "https://example.com/slow",
        ]);
        site.page("https://example.com/one");
        site.page("https://example.com/two");
        site.page("https://example.com/three");
        site.page("https://example.com/slow").delay(Duration::from_secs(120));

        let mut scheduler = scheduler_for(&site, &["https://example.com"], 10, 1, options(2)).await;
        let report = scheduler.run().await.unwrap();

        assert_eq!(report.stats.requests_total, 5);
        assert_eq!(report.stats.succeeded, 4);
        assert_eq!(report.stats.failed, 1);

        let failure = report.pages.iter().find(|page| !page.is_success()).unwrap();
        assert_eq!(failure.url(), "https://example.com/slow");
        assert_eq!(failure.depth(), 1);

        // One retry of the timed-out page
        assert_eq!(site.visits("https://example.com/slow"), 2);
        assert_eq!(scheduler.finished_as(), Some(SchedulerState::Exhausted));
    }

    #[tokio::test]
    async fn test_request_budget_bounds_report() {
        let site = FakeSite::new();
        let links: Vec<String> = (0..15).map(|i| format!("https://example.com/{}", i)).collect();
        let link_refs: Vec<&str> = links.iter().map(String::as_str).collect();
        site.page("https://example.com/").links(&link_refs);
        for link in &links {
            site.page(link);
        }

        let mut scheduler = scheduler_for(&site, &["https://example.com"], 4, 1, options(2)).await;
        let report = scheduler.run().await.unwrap();

        assert_eq!(report.stats.requests_total, 4);
        assert_eq!(site.total_visits(), 4);
        assert_eq!(scheduler.finished_as(), Some(SchedulerState::Draining));
        // Children 3..15 were never enqueued, so nothing was left to discard
        assert_eq!(scheduler.discarded, 0);
    }

    #[tokio::test]
    async fn test_depth_bound() {
        let site = FakeSite::new();
        site.page("https://example.com/").links(&["https://example.com/1"]);
        site.page("https://example.com/1").links(&["https://example.com/2"]);
        site.page("https://example.com/2").links(&["https://example.com/3"]);
        site.page("https://example.com/3");

        let mut scheduler = scheduler_for(&site, &["https://example.com"], 50, 2, options(2)).await;
        let report = scheduler.run().await.unwrap();

        assert_eq!(report.stats.requests_total, 3);
        assert!(report.pages.iter().all(|page| page.depth() <= 2));
        assert_eq!(site.visits("https://example.com/3"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_never_exceeds_limit() {
        let site = FakeSite::new();
        let links: Vec<String> = (0..10).map(|i| format!("https://example.com/{}", i)).collect();
        let link_refs: Vec<&str> = links.iter().map(String::as_str).collect();
        site.page("https://example.com/").links(&link_refs);
        for (i, link) in links.iter().enumerate() {
            site.page(link).delay(Duration::from_millis(100 + 37 * i as u64));
        }

        let mut scheduler = scheduler_for(&site, &["https://example.com"], 50, 1, options(3)).await;
        let report = scheduler.run().await.unwrap();

        assert_eq!(report.stats.requests_total, 11);
        assert_eq!(site.peak_concurrent(), 3);
        assert!(scheduler.pool.peak_active() <= 3);
    }

    #[tokio::test]
    async fn test_flaky_page_succeeds_on_retry() {
        let site = FakeSite::new();
        site.page("https://example.com/").flaky(1);

        let mut scheduler = scheduler_for(&site, &["https://example.com"], 10, 0, options(1)).await;
        let report = scheduler.run().await.unwrap();

        assert_eq!(report.stats.requests_total, 1);
        assert!(report.pages[0].is_success());
        assert_eq!(site.visits("https://example.com/"), 2);
    }

    #[tokio::test]
    async fn test_retry_needs_request_budget() {
        let site = FakeSite::new();
        site.page("https://example.com/").flaky(1);

        let mut scheduler = scheduler_for(&site, &["https://example.com"], 1, 0, options(1)).await;
        let report = scheduler.run().await.unwrap();

        assert_eq!(report.stats.requests_total, 1);
        assert_eq!(report.stats.failed, 1);
        assert_eq!(site.visits("https://example.com/"), 1);
    }

    #[tokio::test]
    async fn test_extraction_errors_are_not_retried() {
        let site = FakeSite::new();
        site.page("https://example.com/").links(&["https://example.com/broken", "https://example.com/ok"]);
        site.page("https://example.com/broken").broken_extraction();
        site.page("https://example.com/ok");

        let mut scheduler = scheduler_for(&site, &["https://example.com"], 10, 1, options(2)).await;
        let report = scheduler.run().await.unwrap();

        assert_eq!(report.stats.requests_total, 3);
        assert_eq!(report.stats.failed, 1);
        assert_eq!(site.visits("https://example.com/broken"), 1);
    }

    #[tokio::test]
    async fn test_revisits_unless_dedupe() {
        let site = FakeSite::new();
        site.page("https://example.com/").links(&["https://example.com/a", "https://example.com/b"]);
        site.page("https://example.com/a").links(&["https://example.com/", "https://example.com/b"]);
        site.page("https://example.com/b");

        let mut revisiting = scheduler_for(&site, &["https://example.com"], 10, 2, options(1)).await;
        let report = revisiting.run().await.unwrap();
        assert_eq!(report.stats.requests_total, 5);

        let deduped_site = FakeSite::new();
        deduped_site.page("https://example.com/").links(&["https://example.com/a", "https://example.com/b"]);
        deduped_site.page("https://example.com/a").links(&["https://example.com/", "https://example.com/b"]);
        deduped_site.page("https://example.com/b");

        let dedupe = CrawlOptions { dedupe: true, ..options(1) };
        let mut deduped = scheduler_for(&deduped_site, &["https://example.com"], 10, 2, dedupe).await;
        let report = deduped.run().await.unwrap();
        assert_eq!(report.stats.requests_total, 3);
        assert_eq!(deduped_site.visits("https://example.com/"), 1);
    }

    #[tokio::test]
    async fn test_offsite_links_not_followed() {
        let site = FakeSite::new();
        site.page("https://example.com/").links(&["https://other.test/", "https://example.com/a"]);
        site.page("https://example.com/a");
        site.page("https://other.test/");

        let mut scheduler = scheduler_for(&site, &["https://example.com"], 10, 1, options(2)).await;
        let report = scheduler.run().await.unwrap();

        assert_eq!(report.stats.requests_total, 2);
        assert_eq!(site.visits("https://other.test/"), 0);
    }

    #[tokio::test]
    async fn test_every_page_failing_still_reports() {
        let site = FakeSite::new();

        let mut scheduler = scheduler_for(&site, &["https://a.test", "https://b.test"], 10, 1, options(2)).await;
        let report = scheduler.run().await.unwrap();

        assert_eq!(report.stats.requests_total, 2);
        assert_eq!(report.stats.failed, 2);
        assert!(report.pages.iter().all(|page| !page.is_success()));
    }

    #[tokio::test]
    async fn test_refused_extra_session_keeps_the_report() {
        let site = FakeSite::new();
        site.page("https://example.com/").links(&["https://example.com/a", "https://example.com/b"]);
        site.page("https://example.com/a");
        site.page("https://example.com/b");

        let job = CrawlJob::new(&["https://example.com"], 10, 1, options(2)).unwrap();
        let pool = SessionPool::connect(Arc::new(FakeFactory::limited(site.clone(), 1)), 2)
            .await
            .unwrap();
        let mut scheduler = CrawlScheduler::new(job, Arc::clone(&pool), LinkFilter::default());

        let report = scheduler.run().await.unwrap();

        assert_eq!(report.stats.requests_total, 3);
        assert_eq!(report.stats.succeeded, 3);
        assert_eq!(site.visits("https://example.com/a"), 1);
        assert_eq!(site.visits("https://example.com/b"), 1);
        assert_eq!(pool.created(), 1);
        assert_eq!(pool.capacity(), 1);

        pool.shutdown().await;
        assert_eq!(site.closed_sessions(), 1);
    }

    #[tokio::test]
    async fn test_closed_pool_fails_queued_targets() {
        let site = FakeSite::new();
        site.page("https://a.test/");
        site.page("https://b.test/");

        let job = CrawlJob::new(&["https://a.test", "https://b.test"], 10, 1, options(2)).unwrap();
        let pool = SessionPool::connect(Arc::new(FakeFactory::new(site.clone())), 2).await.unwrap();
        pool.shutdown().await;
        let mut scheduler = CrawlScheduler::new(job, pool, LinkFilter::default());

        let report = scheduler.run().await.unwrap();

        assert_eq!(report.stats.requests_total, 2);
        assert_eq!(report.stats.failed, 2);
        assert_eq!(site.total_visits(), 0);
        assert_eq!(scheduler.finished_as(), Some(SchedulerState::Draining));
    }
}

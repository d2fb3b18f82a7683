//! Resumable bulk sitemap import
//!
//! A job never runs as a loop in memory. Each invocation of
//! [`SyncOrchestrator::process_import_batch`] reads the job from the node
//! state, works through one batch of URLs, persists progress after every
//! URL and schedules its own continuation. A restart between batches loses
//! nothing; a restart inside a batch repeats at most that batch's
//! unfinished URL, which the dedup path turns into an update.

use chrono::Utc;
use serde_json::json;

use super::{PulledItem, SyncOrchestrator, SITEMAP_IMPORT_BATCH};
use crate::crawler::UrlFilter;
use crate::error::{Error, Result, ValidationError};
use crate::models::{
    ImportBatchOutcome, ImportJob, ImportProgress, ImportStart, NodeState, SourceType,
    SyncAction,
};
use crate::scheduler::ScheduledTask;

impl SyncOrchestrator {
    /// Start importing every article URL of a sitemap for `node_id`
    ///
    /// The sitemap is fetched and filtered up front; the pages themselves
    /// are processed later by scheduled batches.
    ///
    /// # Errors
    ///
    /// [`Error::JobAlreadyRunning`] when the node already has an import in
    /// flight, fetch and parse errors of the sitemap, and
    /// [`Error::NoUrlsFound`] when nothing survives the URL filter.
    pub async fn start_sitemap_import(&self, node_id: &str, sitemap_url: &str) -> Result<ImportStart> {
        if !self.states.try_claim_import(node_id)? {
            tracing::warn!(node_id = %node_id, "Import already in progress");
            return Err(Error::JobAlreadyRunning {
                node_id: node_id.to_string(),
            });
        }

        match self.prepare_import(node_id, sitemap_url).await {
            Ok(start) => Ok(start),
            Err(e) => {
                self.states.update(node_id, &mut |s: &mut NodeState| {
                    s.import_in_progress = false;
                })?;
                Err(e)
            }
        }
    }

    async fn prepare_import(&self, node_id: &str, sitemap_url: &str) -> Result<ImportStart> {
        let state = self.states.load_or_default(node_id)?;
        let filter = UrlFilter::for_node(&state);
        let crawl = self.sitemaps.crawl(sitemap_url, &filter).await?;

        let mut stats = Some(crawl.stats);
        self.states.update(node_id, &mut |s: &mut NodeState| {
            if let Some(stats) = stats.take() {
                s.last_filter_stats = Some(stats);
            }
        })?;

        if crawl.accepted.is_empty() {
            return Err(Error::NoUrlsFound {
                sitemap_url: sitemap_url.to_string(),
            });
        }

        let job = ImportJob::new(crawl.accepted.len());
        let start = ImportStart {
            job_id: job.job_id.clone(),
            total_urls: job.total_items,
        };

        let mut pending = Some((job, crawl.accepted));
        self.states.update(node_id, &mut |s: &mut NodeState| {
            if let Some((job, urls)) = pending.take() {
                s.import_job = Some(job);
                s.import_urls = urls;
                s.sitemap_url = Some(sitemap_url.to_string());
            }
        })?;

        self.schedule_batch(node_id).await?;

        tracing::info!(
            node_id = %node_id,
            job_id = %start.job_id,
            total_urls = start.total_urls,
            sitemap_url = %sitemap_url,
            "Sitemap import started"
        );
        Ok(start)
    }

    async fn schedule_batch(&self, node_id: &str) -> Result<()> {
        let task = ScheduledTask::after(
            SITEMAP_IMPORT_BATCH,
            json!({ "node_id": node_id }),
            self.config.import.continuation_delay(),
        );
        self.tasks.schedule_unique(task).await?;
        Ok(())
    }

    /// Run one batch of a node's import job
    ///
    /// Resumes at `processed_items`. A node without a job record is idle:
    /// leftover flags are cleared and nothing else happens.
    pub async fn process_import_batch(&self, node_id: &str) -> Result<ImportBatchOutcome> {
        let state = self.states.load_or_default(node_id)?;

        let Some(mut job) = state.import_job.clone().filter(|j| j.is_importing) else {
            if state.import_in_progress || !state.import_urls.is_empty() {
                self.release_import(node_id)?;
                tracing::debug!(node_id = %node_id, "No import job, cleared leftover flags");
            }
            return Ok(ImportBatchOutcome::Idle);
        };

        if state.import_urls.is_empty() {
            self.release_import(node_id)?;
            return Ok(ImportBatchOutcome::Idle);
        }

        let start = job.processed_items.min(state.import_urls.len());
        let end = (start + self.config.import.batch_size).min(state.import_urls.len());

        for url in &state.import_urls[start..end] {
            job.begin(url);
            if !self.persist_job(node_id, &job)? {
                tracing::info!(node_id = %node_id, job_id = %job.job_id, "Import reset mid-batch");
                return Ok(ImportBatchOutcome::Idle);
            }

            let succeeded = match self.import_page(node_id, url).await {
                Ok(action) => {
                    tracing::debug!(node_id = %node_id, url = %url, action = ?action, "Page imported");
                    true
                }
                Err(e) => {
                    let error_type = match &e {
                        Error::Fetch(_) => "sitemap_fetch_failed",
                        _ => "post_creation_failed",
                    };
                    self.note_error(
                        node_id,
                        error_type,
                        &format!("Failed to import page: {e}"),
                        json!({ "url": url, "job_id": job.job_id }),
                    );
                    false
                }
            };

            job.advance(succeeded);
            if !self.persist_job(node_id, &job)? {
                return Ok(ImportBatchOutcome::Idle);
            }
        }

        if job.is_complete() || end >= state.import_urls.len() {
            job.finish();
            let mut finished = Some(job.clone());
            self.states.update(node_id, &mut |s: &mut NodeState| {
                s.import_job = finished.take();
                s.import_in_progress = false;
                s.import_urls.clear();
            })?;

            tracing::info!(
                node_id = %node_id,
                job_id = %job.job_id,
                total = job.total_items,
                success = job.success_count,
                errors = job.error_count,
                "Sitemap import completed"
            );
            return Ok(ImportBatchOutcome::Completed { job });
        }

        self.schedule_batch(node_id).await?;
        tracing::info!(
            node_id = %node_id,
            job_id = %job.job_id,
            processed = job.processed_items,
            total = job.total_items,
            progress = job.progress_percent,
            "Import batch done, continuation scheduled"
        );
        Ok(ImportBatchOutcome::Continued {
            processed_items: job.processed_items,
            total_items: job.total_items,
        })
    }

    /// Write `job` back unless the node's job was reset or replaced
    fn persist_job(&self, node_id: &str, job: &ImportJob) -> Result<bool> {
        let mut written = false;
        self.states.update(node_id, &mut |s: &mut NodeState| {
            let same_job = s
                .import_job
                .as_ref()
                .is_some_and(|current| current.job_id == job.job_id && current.is_importing);
            if same_job {
                s.import_job = Some(job.clone());
                written = true;
            }
        })?;
        Ok(written)
    }

    fn release_import(&self, node_id: &str) -> Result<()> {
        self.states.update(node_id, &mut |s: &mut NodeState| {
            s.import_in_progress = false;
            s.import_urls.clear();
        })?;
        Ok(())
    }

    async fn import_page(&self, node_id: &str, url: &str) -> Result<SyncAction> {
        let html = self.fetcher.get_text(url).await?;
        let extracted = self.extractor.extract_from_html(url, &html);

        let pulled = PulledItem {
            source_type: SourceType::Sitemap,
            source_url: url.to_string(),
            guid: None,
            title: extracted.title,
            body: extracted.content,
            excerpt: extracted.excerpt,
            publish_date: None,
            featured_image_url: extracted.featured_image_url,
        };
        let (_, action) = self.upsert_pulled(node_id, pulled).await?;
        Ok(action)
    }

    /// Snapshot of a node's import job for status pollers
    pub fn get_import_progress(&self, node_id: &str) -> Result<ImportProgress> {
        let state = self.states.load_or_default(node_id)?;
        let threshold = self.config.import.stuck_threshold();
        let is_stuck = state.import_in_progress
            && state
                .import_job
                .as_ref()
                .is_some_and(|job| job.is_stuck(Utc::now(), threshold));

        Ok(ImportProgress {
            job: state.import_job,
            in_progress: state.import_in_progress,
            is_stuck,
        })
    }

    /// Operator reset: clear all import bookkeeping and pending batches
    pub async fn reset_import_job(&self, node_id: &str) -> Result<()> {
        self.states.update(node_id, &mut |s: &mut NodeState| s.clear_import())?;
        let cancelled = self
            .tasks
            .cancel(SITEMAP_IMPORT_BATCH, "node_id", node_id)
            .await?;
        tracing::info!(node_id = %node_id, cancelled, "Import job reset");
        Ok(())
    }

    /// Refetch one stored item's page and update it if it changed
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown item, [`Error::Validation`] when
    /// `source_url` is not the item's source, and fetch errors.
    pub async fn resync_single_item(&self, item_id: &str, source_url: &str) -> Result<SyncAction> {
        let item = self
            .store
            .get(item_id)?
            .ok_or_else(|| Error::not_found("item", item_id))?;

        if item.source_url != source_url {
            return Err(ValidationError::InvalidUrl {
                field: "source_url",
                value: source_url.to_string(),
            }
            .into());
        }

        let html = self.fetcher.get_text(source_url).await?;
        let extracted = self.extractor.extract_from_html(source_url, &html);

        let pulled = PulledItem {
            source_type: item.source_type,
            source_url: item.source_url.clone(),
            guid: item.guid.clone(),
            title: extracted.title,
            body: extracted.content,
            excerpt: extracted.excerpt,
            publish_date: None,
            featured_image_url: extracted.featured_image_url,
        };
        let node_id = item.node_id.clone();
        let (_, action) = self.write_pulled(&node_id, Some(item), pulled).await?;

        tracing::info!(item_id = %item_id, url = %source_url, action = ?action, "Item resynced");
        Ok(action)
    }
}

//! Daily maintenance and the scheduled task runner

use chrono::{DateTime, Utc};

use super::{SyncOrchestrator, SITEMAP_IMPORT_BATCH};
use crate::error::Result;
use crate::models::{NodeState, PatrolReport, SyncMode, TaskRunReport};
use crate::scheduler::{ScheduledTask, SchedulerError};

impl SyncOrchestrator {
    /// Daily pass over pull-mode nodes
    ///
    /// Prunes old error-log entries, drops finished import records past
    /// retention and re-checks feed health.
    pub async fn run_daily_patrol(&self, now: DateTime<Utc>) -> Result<PatrolReport> {
        let mut report = PatrolReport::default();
        let error_cutoff = now - self.config.error_log.retention();
        let import_cutoff = now - self.config.import.status_retention();

        for state in self.states.list()? {
            if state.sync_mode != SyncMode::Pull {
                continue;
            }
            report.nodes_checked += 1;

            let mut pruned = 0;
            let mut dropped = false;
            self.states.update(&state.node_id, &mut |s: &mut NodeState| {
                pruned = s.prune_errors(error_cutoff);

                let expired = s
                    .import_job
                    .as_ref()
                    .is_some_and(|job| !job.is_importing && job.last_update_at < import_cutoff);
                if expired && !s.import_in_progress {
                    s.import_job = None;
                    dropped = true;
                }
            })?;
            report.errors_pruned += pruned;
            if dropped {
                report.import_records_dropped += 1;
            }

            if state.rss_url.as_deref().is_some_and(|u| !u.trim().is_empty()) {
                match self.check_feed_health(&state.node_id).await {
                    Ok(health) if !health.is_healthy => report.unhealthy_feeds += 1,
                    Ok(_) => {}
                    Err(e) => {
                        report.unhealthy_feeds += 1;
                        tracing::warn!(node_id = %state.node_id, error = %e, "Health check could not run");
                    }
                }
            }
        }

        tracing::info!(
            nodes = report.nodes_checked,
            errors_pruned = report.errors_pruned,
            imports_dropped = report.import_records_dropped,
            unhealthy = report.unhealthy_feeds,
            "Daily patrol completed"
        );
        Ok(report)
    }

    /// Run every queued task due at `now`
    ///
    /// Each task is removed from the queue before it runs. A failing task
    /// is logged and counted; it does not stop the others.
    pub async fn run_due_tasks(&self, now: DateTime<Utc>) -> Result<TaskRunReport> {
        let mut report = TaskRunReport::default();

        for task in self.tasks.take_due(now).await? {
            match self.dispatch(&task).await {
                Ok(()) => report.ran += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        task_id = %task.id,
                        handler = %task.handler,
                        error = %e,
                        "Scheduled task failed"
                    );
                }
            }
        }

        if report.ran + report.failed > 0 {
            tracing::info!(ran = report.ran, failed = report.failed, "Due tasks processed");
        }
        Ok(report)
    }

    async fn dispatch(&self, task: &ScheduledTask) -> Result<()> {
        match task.handler.as_str() {
            SITEMAP_IMPORT_BATCH => {
                let node_id = task.arg_str("node_id")?;
                self.process_import_batch(node_id).await?;
                Ok(())
            }
            other => Err(SchedulerError::unknown_handler(other).into()),
        }
    }
}

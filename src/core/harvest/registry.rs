use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use super::can_transition;
use super::types::{HarvestJob, HarvestPhase};

/// Shared, injected job table. One coarse lock serializes every reader
/// and writer; each critical section is O(1) except the retention sweep
/// at create time.
#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<Mutex<HashMap<String, HarvestJob>>>,
    finished_retention: usize,
}

impl JobRegistry {
    pub fn new(finished_retention: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            finished_retention,
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, HarvestJob>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn create(&self, job: HarvestJob) {
        let mut table = self.table();
        evict_finished(&mut table, self.finished_retention);
        table.insert(job.job_id.clone(), job);
    }

    pub fn get(&self, job_id: &str) -> Option<HarvestJob> {
        self.table().get(job_id).cloned()
    }

    /// Applies `f` only if the record still exists; late callbacks after
    /// eviction become no-ops.
    pub fn mutate<F: FnOnce(&mut HarvestJob)>(&self, job_id: &str, f: F) -> bool {
        let mut table = self.table();
        match table.get_mut(job_id) {
            Some(job) => {
                f(job);
                true
            }
            None => false,
        }
    }

    /// Phase-entry write: the new phase plus its floor progress. Terminal
    /// phases and out-of-order entries are never overwritten.
    pub fn enter_phase(&self, job_id: &str, phase: HarvestPhase) -> bool {
        self.mutate(job_id, |job| {
            if job.phase == phase {
                return;
            }
            if !can_transition(job.phase, phase) {
                warn!(
                    "[{}] ignoring phase write {} -> {}",
                    job.job_id,
                    job.phase.as_str(),
                    phase.as_str()
                );
                return;
            }
            job.phase = phase;
            job.progress = phase.progress_range().0;
            if phase == HarvestPhase::Completed {
                job.completed_at = Some(Utc::now());
            }
        })
    }

    /// Monotonic within the current phase: only advances, and only while
    /// the job is still in `phase`.
    pub fn set_progress(&self, job_id: &str, phase: HarvestPhase, progress: u8) -> bool {
        self.mutate(job_id, |job| {
            if job.phase == phase && progress > job.progress {
                job.progress = progress;
            }
        })
    }

    pub fn record_response(&self, job_id: &str, phase: HarvestPhase, payload: Value) -> bool {
        self.mutate(job_id, |job| {
            job.phase_responses.insert(phase.as_str().to_string(), payload);
        })
    }

    pub fn fail(&self, job_id: &str, error: &str) -> bool {
        self.mutate(job_id, |job| {
            if job.phase.is_terminal() {
                return;
            }
            job.phase = HarvestPhase::Failed;
            job.error = Some(error.to_string());
            job.failed_at = Some(Utc::now());
        })
    }
}

/// Drops the oldest finished jobs beyond the retention bound. Active
/// jobs are never evicted.
fn evict_finished(table: &mut HashMap<String, HarvestJob>, retention: usize) {
    let mut finished: Vec<(DateTime<Utc>, String)> = table
        .values()
        .filter(|job| job.phase.is_terminal())
        .map(|job| (job.finished_at().unwrap_or(job.started_at), job.job_id.clone()))
        .collect();
    if finished.len() <= retention {
        return;
    }
    finished.sort();
    for (_, job_id) in finished.iter().take(finished.len() - retention) {
        table.remove(job_id);
    }
}

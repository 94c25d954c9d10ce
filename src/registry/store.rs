use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::error::{RegistryError, Result};
use super::keys::{JobSpec, OutputFormat};
use crate::progress::ProgressBus;

/// Lifecycle status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Downloading,
    Transcoding,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

#[derive(Debug)]
struct JobState {
    status: JobStatus,
    output_filename: Option<String>,
    updated_at: DateTime<Utc>,
}

/// A registered job: its spec, event bus, cancel token and mutable status
#[derive(Debug)]
pub struct JobEntry {
    spec: JobSpec,
    bus: Arc<ProgressBus>,
    cancel: CancellationToken,
    created_at: DateTime<Utc>,
    state: RwLock<JobState>,
}

impl JobEntry {
    fn new(spec: JobSpec) -> Self {
        let now = Utc::now();
        Self {
            bus: Arc::new(ProgressBus::new(spec.key.clone())),
            spec,
            cancel: CancellationToken::new(),
            created_at: now,
            state: RwLock::new(JobState {
                status: JobStatus::Pending,
                output_filename: None,
                updated_at: now,
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.spec.key
    }

    pub fn spec(&self) -> &JobSpec {
        &self.spec
    }

    pub fn bus(&self) -> &Arc<ProgressBus> {
        &self.bus
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn status(&self) -> JobStatus {
        self.state.read().status
    }

    pub fn output_filename(&self) -> Option<String> {
        self.state.read().output_filename.clone()
    }

    /// True once the status is terminal or a terminal event was recorded
    pub fn is_finished(&self) -> bool {
        self.status().is_terminal() || self.bus.is_terminal()
    }

    pub fn set_status(&self, status: JobStatus) {
        let mut state = self.state.write();
        // Terminal statuses are final
        if state.status.is_terminal() {
            return;
        }
        debug!(key = %self.spec.key, from = ?state.status, to = ?status, "Job status changed");
        state.status = status;
        state.updated_at = Utc::now();
    }

    /// Record the published file and mark the job completed
    pub fn complete(&self, filename: impl Into<String>) {
        let mut state = self.state.write();
        if state.status.is_terminal() {
            return;
        }
        state.output_filename = Some(filename.into());
        state.status = JobStatus::Completed;
        state.updated_at = Utc::now();
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let state = self.state.read();
        JobSnapshot {
            key: self.spec.key.clone(),
            url: self.spec.url.to_string(),
            format: self.spec.format,
            selector: self.spec.selector.clone(),
            status: state.status,
            output_filename: state.output_filename.clone(),
            created_at: self.created_at,
            updated_at: state.updated_at,
            event_count: self.bus.len(),
        }
    }
}

/// Point-in-time view of a job as exposed by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub key: String,
    pub url: String,
    pub format: OutputFormat,
    pub selector: String,
    pub status: JobStatus,
    pub output_filename: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub event_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub total: usize,
    pub active: usize,
    pub finished: usize,
}

/// Process-wide map from job key to job
///
/// Lookups and insertions happen under one short lock, which makes
/// [`JobRegistry::get_or_create`] single-flight per key.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<String, Arc<JobEntry>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the live job for `spec.key`, or register a fresh one
    ///
    /// A finished job under the same key is replaced. The boolean is true
    /// when a new job was created and the caller must start it.
    pub fn get_or_create(&self, spec: JobSpec) -> (Arc<JobEntry>, bool) {
        let mut jobs = self.jobs.lock();
        if let Some(existing) = jobs.get(&spec.key) {
            if !existing.is_finished() {
                debug!(key = %spec.key, "Joining in-flight job");
                return (existing.clone(), false);
            }
        }

        let entry = Arc::new(JobEntry::new(spec));
        if jobs.insert(entry.key().to_string(), entry.clone()).is_some() {
            info!(key = %entry.key(), "Replacing finished job");
        }
        (entry, true)
    }

    pub fn get(&self, key: &str) -> Option<Arc<JobEntry>> {
        self.jobs.lock().get(key).cloned()
    }

    /// Request cooperative cancellation of a running job
    ///
    /// Only signals the job's token. A job past its last checkpoint still
    /// finishes with its own status, so callers read the outcome from the
    /// entry rather than from this returning `Ok`.
    pub fn cancel(&self, key: &str) -> Result<Arc<JobEntry>> {
        let entry = self
            .get(key)
            .ok_or_else(|| RegistryError::NotFound(key.to_string()))?;
        if entry.is_finished() {
            return Err(RegistryError::AlreadyFinished(key.to_string()));
        }

        info!(key, "Cancellation requested");
        entry.cancel.cancel();
        Ok(entry)
    }

    /// Drop finished jobs that nobody has touched for `ttl`; returns their keys
    pub fn evict_idle(&self, ttl: Duration) -> Vec<String> {
        let mut evicted = Vec::new();
        self.jobs.lock().retain(|key, entry| {
            let keep = !entry.is_finished() || entry.bus.idle_for() < ttl;
            if !keep {
                evicted.push(key.clone());
            }
            keep
        });

        if !evicted.is_empty() {
            info!(count = evicted.len(), "Evicted idle jobs");
        }
        evicted
    }

    pub fn stats(&self) -> RegistryStats {
        let jobs = self.jobs.lock();
        let finished = jobs.values().filter(|entry| entry.is_finished()).count();
        RegistryStats {
            total: jobs.len(),
            active: jobs.len() - finished,
            finished,
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Status records for queued and finished delivery jobs

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::delivery::{AttemptOutcome, DeliveryOutcome};
use crate::notification::NotificationRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Delivered,
    Failed,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }
}

/// One attempt as reported through the API
#[derive(Debug, Clone, Serialize)]
pub struct AttemptSummary {
    pub attempt: u32,
    pub result: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub delay_before_ms: u64,
    pub duration_ms: u64,
}

/// Serializable digest of a [`DeliveryOutcome`]
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeSummary {
    /// `delivered` or a failure code
    pub outcome: &'static str,
    pub attempts: u32,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub trace: Vec<AttemptSummary>,
}

impl From<&DeliveryOutcome> for OutcomeSummary {
    fn from(outcome: &DeliveryOutcome) -> Self {
        let trace = outcome
            .trace
            .iter()
            .map(|record| AttemptSummary {
                attempt: record.attempt_number,
                result: record.outcome.label(),
                error: match &record.outcome {
                    AttemptOutcome::Success => None,
                    AttemptOutcome::TransientFailure(e) | AttemptOutcome::PermanentFailure(e) => {
                        Some(e.to_string())
                    }
                },
                delay_before_ms: record.delay_before.as_millis() as u64,
                duration_ms: record.duration.as_millis() as u64,
            })
            .collect();

        Self {
            outcome: outcome.label(),
            attempts: outcome.attempts,
            elapsed_ms: outcome.elapsed.as_millis() as u64,
            message_id: outcome.receipt().and_then(|r| r.message_id.clone()),
            error: outcome.failure().map(|reason| reason.to_string()),
            trace,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub kind: String,
    pub recipient: String,
    pub status: JobStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<OutcomeSummary>,
}

impl JobRecord {
    /// Finished and older than `ttl`
    pub fn is_expired(&self, ttl: Duration) -> bool {
        let Some(finished_at) = self.finished_at else {
            return false;
        };
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return false;
        };
        Utc::now().signed_duration_since(finished_at) >= ttl
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub queued: usize,
    pub running: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Concurrent map of job id to status record
#[derive(Default)]
pub struct JobRegistry {
    jobs: DashMap<Uuid, JobRecord>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly queued job.
    ///
    /// Returns `false` without touching the map when a job with the same id
    /// is still queued or running. Finished records are replaced.
    pub fn insert_queued(&self, request: &NotificationRequest) -> bool {
        let record = JobRecord {
            id: request.id(),
            kind: request.kind().to_string(),
            recipient: request.recipient().to_string(),
            status: JobStatus::Queued,
            submitted_at: Utc::now(),
            started_at: None,
            finished_at: None,
            outcome: None,
        };

        match self.jobs.entry(record.id) {
            Entry::Occupied(existing) if !existing.get().status.is_finished() => false,
            Entry::Occupied(mut existing) => {
                existing.insert(record);
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    pub fn mark_running(&self, id: Uuid) {
        if let Some(mut record) = self.jobs.get_mut(&id) {
            record.status = JobStatus::Running;
            record.started_at = Some(Utc::now());
        }
    }

    pub fn complete(&self, id: Uuid, outcome: &DeliveryOutcome) {
        if let Some(mut record) = self.jobs.get_mut(&id) {
            record.status = if outcome.is_delivered() {
                JobStatus::Delivered
            } else {
                JobStatus::Failed
            };
            record.finished_at = Some(Utc::now());
            record.outcome = Some(OutcomeSummary::from(outcome));
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<JobRecord> {
        self.jobs.get(id).map(|r| r.clone())
    }

    pub fn remove(&self, id: &Uuid) -> Option<JobRecord> {
        self.jobs.remove(id).map(|(_, record)| record)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Remove finished records older than `ttl`, returning how many were removed
    pub fn cleanup_expired(&self, ttl: Duration) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|_, record| !record.is_expired(ttl));
        let removed = before.saturating_sub(self.jobs.len());

        if removed > 0 {
            tracing::debug!(removed, remaining = self.jobs.len(), "Expired job records removed");
        }

        removed
    }

    pub fn stats(&self) -> JobStats {
        let mut stats = JobStats::default();
        for record in self.jobs.iter() {
            match record.status {
                JobStatus::Queued => stats.queued += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Delivered => stats.delivered += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }
}

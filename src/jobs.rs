//! In-memory tracking of video generation jobs.
//!
//! A job is added as pending the moment a request is accepted and moves to
//! exactly one terminal state afterwards.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::model::GeneratedImage;

/// Shown in order while a job is pending, one step per interval, holding on
/// the last.
pub const PROGRESS_MESSAGES: &[&str] = &[
    "Contacting the video generation model...",
    "Your request is in the queue. This can take a few minutes.",
    "The AI is dreaming up your video...",
    "Rendering frames and compiling your clip...",
    "Almost there, adding the finishing touches...",
    "Still working on it, high-quality video takes time!",
];

const PROGRESS_STEP: Duration = Duration::from_secs(10);

pub type JobId = Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Completed { url: String },
    Failed { error: String },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoJob {
    pub id: JobId,
    pub prompt: String,
    pub source_image: Option<GeneratedImage>,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub state: JobState,
}

impl VideoJob {
    /// Progress text for a pending job, `None` once it has settled.
    pub fn progress_message(&self, now: DateTime<Utc>) -> Option<&'static str> {
        if self.state.is_terminal() {
            return None;
        }
        let elapsed = (now - self.created_at).to_std().unwrap_or_default();
        let step = (elapsed.as_secs() / PROGRESS_STEP.as_secs()) as usize;
        Some(PROGRESS_MESSAGES[step.min(PROGRESS_MESSAGES.len() - 1)])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("video job {0} not found")]
    NotFound(JobId),

    #[error("video job {0} has already settled")]
    AlreadyTerminal(JobId),
}

/// Owns every video job; newest first.
#[derive(Debug, Default)]
pub struct JobTracker {
    jobs: RwLock<Vec<VideoJob>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pending_video_job(
        &self,
        prompt: &str,
        source_image: Option<GeneratedImage>,
    ) -> JobId {
        let job = VideoJob {
            id: Uuid::new_v4(),
            prompt: prompt.to_string(),
            source_image,
            created_at: Utc::now(),
            state: JobState::Pending,
        };
        let id = job.id;
        self.jobs.write().insert(0, job);
        tracing::debug!(job_id = %id, "video job pending");
        id
    }

    pub fn mark_completed(&self, id: JobId, url: String) -> Result<(), JobError> {
        self.settle(id, JobState::Completed { url })
    }

    pub fn mark_failed(&self, id: JobId, message: String) -> Result<(), JobError> {
        self.settle(id, JobState::Failed { error: message })
    }

    fn settle(&self, id: JobId, state: JobState) -> Result<(), JobError> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .iter_mut()
            .find(|job| job.id == id)
            .ok_or(JobError::NotFound(id))?;
        if job.state.is_terminal() {
            return Err(JobError::AlreadyTerminal(id));
        }
        job.state = state;
        Ok(())
    }

    pub fn get(&self, id: JobId) -> Option<VideoJob> {
        self.jobs.read().iter().find(|job| job.id == id).cloned()
    }

    pub fn list_jobs(&self) -> Vec<VideoJob> {
        self.jobs.read().clone()
    }

    pub fn pending_count(&self) -> usize {
        self.jobs
            .read()
            .iter()
            .filter(|job| !job.state.is_terminal())
            .count()
    }
}

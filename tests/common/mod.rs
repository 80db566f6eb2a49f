#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use broll_studio::client::{
    DownloadedMedia, GenerationBackend, GenerationClient, ImagePayload, OperationHandle,
    OperationStatus,
};
use broll_studio::config::PollPolicy;
use broll_studio::credential::{ApiKey, CredentialContext};
use broll_studio::error::{StudioError, StudioResult};
use broll_studio::jobs::{JobId, JobState, VideoJob};
use broll_studio::media::MediaStore;
use broll_studio::model::{ImageRequest, VideoRequest};
use broll_studio::preferences::PreferenceStore;
use broll_studio::studio::Studio;

pub const TEST_KEY: &str = "test-key";

/// Scripted stand-in for the remote service.
///
/// Video operations are named after their prompt; each operation replays its
/// script one status per poll and repeats the last status once exhausted.
#[derive(Default)]
pub struct FakeBackend {
    image_results: Mutex<VecDeque<StudioResult<Vec<ImagePayload>>>>,
    image_delay: Mutex<Option<Duration>>,
    text_results: Mutex<VecDeque<StudioResult<Option<String>>>>,
    text_delay: Mutex<Option<Duration>>,
    submit_errors: Mutex<HashMap<String, StudioError>>,
    operations: Mutex<HashMap<String, VecDeque<StudioResult<OperationStatus>>>>,
    stalled_operations: Mutex<HashSet<String>>,
    downloads: Mutex<HashMap<String, StudioResult<DownloadedMedia>>>,
    stalled_downloads: Mutex<HashSet<String>>,
    pub submitted: Mutex<Vec<VideoRequest>>,
    pub polls: Mutex<HashMap<String, u32>>,
    pub keys_seen: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_images(&self, result: StudioResult<Vec<ImagePayload>>) {
        self.image_results.lock().push_back(result);
    }

    pub fn delay_images(&self, delay: Duration) {
        *self.image_delay.lock() = Some(delay);
    }

    pub fn push_text(&self, result: StudioResult<Option<String>>) {
        self.text_results.lock().push_back(result);
    }

    pub fn delay_text(&self, delay: Duration) {
        *self.text_delay.lock() = Some(delay);
    }

    pub fn fail_submit(&self, prompt: &str, err: StudioError) {
        self.submit_errors.lock().insert(prompt.to_string(), err);
    }

    pub fn script_operation(&self, prompt: &str, statuses: Vec<StudioResult<OperationStatus>>) {
        self.operations
            .lock()
            .insert(operation_name(prompt), statuses.into());
    }

    /// Polls of this operation never answer.
    pub fn stall_operation(&self, prompt: &str) {
        self.stalled_operations.lock().insert(operation_name(prompt));
    }

    /// Downloads of this location never answer.
    pub fn stall_download(&self, location: &str) {
        self.stalled_downloads.lock().insert(location.to_string());
    }

    pub fn serve_media(&self, location: &str, result: StudioResult<DownloadedMedia>) {
        self.downloads.lock().insert(location.to_string(), result);
    }

    pub fn poll_count(&self, prompt: &str) -> u32 {
        self.polls
            .lock()
            .get(&operation_name(prompt))
            .copied()
            .unwrap_or(0)
    }

    fn record_key(&self, key: &ApiKey) {
        self.keys_seen.lock().push(key.expose().to_string());
    }
}

pub fn operation_name(prompt: &str) -> String {
    format!("models/veo/operations/{prompt}")
}

pub fn running() -> StudioResult<OperationStatus> {
    Ok(OperationStatus::default())
}

pub fn done_with(location: &str) -> StudioResult<OperationStatus> {
    Ok(OperationStatus {
        done: true,
        media_location: Some(location.to_string()),
        error: None,
    })
}

pub fn done_without_location() -> StudioResult<OperationStatus> {
    Ok(OperationStatus {
        done: true,
        media_location: None,
        error: None,
    })
}

pub fn done_with_error(err: StudioError) -> StudioResult<OperationStatus> {
    Ok(OperationStatus {
        done: true,
        media_location: None,
        error: Some(err),
    })
}

pub fn mp4(bytes: &[u8]) -> StudioResult<DownloadedMedia> {
    Ok(DownloadedMedia {
        bytes: bytes.to_vec(),
        mime_type: "video/mp4".to_string(),
    })
}

pub fn jpeg_payloads(count: usize) -> Vec<ImagePayload> {
    (0..count)
        .map(|index| ImagePayload {
            base64: format!("aW1hZ2U{index}"),
            mime_type: "image/jpeg".to_string(),
        })
        .collect()
}

#[async_trait]
impl GenerationBackend for FakeBackend {
    async fn generate_images(
        &self,
        key: &ApiKey,
        _request: &ImageRequest,
    ) -> StudioResult<Vec<ImagePayload>> {
        self.record_key(key);
        let delay = *self.image_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.image_results
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(StudioError::Remote("no scripted image result".into())))
    }

    async fn generate_text(
        &self,
        key: &ApiKey,
        _system_instruction: &str,
        _prompt: &str,
    ) -> StudioResult<Option<String>> {
        self.record_key(key);
        let delay = *self.text_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.text_results
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(StudioError::Remote("no scripted text result".into())))
    }

    async fn submit_video(
        &self,
        key: &ApiKey,
        request: &VideoRequest,
    ) -> StudioResult<OperationHandle> {
        self.record_key(key);
        self.submitted.lock().push(request.clone());
        if let Some(err) = self.submit_errors.lock().remove(&request.prompt) {
            return Err(err);
        }
        Ok(OperationHandle(operation_name(&request.prompt)))
    }

    async fn poll_video(
        &self,
        key: &ApiKey,
        handle: &OperationHandle,
    ) -> StudioResult<OperationStatus> {
        self.record_key(key);
        *self.polls.lock().entry(handle.0.clone()).or_default() += 1;
        let stalled = self.stalled_operations.lock().contains(&handle.0);
        if stalled {
            std::future::pending::<()>().await;
        }
        let mut operations = self.operations.lock();
        let script = operations
            .get_mut(&handle.0)
            .ok_or_else(|| StudioError::Remote(format!("unknown operation {}", handle.0)))?;
        if script.len() > 1 {
            return script
                .pop_front()
                .unwrap_or_else(|| Err(StudioError::Remote("empty script".into())));
        }
        script
            .front()
            .cloned()
            .unwrap_or_else(|| Err(StudioError::Remote("empty script".into())))
    }

    async fn download_media(&self, key: &ApiKey, location: &str) -> StudioResult<DownloadedMedia> {
        self.record_key(key);
        let stalled = self.stalled_downloads.lock().contains(location);
        if stalled {
            std::future::pending::<()>().await;
        }
        self.downloads
            .lock()
            .get(location)
            .cloned()
            .unwrap_or_else(|| Err(StudioError::Download("Not Found".into())))
    }
}

pub fn fast_poll() -> PollPolicy {
    PollPolicy {
        interval: Duration::from_secs(10),
        timeout: Duration::from_secs(120),
    }
}

pub struct Harness {
    pub studio: Studio,
    pub backend: Arc<FakeBackend>,
    pub preferences: Arc<PreferenceStore>,
    pub media_dir: TempDir,
}

pub async fn harness_with(
    backend: Arc<FakeBackend>,
    key: Option<&str>,
    poll: PollPolicy,
) -> Harness {
    let media_dir = tempfile::tempdir().expect("tempdir");
    let preferences = Arc::new(PreferenceStore::in_memory());
    let credential = CredentialContext::load(preferences.clone(), key.map(str::to_string))
        .await
        .expect("credential");
    let media = MediaStore::new(
        media_dir.path().to_path_buf(),
        "http://localhost:3000/media".to_string(),
    );
    let dyn_backend: Arc<dyn GenerationBackend> = backend.clone();
    let client = GenerationClient::new(dyn_backend, media, poll);
    Harness {
        studio: Studio::new(credential, preferences.clone(), client),
        backend,
        preferences,
        media_dir,
    }
}

pub async fn harness() -> Harness {
    harness_with(FakeBackend::new(), Some(TEST_KEY), fast_poll()).await
}

/// Waits (in paused test time) until the job leaves the pending state.
pub async fn wait_settled(studio: &Studio, id: JobId) -> VideoJob {
    for _ in 0..100_000 {
        if let Some(job) = studio.video_job(id) {
            if job.state != JobState::Pending {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    panic!("video job {id} never settled");
}

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::client::{GenerationBackend, GenerationClient};
use crate::config::Settings;
use crate::credential::{ApiKey, CredentialContext};
use crate::error::{StudioError, StudioResult};
use crate::gallery::Gallery;
use crate::gemini::GeminiBackend;
use crate::image_processing;
use crate::jobs::{JobId, JobTracker, VideoJob};
use crate::media::MediaStore;
use crate::model::{
    AspectRatio, DEFAULT_VIDEO_DURATION_SECS, GeneratedImage, GeneratedVideo, ImageRequest,
    MAX_IMAGE_COUNT, MIN_IMAGE_COUNT, VideoModel, VideoRequest, VideoResolution,
};
use crate::preferences::{self, GenerationDefaults, PreferenceStore};

/// A user's request to animate an image, or to make a video from text.
///
/// Unset settings fall back to the last-used ones.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnimationRequest {
    #[serde(default)]
    pub prompt: String,
    pub image_id: Option<Uuid>,
    pub aspect_ratio: Option<AspectRatio>,
    pub model: Option<VideoModel>,
    pub resolution: Option<VideoResolution>,
    pub duration_seconds: Option<u32>,
    pub generate_audio: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CredentialStatus {
    pub selected: bool,
}

/// Idle/in-flight flag for an action that allows one call at a time.
#[derive(Debug)]
struct Slot {
    name: &'static str,
    busy: AtomicBool,
}

struct SlotGuard<'a>(&'a Slot);

impl Slot {
    const fn new(name: &'static str) -> Self {
        Self {
            name,
            busy: AtomicBool::new(false),
        }
    }

    fn try_acquire(&self) -> StudioResult<SlotGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| SlotGuard(self))
            .map_err(|_| StudioError::Busy(self.name))
    }

    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.0.busy.store(false, Ordering::Release);
    }
}

struct Inner {
    credential: CredentialContext,
    preferences: Arc<PreferenceStore>,
    client: GenerationClient,
    jobs: JobTracker,
    gallery: Gallery,
    suggestions: RwLock<Vec<String>>,
    images_slot: Slot,
    enhance_slot: Slot,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

/// Wires user actions to the generation client, the job tracker and the
/// gallery.
#[derive(Clone)]
pub struct Studio {
    inner: Arc<Inner>,
}

impl Studio {
    pub fn new(
        credential: CredentialContext,
        preferences: Arc<PreferenceStore>,
        client: GenerationClient,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                credential,
                preferences,
                client,
                jobs: JobTracker::new(),
                gallery: Gallery::new(),
                suggestions: RwLock::new(Vec::new()),
                images_slot: Slot::new("image generation"),
                enhance_slot: Slot::new("prompt enhancement"),
                shutdown: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
        }
    }

    /// Builds a studio talking to the Generative Language API.
    pub async fn open(settings: &Settings) -> Result<Self> {
        let preferences = Arc::new(PreferenceStore::open(settings.preferences_path()).await?);
        let credential =
            CredentialContext::load(preferences.clone(), settings.initial_api_key.clone()).await?;
        let media = MediaStore::new(settings.media_dir(), settings.media_base_url.clone());
        let backend: Arc<dyn GenerationBackend> =
            Arc::new(GeminiBackend::new(settings.api_base.clone())?);
        let client = GenerationClient::new(backend, media, settings.poll);
        Ok(Self::new(credential, preferences, client))
    }

    pub fn credential_status(&self) -> CredentialStatus {
        CredentialStatus {
            selected: self.inner.credential.is_selected(),
        }
    }

    pub async fn select_credential(&self, api_key: &str) -> StudioResult<()> {
        self.inner.credential.replace(api_key).await
    }

    pub async fn invalidate_credential(&self) -> StudioResult<()> {
        self.inner.credential.invalidate().await
    }

    pub fn preferences(&self) -> GenerationDefaults {
        self.inner.preferences.generation_defaults()
    }

    pub async fn update_preferences(&self, defaults: GenerationDefaults) -> StudioResult<()> {
        if !(MIN_IMAGE_COUNT..=MAX_IMAGE_COUNT).contains(&defaults.number_of_images) {
            return Err(StudioError::validation(format!(
                "number_of_images must be between {MIN_IMAGE_COUNT} and {MAX_IMAGE_COUNT}"
            )));
        }
        self.inner
            .preferences
            .save_generation_defaults(&defaults)
            .await
            .map_err(|err| StudioError::Storage(err.to_string()))
    }

    pub fn is_generating_images(&self) -> bool {
        self.inner.images_slot.is_busy()
    }

    pub fn is_enhancing(&self) -> bool {
        self.inner.enhance_slot.is_busy()
    }

    /// Replaces the generated images in the gallery with a fresh batch.
    pub async fn generate_images(
        &self,
        request: ImageRequest,
    ) -> StudioResult<Vec<GeneratedImage>> {
        let _slot = self.inner.images_slot.try_acquire()?;
        request.validate()?;
        let key = self.inner.credential.require()?;

        self.inner.gallery.clear_generated();
        self.remember(&[
            (preferences::NUMBER_OF_IMAGES, request.count.to_string()),
            (preferences::ASPECT_RATIO, request.aspect_ratio.to_string()),
        ])
        .await;

        match self.inner.client.generate_images(&key, &request).await {
            Ok(images) => {
                self.inner.gallery.prepend_generated(images.clone());
                Ok(images)
            }
            Err(err) => Err(self.inner.handle_failure("image generation", &key, err).await),
        }
    }

    pub fn images(&self) -> Vec<GeneratedImage> {
        self.inner.gallery.images()
    }

    /// Registers an uploaded file as a seed image.
    pub fn upload_seed_image(
        &self,
        bytes: &[u8],
        declared_mime: Option<&str>,
    ) -> StudioResult<GeneratedImage> {
        let image = image_processing::seed_image_from_upload(bytes, declared_mime)?;
        self.inner.gallery.add_upload(image.clone());
        tracing::info!(image_id = %image.id, mime_type = %image.mime_type, "seed image uploaded");
        Ok(image)
    }

    pub async fn enhance_prompt(&self, prompt: &str) -> StudioResult<Vec<String>> {
        let _slot = self.inner.enhance_slot.try_acquire()?;
        if prompt.trim().is_empty() {
            return Err(StudioError::validation("prompt must not be empty"));
        }
        let key = self.inner.credential.require()?;
        match self.inner.client.enhance_prompt(&key, prompt).await {
            Ok(variants) => {
                *self.inner.suggestions.write() = variants.clone();
                Ok(variants)
            }
            Err(err) => Err(self.inner.handle_failure("prompt enhancement", &key, err).await),
        }
    }

    pub fn suggestions(&self) -> Vec<String> {
        self.inner.suggestions.read().clone()
    }

    /// Picks one suggestion and clears the list.
    pub fn take_suggestion(&self, index: usize) -> StudioResult<String> {
        let mut suggestions = self.inner.suggestions.write();
        if index >= suggestions.len() {
            return Err(StudioError::NotFound(format!("suggestion {index} not found")));
        }
        let chosen = suggestions.swap_remove(index);
        suggestions.clear();
        Ok(chosen)
    }

    pub fn dismiss_suggestions(&self) {
        self.inner.suggestions.write().clear();
    }

    /// Accepts a video request and returns its job id right away.
    ///
    /// The job is visible as pending before any remote call is made; the
    /// generation runs on a background task that settles the job.
    pub async fn request_animation(&self, request: AnimationRequest) -> StudioResult<JobId> {
        let defaults = self.preferences();
        let seed_image = match request.image_id {
            Some(id) => Some(
                self.inner
                    .gallery
                    .find(id)
                    .ok_or_else(|| StudioError::NotFound(format!("image {id} not found")))?,
            ),
            None => None,
        };
        let video_request = VideoRequest {
            prompt: request.prompt,
            aspect_ratio: request.aspect_ratio.unwrap_or(defaults.aspect_ratio),
            model: request.model.unwrap_or(defaults.video_model),
            resolution: request.resolution.unwrap_or(defaults.video_resolution),
            duration_seconds: request.duration_seconds.unwrap_or(DEFAULT_VIDEO_DURATION_SECS),
            generate_audio: request.generate_audio.unwrap_or(true),
            seed_image,
        };
        video_request.validate()?;
        let key = self.inner.credential.require()?;

        let job_id = self
            .inner
            .jobs
            .add_pending_video_job(&video_request.prompt, video_request.seed_image.clone());
        tracing::info!(%job_id, model = %video_request.model, "video job accepted");

        let inner = self.inner.clone();
        let cancel = self.inner.shutdown.child_token();
        let task_request = video_request.clone();
        self.inner.tasks.spawn(async move {
            let outcome = inner
                .client
                .generate_video(&key, &task_request, &cancel)
                .await;
            inner.settle_video(job_id, &key, outcome).await;
        });

        self.remember(&[
            (preferences::VIDEO_MODEL, video_request.model.to_string()),
            (preferences::VIDEO_RESOLUTION, video_request.resolution.to_string()),
        ])
        .await;
        Ok(job_id)
    }

    pub fn video_jobs(&self) -> Vec<VideoJob> {
        self.inner.jobs.list_jobs()
    }

    pub fn pending_video_count(&self) -> usize {
        self.inner.jobs.pending_count()
    }

    pub fn video_job(&self, id: JobId) -> Option<VideoJob> {
        self.inner.jobs.get(id)
    }

    /// Cancels outstanding video waits and lets their jobs settle.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
    }

    /// Persists the settings an accepted request used, leaving the rest alone.
    async fn remember(&self, entries: &[(&str, String)]) {
        if let Err(err) = self.inner.preferences.set_many(entries).await {
            tracing::warn!(error = %err, "failed to save generation preferences");
        }
    }
}

impl Inner {
    /// Logs a failed remote call; a credential failure clears `key` unless a
    /// newer key has been selected since the call started.
    async fn handle_failure(
        &self,
        action: &'static str,
        key: &ApiKey,
        err: StudioError,
    ) -> StudioError {
        tracing::warn!(action, kind = err.kind(), error = %err, "remote call failed");
        if err.is_credential() {
            if let Err(invalidate_err) = self.credential.invalidate_if(key).await {
                tracing::error!(error = %invalidate_err, "failed to clear stored api key");
            }
        }
        err
    }

    async fn settle_video(
        &self,
        job_id: JobId,
        key: &ApiKey,
        outcome: StudioResult<GeneratedVideo>,
    ) {
        let settled = match outcome {
            Ok(video) => {
                tracing::info!(%job_id, url = %video.url, "video job completed");
                self.jobs.mark_completed(job_id, video.url)
            }
            Err(err) => {
                let err = self.handle_failure("video generation", key, err).await;
                self.jobs.mark_failed(job_id, err.to_string())
            }
        };
        if let Err(err) = settled {
            tracing::error!(%job_id, error = %err, "video job could not be settled");
        }
    }
}

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{Instant, sleep_until, timeout_at};
use tokio_util::sync::CancellationToken;

use crate::config::PollPolicy;
use crate::credential::ApiKey;
use crate::error::{StudioError, StudioResult};
use crate::media::MediaStore;
use crate::model::{GeneratedImage, GeneratedVideo, ImageRequest, VideoRequest};

const ENHANCE_INSTRUCTION: &str = concat!(
    "You are an expert prompt engineer for AI image and video generation.\n",
    "Your task is to take a user's simple prompt and transform it into three distinct, ",
    "highly detailed, and cinematic variations.\n",
    "Each variation must be on its own line. Do not use any prefixes, labels, or markdown ",
    "formatting like \"-\", \"*\", or \"1.\".\n",
    "Focus on adding rich visual details, specific lighting conditions, camera angles, ",
    "lens types, and artistic styles.\n\n",
    "Example user prompt: \"a cat on a skateboard\"\n\n",
    "Example output:\n",
    "A fluffy ginger cat wearing tiny sunglasses effortlessly cruises down a sun-drenched ",
    "boardwalk, wide-angle lens, golden hour lighting, cinematic film grain.\n",
    "Extreme close-up shot of a determined Siamese cat's paw gripping a colorful skateboard, ",
    "shallow depth of field, set against a gritty urban alleyway at dusk.\n",
    "High-speed action shot of a black cat performing a trick on a skateboard mid-air, ",
    "motion blur, vibrant graffiti background, fisheye perspective, energetic and dynamic."
);

/// Time allowed for fetching a finished video, counted from completion.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// One encoded image as returned by the service.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePayload {
    pub base64: String,
    pub mime_type: String,
}

/// Opaque name of a long-running remote operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle(pub String);

/// One observation of a long-running operation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OperationStatus {
    pub done: bool,
    pub media_location: Option<String>,
    pub error: Option<StudioError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedMedia {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// The remote operations the studio needs from a generation service.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate_images(
        &self,
        key: &ApiKey,
        request: &ImageRequest,
    ) -> StudioResult<Vec<ImagePayload>>;

    async fn generate_text(
        &self,
        key: &ApiKey,
        system_instruction: &str,
        prompt: &str,
    ) -> StudioResult<Option<String>>;

    async fn submit_video(&self, key: &ApiKey, request: &VideoRequest)
    -> StudioResult<OperationHandle>;

    async fn poll_video(&self, key: &ApiKey, handle: &OperationHandle)
    -> StudioResult<OperationStatus>;

    async fn download_media(&self, key: &ApiKey, location: &str) -> StudioResult<DownloadedMedia>;
}

/// Image, video and prompt-enhancement calls over a [`GenerationBackend`].
///
/// Never touches job state; callers record the outcome.
pub struct GenerationClient {
    backend: Arc<dyn GenerationBackend>,
    media: MediaStore,
    poll: PollPolicy,
}

impl GenerationClient {
    pub fn new(backend: Arc<dyn GenerationBackend>, media: MediaStore, poll: PollPolicy) -> Self {
        Self { backend, media, poll }
    }

    /// Returns exactly `request.count` images in service order, or fails whole.
    pub async fn generate_images(
        &self,
        key: &ApiKey,
        request: &ImageRequest,
    ) -> StudioResult<Vec<GeneratedImage>> {
        request.validate()?;
        let payloads = self.backend.generate_images(key, request).await?;
        if payloads.len() != request.count as usize {
            return Err(StudioError::Remote(format!(
                "expected {} images but the service returned {}",
                request.count,
                payloads.len()
            )));
        }
        tracing::info!(
            count = payloads.len(),
            aspect_ratio = %request.aspect_ratio,
            "images generated"
        );
        Ok(payloads
            .into_iter()
            .map(|payload| {
                GeneratedImage::from_base64(payload.base64, &payload.mime_type, &request.prompt)
            })
            .collect())
    }

    pub async fn enhance_prompt(&self, key: &ApiKey, prompt: &str) -> StudioResult<Vec<String>> {
        if prompt.trim().is_empty() {
            return Err(StudioError::validation("prompt must not be empty"));
        }
        let text = self
            .backend
            .generate_text(key, ENHANCE_INSTRUCTION, prompt)
            .await?;
        Ok(text.as_deref().map(parse_variants).unwrap_or_default())
    }

    /// Submits a video operation and waits for it to settle.
    ///
    /// Polls every `poll.interval` until the operation is done, the
    /// `poll.timeout` deadline passes, or `cancel` fires. On success the media
    /// is downloaded into the media store and its served URL returned. The
    /// deadline and `cancel` also bound each in-flight poll; the download gets
    /// its own window once the operation is done.
    pub async fn generate_video(
        &self,
        key: &ApiKey,
        request: &VideoRequest,
        cancel: &CancellationToken,
    ) -> StudioResult<GeneratedVideo> {
        request.validate()?;
        let handle = self.backend.submit_video(key, request).await?;
        tracing::info!(
            operation = %handle.0,
            model = %request.model,
            seeded = request.seed_image.is_some(),
            "video operation submitted"
        );
        let deadline = Instant::now() + self.poll.timeout;
        let status = self.wait_for_operation(key, &handle, deadline, cancel).await?;

        if let Some(error) = status.error {
            return Err(error);
        }
        let location = status.media_location.ok_or(StudioError::MissingResult)?;

        let media = bounded(
            DOWNLOAD_TIMEOUT,
            Instant::now() + DOWNLOAD_TIMEOUT,
            cancel,
            self.backend.download_media(key, &location),
        )
        .await?;
        let url = self
            .media
            .put_video(&media.bytes, &media.mime_type)
            .await
            .map_err(|err| StudioError::Storage(err.to_string()))?;
        tracing::info!(operation = %handle.0, size = media.bytes.len(), %url, "video stored");
        Ok(GeneratedVideo { url })
    }

    async fn wait_for_operation(
        &self,
        key: &ApiKey,
        handle: &OperationHandle,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> StudioResult<OperationStatus> {
        let mut poll_count = 0u32;
        loop {
            let next_poll = Instant::now() + self.poll.interval;
            if next_poll > deadline {
                tracing::warn!(operation = %handle.0, poll_count, "video operation timed out");
                return Err(StudioError::Timeout(self.poll.timeout));
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(operation = %handle.0, poll_count, "video wait cancelled");
                    return Err(StudioError::Cancelled);
                }
                _ = sleep_until(next_poll) => {}
            }

            poll_count += 1;
            let status = bounded(
                self.poll.timeout,
                deadline,
                cancel,
                self.backend.poll_video(key, handle),
            )
            .await
            .inspect_err(|err| {
                tracing::warn!(
                    operation = %handle.0,
                    poll_count,
                    error = %err,
                    "video poll failed"
                );
            })?;
            tracing::debug!(
                operation = %handle.0,
                poll_count,
                done = status.done,
                "video operation polled"
            );
            if status.done {
                return Ok(status);
            }
        }
    }
}

/// Runs one remote call, giving up at `deadline` or when `cancel` fires.
/// `budget` is the window reported in the timeout error.
async fn bounded<T>(
    budget: Duration,
    deadline: Instant,
    cancel: &CancellationToken,
    call: impl Future<Output = StudioResult<T>>,
) -> StudioResult<T> {
    tokio::select! {
        _ = cancel.cancelled() => Err(StudioError::Cancelled),
        outcome = timeout_at(deadline, call) => {
            outcome.unwrap_or(Err(StudioError::Timeout(budget)))
        }
    }
}

/// Splits an enhancement response into one variant per non-blank line.
pub fn parse_variants(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use url::Url;

use crate::client::{
    DownloadedMedia, GenerationBackend, ImagePayload, OperationHandle, OperationStatus,
};
use crate::credential::ApiKey;
use crate::error::{StudioError, StudioResult, classify_remote_failure};
use crate::model::{ImageRequest, VideoRequest};

pub const IMAGE_MODEL: &str = "imagen-4.0-generate-001";
pub const TEXT_MODEL: &str = "gemini-2.5-flash";
const IMAGE_OUTPUT_MIME: &str = "image/jpeg";
const API_KEY_HEADER: &str = "x-goog-api-key";
const TEXT_TEMPERATURE: f32 = 0.9;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
/// Per-request ceiling; covers the video download body as well.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// REST client for the Generative Language API.
#[derive(Debug, Clone)]
pub struct GeminiBackend {
    client: Client,
    api_base: String,
}

impl GeminiBackend {
    pub fn new(api_base: impl Into<String>) -> reqwest::Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{model}:{method}", self.api_base)
    }

    fn image_request(&self, key: &ApiKey, request: &ImageRequest) -> RequestBuilder {
        self.client
            .post(self.model_url(IMAGE_MODEL, "predict"))
            .header(API_KEY_HEADER, key.expose())
            .json(&image_body(request))
    }

    fn text_request(&self, key: &ApiKey, system_instruction: &str, prompt: &str) -> RequestBuilder {
        self.client
            .post(self.model_url(TEXT_MODEL, "generateContent"))
            .header(API_KEY_HEADER, key.expose())
            .json(&text_body(system_instruction, prompt))
    }

    fn video_request(&self, key: &ApiKey, request: &VideoRequest) -> RequestBuilder {
        self.client
            .post(self.model_url(request.model.as_str(), "predictLongRunning"))
            .header(API_KEY_HEADER, key.expose())
            .json(&video_body(request))
    }

    fn operation_request(&self, key: &ApiKey, handle: &OperationHandle) -> RequestBuilder {
        let name = handle.0.trim_start_matches('/');
        self.client
            .get(format!("{}/{name}", self.api_base))
            .header(API_KEY_HEADER, key.expose())
    }
}

fn image_body(request: &ImageRequest) -> Value {
    json!({
        "instances": [{ "prompt": request.prompt }],
        "parameters": {
            "sampleCount": request.count,
            "aspectRatio": request.aspect_ratio.as_str(),
            "outputMimeType": IMAGE_OUTPUT_MIME,
        }
    })
}

fn text_body(system_instruction: &str, prompt: &str) -> Value {
    json!({
        "systemInstruction": { "parts": [{ "text": system_instruction }] },
        "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
        "generationConfig": { "temperature": TEXT_TEMPERATURE },
    })
}

fn video_body(request: &VideoRequest) -> Value {
    let instance = VideoInstance {
        prompt: &request.prompt,
        image: request.seed_image.as_ref().map(|image| InlineImage {
            bytes_base64_encoded: &image.base64,
            mime_type: &image.mime_type,
        }),
    };
    let parameters = VideoParameters {
        aspect_ratio: request.aspect_ratio.as_str(),
        resolution: request.resolution.as_str(),
        duration_seconds: request.duration_seconds,
        generate_audio: request.generate_audio,
        sample_count: 1,
    };
    json!({ "instances": [instance], "parameters": parameters })
}

async fn assert_ok_response(response: reqwest::Response) -> StudioResult<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    Err(error_from_body(status, &text))
}

fn error_from_body(status: StatusCode, text: &str) -> StudioError {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(text) {
        let reasons: Vec<String> = envelope
            .error
            .details
            .into_iter()
            .filter_map(|detail| detail.reason)
            .collect();
        let message = envelope
            .error
            .message
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| status.to_string());
        return classify_remote_failure(
            Some(status.as_u16()),
            envelope.error.status.as_deref(),
            &reasons,
            &message,
        );
    }
    let message = if text.trim().is_empty() {
        status.to_string()
    } else {
        format!("{status} {}", text.trim())
    };
    classify_remote_failure(Some(status.as_u16()), None, &[], &message)
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
    status: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: Option<String>,
    mime_type: Option<String>,
    rai_filtered_reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoInstance<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<InlineImage<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineImage<'a> {
    bytes_base64_encoded: &'a str,
    mime_type: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VideoParameters<'a> {
    aspect_ratio: &'a str,
    resolution: &'a str,
    duration_seconds: u32,
    generate_audio: bool,
    sample_count: u32,
}

#[derive(Debug, Deserialize)]
struct LongRunningOperation {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OperationPayload {
    done: Option<bool>,
    error: Option<OperationError>,
    response: Option<VideoOperationResponse>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    message: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoOperationResponse {
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    generated_samples: Option<Vec<GeneratedSample>>,
    rai_media_filtered_reasons: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSample {
    video: Option<VideoRef>,
}

#[derive(Debug, Deserialize)]
struct VideoRef {
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<ContentPart>>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    text: Option<String>,
}

impl OperationPayload {
    fn into_status(self) -> OperationStatus {
        let done = self.done.unwrap_or(false);
        let error = self.error.map(|err| {
            let message = err
                .message
                .filter(|message| !message.trim().is_empty())
                .unwrap_or_else(|| "Video generation failed.".to_string());
            classify_remote_failure(None, err.status.as_deref(), &[], &message)
        });
        let video_response = self.response.and_then(|resp| resp.generate_video_response);
        let (media_location, filtered) = match video_response {
            Some(resp) => {
                let location = resp
                    .generated_samples
                    .and_then(|samples| samples.into_iter().next())
                    .and_then(|sample| sample.video)
                    .and_then(|video| video.uri)
                    .filter(|uri| !uri.trim().is_empty());
                (location, resp.rai_media_filtered_reasons.unwrap_or_default())
            }
            None => (None, Vec::new()),
        };
        let error = error.or_else(|| {
            (done && media_location.is_none() && !filtered.is_empty())
                .then(|| StudioError::Remote(filtered.join(" ")))
        });
        OperationStatus {
            done,
            media_location,
            error,
        }
    }
}

fn collect_text(payload: GenerateContentResponse) -> Option<String> {
    let parts = payload
        .candidates?
        .into_iter()
        .next()?
        .content?
        .parts?;
    let text: String = parts.into_iter().filter_map(|part| part.text).collect();
    if text.is_empty() { None } else { Some(text) }
}

fn download_url(location: &str, key: &ApiKey) -> StudioResult<Url> {
    let mut url = Url::parse(location)
        .map_err(|err| StudioError::Download(format!("invalid media location: {err}")))?;
    url.query_pairs_mut().append_pair("key", key.expose());
    Ok(url)
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    async fn generate_images(
        &self,
        key: &ApiKey,
        request: &ImageRequest,
    ) -> StudioResult<Vec<ImagePayload>> {
        let response = self.image_request(key, request).send().await?;
        let response = assert_ok_response(response).await?;
        let payload: PredictResponse = response.json().await?;

        let mut images = Vec::with_capacity(payload.predictions.len());
        for prediction in payload.predictions {
            match prediction.bytes_base64_encoded {
                Some(base64) => images.push(ImagePayload {
                    base64,
                    mime_type: prediction
                        .mime_type
                        .unwrap_or_else(|| IMAGE_OUTPUT_MIME.to_string()),
                }),
                None => {
                    let reason = prediction
                        .rai_filtered_reason
                        .unwrap_or_else(|| "image was filtered".to_string());
                    tracing::warn!(%reason, "prediction returned without image bytes");
                }
            }
        }
        Ok(images)
    }

    async fn generate_text(
        &self,
        key: &ApiKey,
        system_instruction: &str,
        prompt: &str,
    ) -> StudioResult<Option<String>> {
        let response = self
            .text_request(key, system_instruction, prompt)
            .send()
            .await?;
        let response = assert_ok_response(response).await?;
        let payload: GenerateContentResponse = response.json().await?;
        Ok(collect_text(payload))
    }

    async fn submit_video(
        &self,
        key: &ApiKey,
        request: &VideoRequest,
    ) -> StudioResult<OperationHandle> {
        let response = self.video_request(key, request).send().await?;
        let response = assert_ok_response(response).await?;
        let operation: LongRunningOperation = response.json().await?;
        operation
            .name
            .filter(|name| !name.trim().is_empty())
            .map(OperationHandle)
            .ok_or_else(|| {
                StudioError::Remote("service did not return an operation name".to_string())
            })
    }

    async fn poll_video(
        &self,
        key: &ApiKey,
        handle: &OperationHandle,
    ) -> StudioResult<OperationStatus> {
        let response = self.operation_request(key, handle).send().await?;
        let response = assert_ok_response(response).await?;
        let payload: OperationPayload = response.json().await?;
        Ok(payload.into_status())
    }

    async fn download_media(&self, key: &ApiKey, location: &str) -> StudioResult<DownloadedMedia> {
        let url = download_url(location, key)?;
        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, key.expose())
            .send()
            .await
            .map_err(|err| StudioError::Download(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let reason = status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| status.as_str().to_string());
            return Err(StudioError::Download(reason));
        }
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
            .unwrap_or_else(|| "video/mp4".to_string());
        let bytes = response
            .bytes()
            .await
            .map_err(|err| StudioError::Download(err.to_string()))?;
        Ok(DownloadedMedia {
            bytes: bytes.to_vec(),
            mime_type,
        })
    }
}

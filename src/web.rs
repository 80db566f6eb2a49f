use std::path::Path;

use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, FromRequest, FromRequestParts, Multipart, Path as UrlPath, Request,
        State,
        rejection::{JsonRejection, PathRejection},
    },
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;
use uuid::Uuid;

use crate::error::StudioError;
use crate::image_processing::MAX_SEED_IMAGE_BYTES;
use crate::jobs::VideoJob;
use crate::model::{GeneratedImage, ImageRequest};
use crate::preferences::GenerationDefaults;
use crate::studio::{AnimationRequest, Studio};

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    kind: &'static str,
}

/// A [`StudioError`] rendered as a JSON error body.
pub struct ApiError(StudioError);

impl From<StudioError> for ApiError {
    fn from(err: StudioError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            StudioError::Validation(_) => StatusCode::BAD_REQUEST,
            StudioError::Credential(_) => StatusCode::UNAUTHORIZED,
            StudioError::Busy(_) => StatusCode::CONFLICT,
            StudioError::NotFound(_) => StatusCode::NOT_FOUND,
            StudioError::Storage(_) | StudioError::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
            StudioError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            StudioError::Remote(_) | StudioError::MissingResult | StudioError::Download(_) => {
                StatusCode::BAD_GATEWAY
            }
        };
        json_error(status, self.0.kind(), &self.0.to_string())
    }
}

fn json_error(status: StatusCode, kind: &'static str, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
            kind,
        }),
    )
        .into_response()
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// [`Json`] whose rejections are reported as validation errors.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError(StudioError::validation(rejection.body_text())))?;
        Ok(Self(value))
    }
}

/// Path parameters whose rejections are reported as validation errors.
pub struct ApiPath<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    UrlPath<T>: FromRequestParts<S, Rejection = PathRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let UrlPath(value) = UrlPath::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError(StudioError::validation(rejection.body_text())))?;
        Ok(Self(value))
    }
}

#[derive(Deserialize)]
pub struct SelectCredentialBody {
    api_key: String,
}

#[derive(Deserialize)]
pub struct EnhanceBody {
    prompt: String,
}

#[derive(Serialize)]
pub struct SuggestionsResponse {
    suggestions: Vec<String>,
}

#[derive(Serialize)]
pub struct PromptResponse {
    prompt: String,
}

#[derive(Serialize)]
pub struct ImagesResponse {
    images: Vec<GeneratedImage>,
    generating: bool,
}

#[derive(Serialize)]
pub struct JobAccepted {
    job_id: Uuid,
}

/// A job plus its progress text while pending.
#[derive(Serialize)]
pub struct JobView {
    #[serde(flatten)]
    job: VideoJob,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<&'static str>,
}

impl From<VideoJob> for JobView {
    fn from(job: VideoJob) -> Self {
        let progress = job.progress_message(Utc::now());
        Self { job, progress }
    }
}

#[derive(Serialize)]
pub struct JobsResponse {
    jobs: Vec<JobView>,
    pending: usize,
}

pub fn router(studio: Studio, media_dir: &Path) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route(
            "/api/credential",
            get(credential_status)
                .put(select_credential)
                .delete(invalidate_credential),
        )
        .route("/api/preferences", get(get_preferences).put(put_preferences))
        .route("/api/prompts/enhance", post(enhance_prompt))
        .route(
            "/api/suggestions",
            get(list_suggestions).delete(dismiss_suggestions),
        )
        .route("/api/suggestions/{index}", post(take_suggestion))
        .route("/api/images", get(list_images).post(generate_images))
        .route(
            "/api/uploads",
            post(upload_seed_image).layer(DefaultBodyLimit::max(MAX_SEED_IMAGE_BYTES + 64 * 1024)),
        )
        .route("/api/videos", get(list_videos).post(request_animation))
        .route("/api/videos/{id}", get(get_video))
        .nest_service("/media", ServeDir::new(media_dir))
        .with_state(studio)
}

async fn health() -> &'static str {
    "ok"
}

async fn credential_status(State(studio): State<Studio>) -> impl IntoResponse {
    Json(studio.credential_status())
}

async fn select_credential(
    State(studio): State<Studio>,
    ApiJson(body): ApiJson<SelectCredentialBody>,
) -> Result<StatusCode, ApiError> {
    studio.select_credential(&body.api_key).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn invalidate_credential(State(studio): State<Studio>) -> Result<StatusCode, ApiError> {
    studio.invalidate_credential().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_preferences(State(studio): State<Studio>) -> Json<GenerationDefaults> {
    Json(studio.preferences())
}

async fn put_preferences(
    State(studio): State<Studio>,
    ApiJson(defaults): ApiJson<GenerationDefaults>,
) -> ApiResult<GenerationDefaults> {
    studio.update_preferences(defaults).await?;
    Ok(Json(studio.preferences()))
}

async fn enhance_prompt(
    State(studio): State<Studio>,
    ApiJson(body): ApiJson<EnhanceBody>,
) -> ApiResult<SuggestionsResponse> {
    let suggestions = studio.enhance_prompt(&body.prompt).await?;
    Ok(Json(SuggestionsResponse { suggestions }))
}

async fn list_suggestions(State(studio): State<Studio>) -> Json<SuggestionsResponse> {
    Json(SuggestionsResponse {
        suggestions: studio.suggestions(),
    })
}

async fn take_suggestion(
    State(studio): State<Studio>,
    ApiPath(index): ApiPath<usize>,
) -> ApiResult<PromptResponse> {
    let prompt = studio.take_suggestion(index)?;
    Ok(Json(PromptResponse { prompt }))
}

async fn dismiss_suggestions(State(studio): State<Studio>) -> StatusCode {
    studio.dismiss_suggestions();
    StatusCode::NO_CONTENT
}

async fn list_images(State(studio): State<Studio>) -> Json<ImagesResponse> {
    Json(ImagesResponse {
        images: studio.images(),
        generating: studio.is_generating_images(),
    })
}

async fn generate_images(
    State(studio): State<Studio>,
    ApiJson(request): ApiJson<ImageRequest>,
) -> ApiResult<ImagesResponse> {
    let images = studio.generate_images(request).await?;
    Ok(Json(ImagesResponse {
        images,
        generating: false,
    }))
}

async fn upload_seed_image(State(studio): State<Studio>, mut multipart: Multipart) -> Response {
    let mut content_type = None;
    let mut bytes = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() == Some("file") {
                    content_type = field.content_type().map(|value| value.to_string());
                    match field.bytes().await {
                        Ok(data) => bytes = Some(data),
                        Err(err) => {
                            return json_error(
                                StatusCode::BAD_REQUEST,
                                "validation",
                                &format!("failed to read file: {err}"),
                            );
                        }
                    }
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                return json_error(
                    StatusCode::BAD_REQUEST,
                    "validation",
                    &format!("failed to read form: {err}"),
                );
            }
        }
    }

    let Some(bytes) = bytes else {
        return json_error(StatusCode::BAD_REQUEST, "validation", "no file field in upload");
    };
    match studio.upload_seed_image(&bytes, content_type.as_deref()) {
        Ok(image) => (StatusCode::CREATED, Json(image)).into_response(),
        Err(err) => ApiError(err).into_response(),
    }
}

async fn request_animation(
    State(studio): State<Studio>,
    ApiJson(request): ApiJson<AnimationRequest>,
) -> Result<(StatusCode, Json<JobAccepted>), ApiError> {
    let job_id = studio.request_animation(request).await?;
    Ok((StatusCode::ACCEPTED, Json(JobAccepted { job_id })))
}

async fn list_videos(State(studio): State<Studio>) -> Json<JobsResponse> {
    Json(JobsResponse {
        jobs: studio.video_jobs().into_iter().map(JobView::from).collect(),
        pending: studio.pending_video_count(),
    })
}

async fn get_video(
    State(studio): State<Studio>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<JobView> {
    studio
        .video_job(id)
        .map(|job| Json(JobView::from(job)))
        .ok_or_else(|| ApiError(StudioError::NotFound(format!("video job {id} not found"))))
}

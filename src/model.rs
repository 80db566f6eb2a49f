use std::fmt;
use std::str::FromStr;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StudioError, StudioResult};

pub const MIN_IMAGE_COUNT: u32 = 1;
pub const MAX_IMAGE_COUNT: u32 = 4;
pub const MIN_VIDEO_DURATION_SECS: u32 = 4;
pub const MAX_VIDEO_DURATION_SECS: u32 = 8;
pub const DEFAULT_VIDEO_DURATION_SECS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "4:3")]
    Standard,
    #[serde(rename = "3:4")]
    StandardPortrait,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        Self::Landscape,
        Self::Portrait,
        Self::Square,
        Self::Standard,
        Self::StandardPortrait,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Landscape => "16:9",
            Self::Portrait => "9:16",
            Self::Square => "1:1",
            Self::Standard => "4:3",
            Self::StandardPortrait => "3:4",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VideoModel {
    #[default]
    #[serde(rename = "veo-3.1-fast-generate-preview")]
    Veo31Fast,
    #[serde(rename = "veo-3.1-generate-preview")]
    Veo31,
}

impl VideoModel {
    pub const ALL: [VideoModel; 2] = [Self::Veo31Fast, Self::Veo31];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Veo31Fast => "veo-3.1-fast-generate-preview",
            Self::Veo31 => "veo-3.1-generate-preview",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VideoResolution {
    #[default]
    #[serde(rename = "720p")]
    Hd,
    #[serde(rename = "1080p")]
    FullHd,
}

impl VideoResolution {
    pub const ALL: [VideoResolution; 2] = [Self::Hd, Self::FullHd];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hd => "720p",
            Self::FullHd => "1080p",
        }
    }
}

macro_rules! str_enum_impls {
    ($ty:ty, $label:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = StudioError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let trimmed = value.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|candidate| candidate.as_str() == trimmed)
                    .ok_or_else(|| {
                        let allowed: Vec<&str> = Self::ALL.iter().map(|v| v.as_str()).collect();
                        StudioError::validation(format!(
                            "{} must be one of {}",
                            $label,
                            allowed.join(", ")
                        ))
                    })
            }
        }
    };
}

str_enum_impls!(AspectRatio, "aspect_ratio");
str_enum_impls!(VideoModel, "model");
str_enum_impls!(VideoResolution, "resolution");

/// An image in the gallery, either generated or uploaded as a seed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub id: Uuid,
    pub base64: String,
    pub mime_type: String,
    pub src: String,
    pub prompt: String,
    pub created_at: String,
}

impl GeneratedImage {
    pub fn from_base64(base64: String, mime_type: &str, prompt: &str) -> Self {
        let src = format!("data:{mime_type};base64,{base64}");
        Self {
            id: Uuid::new_v4(),
            base64,
            mime_type: mime_type.to_string(),
            src,
            prompt: prompt.to_string(),
            created_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn from_bytes(bytes: &[u8], mime_type: &str, prompt: &str) -> Self {
        Self::from_base64(STANDARD.encode(bytes), mime_type, prompt)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedVideo {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRequest {
    pub prompt: String,
    #[serde(default = "default_image_count")]
    pub count: u32,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
}

fn default_image_count() -> u32 {
    MIN_IMAGE_COUNT
}

impl ImageRequest {
    pub fn validate(&self) -> StudioResult<()> {
        if self.prompt.trim().is_empty() {
            return Err(StudioError::validation("prompt must not be empty"));
        }
        if !(MIN_IMAGE_COUNT..=MAX_IMAGE_COUNT).contains(&self.count) {
            return Err(StudioError::validation(format!(
                "count must be between {MIN_IMAGE_COUNT} and {MAX_IMAGE_COUNT}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoRequest {
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    pub model: VideoModel,
    pub resolution: VideoResolution,
    pub duration_seconds: u32,
    pub generate_audio: bool,
    pub seed_image: Option<GeneratedImage>,
}

impl VideoRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            aspect_ratio: AspectRatio::default(),
            model: VideoModel::default(),
            resolution: VideoResolution::default(),
            duration_seconds: DEFAULT_VIDEO_DURATION_SECS,
            generate_audio: true,
            seed_image: None,
        }
    }

    pub fn with_seed_image(mut self, image: GeneratedImage) -> Self {
        self.seed_image = Some(image);
        self
    }

    pub fn validate(&self) -> StudioResult<()> {
        if self.prompt.trim().is_empty() && self.seed_image.is_none() {
            return Err(StudioError::validation(
                "a prompt or a seed image is required",
            ));
        }
        if !(MIN_VIDEO_DURATION_SECS..=MAX_VIDEO_DURATION_SECS).contains(&self.duration_seconds) {
            return Err(StudioError::validation(format!(
                "duration_seconds must be between {MIN_VIDEO_DURATION_SECS} and {MAX_VIDEO_DURATION_SECS}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspect_ratio_parses_wire_strings() {
        assert_eq!("9:16".parse::<AspectRatio>().unwrap(), AspectRatio::Portrait);
        assert_eq!(
            serde_json::to_string(&AspectRatio::Standard).unwrap(),
            "\"4:3\""
        );
        let err = "21:9".parse::<AspectRatio>().unwrap_err();
        assert!(err.to_string().contains("16:9"));
    }

    #[test]
    fn video_model_round_trips_through_json() {
        let model: VideoModel = serde_json::from_str("\"veo-3.1-generate-preview\"").unwrap();
        assert_eq!(model, VideoModel::Veo31);
        assert_eq!(model.to_string(), "veo-3.1-generate-preview");
    }

    #[test]
    fn image_src_is_a_data_url() {
        let image = GeneratedImage::from_bytes(b"abc", "image/jpeg", "p");
        assert_eq!(image.base64, "YWJj");
        assert_eq!(image.src, "data:image/jpeg;base64,YWJj");
    }

    #[test]
    fn image_request_rejects_blank_prompt_and_bad_count() {
        let blank = ImageRequest {
            prompt: "   ".to_string(),
            count: 1,
            aspect_ratio: AspectRatio::Square,
        };
        assert!(matches!(blank.validate(), Err(StudioError::Validation(_))));

        let too_many = ImageRequest {
            prompt: "city at night".to_string(),
            count: 5,
            aspect_ratio: AspectRatio::Square,
        };
        assert!(matches!(too_many.validate(), Err(StudioError::Validation(_))));

        let zero = ImageRequest {
            count: 0,
            ..too_many.clone()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn video_request_needs_prompt_or_seed() {
        assert!(VideoRequest::text("").validate().is_err());
        let seeded = VideoRequest::text("")
            .with_seed_image(GeneratedImage::from_bytes(b"img", "image/png", ""));
        assert!(seeded.validate().is_ok());
        assert!(VideoRequest::text("waves").validate().is_ok());
    }

    #[test]
    fn video_request_bounds_duration() {
        let mut request = VideoRequest::text("waves");
        request.duration_seconds = 12;
        assert!(request.validate().is_err());
        request.duration_seconds = 4;
        assert!(request.validate().is_ok());
    }
}

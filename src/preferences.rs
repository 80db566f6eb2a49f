use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;

use crate::model::{AspectRatio, MAX_IMAGE_COUNT, MIN_IMAGE_COUNT, VideoModel, VideoResolution};

pub const API_KEY: &str = "api_key";
pub const NUMBER_OF_IMAGES: &str = "number_of_images";
pub const ASPECT_RATIO: &str = "aspect_ratio";
pub const VIDEO_MODEL: &str = "video_model";
pub const VIDEO_RESOLUTION: &str = "video_resolution";

/// Small string values persisted across sessions in a single JSON file.
#[derive(Debug)]
pub struct PreferenceStore {
    path: Option<PathBuf>,
    values: RwLock<BTreeMap<String, String>>,
    write_lock: Mutex<()>,
}

impl PreferenceStore {
    pub async fn open(path: PathBuf) -> Result<Self> {
        let values = match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|err| {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "ignoring unreadable preferences file"
                );
                BTreeMap::new()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path: Some(path),
            values: RwLock::new(values),
            write_lock: Mutex::new(()),
        })
    }

    /// A store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: RwLock::new(BTreeMap::new()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.values.write().insert(key.to_string(), value.to_string());
        self.persist().await
    }

    /// Writes several values with a single persist; other keys are untouched.
    pub async fn set_many(&self, entries: &[(&str, String)]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        {
            let mut values = self.values.write();
            for (key, value) in entries {
                values.insert((*key).to_string(), value.clone());
            }
        }
        self.persist().await
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let removed = self.values.write().remove(key).is_some();
        if removed {
            self.persist().await?;
        }
        Ok(())
    }

    async fn persist(&self) -> Result<()> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        let payload = serde_json::to_vec_pretty(&*self.values.read())?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, payload).await?;
        Ok(())
    }

    pub fn generation_defaults(&self) -> GenerationDefaults {
        let number_of_images = self
            .get(NUMBER_OF_IMAGES)
            .and_then(|value| value.parse::<u32>().ok())
            .filter(|count| (MIN_IMAGE_COUNT..=MAX_IMAGE_COUNT).contains(count))
            .unwrap_or(MIN_IMAGE_COUNT);
        GenerationDefaults {
            number_of_images,
            aspect_ratio: parse_or_default(self.get(ASPECT_RATIO)),
            video_model: parse_or_default(self.get(VIDEO_MODEL)),
            video_resolution: parse_or_default(self.get(VIDEO_RESOLUTION)),
        }
    }

    pub async fn save_generation_defaults(&self, defaults: &GenerationDefaults) -> Result<()> {
        self.set_many(&[
            (NUMBER_OF_IMAGES, defaults.number_of_images.to_string()),
            (ASPECT_RATIO, defaults.aspect_ratio.to_string()),
            (VIDEO_MODEL, defaults.video_model.to_string()),
            (VIDEO_RESOLUTION, defaults.video_resolution.to_string()),
        ])
        .await
    }
}

fn parse_or_default<T: std::str::FromStr + Default>(value: Option<String>) -> T {
    value
        .and_then(|value| value.parse::<T>().ok())
        .unwrap_or_default()
}

/// Last-used generation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationDefaults {
    pub number_of_images: u32,
    pub aspect_ratio: AspectRatio,
    pub video_model: VideoModel,
    pub video_resolution: VideoResolution,
}

use std::path::{Path, PathBuf};

use anyhow::Result;
use sha2::{Digest, Sha256};
use tokio::fs;

/// Content-addressed file store whose entries are served back over HTTP.
///
/// Downloaded videos land here so the browser gets a plain URL it can hand to
/// a video element.
#[derive(Clone, Debug)]
pub struct MediaStore {
    base_dir: PathBuf,
    base_url: String,
}

impl MediaStore {
    pub fn new(base_dir: PathBuf, base_url: String) -> Self {
        Self { base_dir, base_url }
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, data).await?;
        Ok(())
    }

    /// Stores a video and returns the URL it is served under.
    pub async fn put_video(&self, data: &[u8], mime_type: &str) -> Result<String> {
        let key = Self::video_key(&compute_hash(data), extension_for_video(mime_type));
        self.put(&key, data).await?;
        Ok(self.get_public_url(&key))
    }

    pub fn get_public_url(&self, key: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let key = key.trim_start_matches('/');
        format!("{base}/{key}")
    }

    pub fn video_key(hash: &str, ext: &str) -> String {
        format!("videos/{hash}.{ext}")
    }

    fn resolve_path(&self, key: &str) -> PathBuf {
        let normalized = key.trim_start_matches('/');
        self.base_dir.join(Path::new(normalized))
    }
}

pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn extension_for_video(mime_type: &str) -> &'static str {
    match mime_type.to_ascii_lowercase().as_str() {
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        _ => "mp4",
    }
}

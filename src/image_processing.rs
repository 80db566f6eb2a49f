use image::{GenericImageView, ImageFormat};

use crate::error::{StudioError, StudioResult};
use crate::model::GeneratedImage;

/// Upload size ceiling for seed images.
pub const MAX_SEED_IMAGE_BYTES: usize = 20 * 1024 * 1024;

pub fn detect_mime_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    if bytes.starts_with(b"BM") {
        return Some("image/bmp");
    }
    None
}

pub fn mime_to_format(mime_type: &str) -> StudioResult<ImageFormat> {
    match mime_type {
        "image/png" => Ok(ImageFormat::Png),
        "image/jpeg" | "image/jpg" => Ok(ImageFormat::Jpeg),
        "image/gif" => Ok(ImageFormat::Gif),
        "image/webp" => Ok(ImageFormat::WebP),
        "image/bmp" => Ok(ImageFormat::Bmp),
        _ => Err(StudioError::validation(format!(
            "unsupported image type: {mime_type}"
        ))),
    }
}

pub fn get_dimensions(bytes: &[u8], mime_type: &str) -> StudioResult<(u32, u32)> {
    let format = mime_to_format(mime_type)?;
    let image = image::load_from_memory_with_format(bytes, format)
        .map_err(|err| StudioError::validation(format!("decode image failed: {err}")))?;
    Ok(image.dimensions())
}

/// Turns an uploaded file into a gallery image usable as a video seed.
///
/// The sniffed type wins over the declared one; the bytes must decode.
pub fn seed_image_from_upload(
    bytes: &[u8],
    declared_mime: Option<&str>,
) -> StudioResult<GeneratedImage> {
    if bytes.is_empty() {
        return Err(StudioError::validation("uploaded file is empty"));
    }
    if bytes.len() > MAX_SEED_IMAGE_BYTES {
        return Err(StudioError::validation(format!(
            "uploaded file exceeds {} bytes",
            MAX_SEED_IMAGE_BYTES
        )));
    }
    if let Some(declared) = declared_mime {
        if !declared.starts_with("image/") {
            return Err(StudioError::validation(format!(
                "unsupported file type: {declared}"
            )));
        }
    }
    let mime_type = detect_mime_type(bytes)
        .map(str::to_string)
        .or_else(|| {
            declared_mime.map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
        })
        .ok_or_else(|| StudioError::validation("unsupported image type"))?;
    let (width, height) = get_dimensions(bytes, &mime_type)?;
    tracing::debug!(%mime_type, width, height, size = bytes.len(), "seed image accepted");
    Ok(GeneratedImage::from_bytes(bytes, &mime_type, ""))
}

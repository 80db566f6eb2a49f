pub mod client;
pub mod config;
pub mod credential;
pub mod error;
pub mod gallery;
pub mod gemini;
pub mod image_processing;
pub mod jobs;
pub mod media;
pub mod model;
pub mod preferences;
pub mod studio;
pub mod web;

pub use error::{StudioError, StudioResult};

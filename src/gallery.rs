use parking_lot::RwLock;
use uuid::Uuid;

use crate::model::GeneratedImage;

/// Images shown to the user, newest first.
///
/// Generated images are replaced batch by batch; uploaded seed images stay
/// until the session ends.
#[derive(Debug, Default)]
pub struct Gallery {
    generated: RwLock<Vec<GeneratedImage>>,
    uploads: RwLock<Vec<GeneratedImage>>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear_generated(&self) {
        self.generated.write().clear();
    }

    pub fn prepend_generated(&self, images: Vec<GeneratedImage>) {
        let mut generated = self.generated.write();
        let previous = std::mem::replace(&mut *generated, images);
        generated.extend(previous);
    }

    pub fn add_upload(&self, image: GeneratedImage) {
        self.uploads.write().insert(0, image);
    }

    pub fn find(&self, id: Uuid) -> Option<GeneratedImage> {
        let by_id = |image: &&GeneratedImage| image.id == id;
        if let Some(image) = self.generated.read().iter().find(by_id) {
            return Some(image.clone());
        }
        self.uploads.read().iter().find(by_id).cloned()
    }

    pub fn images(&self) -> Vec<GeneratedImage> {
        let mut images = self.generated.read().clone();
        images.extend(self.uploads.read().iter().cloned());
        images
    }
}

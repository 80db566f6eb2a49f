use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;

use crate::error::{StudioError, StudioResult};
use crate::preferences::{self, PreferenceStore};

/// The API key every remote call is made with.
///
/// Passed explicitly to the generation client; any call may invalidate it,
/// after which every new action fails fast until a key is selected again.
#[derive(Debug, Clone)]
pub struct CredentialContext {
    key: Arc<RwLock<Option<String>>>,
    store: Arc<PreferenceStore>,
    /// Held across the memory and store update so both see one order.
    update: Arc<Mutex<()>>,
}

/// A snapshot of the key taken when an action starts.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(****)")
    }
}

impl CredentialContext {
    /// Loads a stored key, or seeds the store with `initial` when none exists.
    pub async fn load(store: Arc<PreferenceStore>, initial: Option<String>) -> StudioResult<Self> {
        let stored = store.get(preferences::API_KEY);
        let key = match (stored, initial) {
            (Some(stored), _) => Some(stored),
            (None, Some(initial)) => {
                store
                    .set(preferences::API_KEY, &initial)
                    .await
                    .map_err(|err| StudioError::Storage(err.to_string()))?;
                Some(initial)
            }
            (None, None) => None,
        };
        Ok(Self {
            key: Arc::new(RwLock::new(key)),
            store,
            update: Arc::new(Mutex::new(())),
        })
    }

    pub fn is_selected(&self) -> bool {
        self.key.read().is_some()
    }

    /// The current key, or a credential error when none is selected.
    pub fn require(&self) -> StudioResult<ApiKey> {
        self.key
            .read()
            .clone()
            .map(ApiKey)
            .ok_or_else(|| StudioError::Credential("no API key selected".to_string()))
    }

    pub async fn replace(&self, value: &str) -> StudioResult<()> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(StudioError::validation("api key must not be empty"));
        }
        let _update = self.update.lock().await;
        *self.key.write() = Some(trimmed.to_string());
        self.store
            .set(preferences::API_KEY, trimmed)
            .await
            .map_err(|err| StudioError::Storage(err.to_string()))?;
        tracing::info!("api key selected");
        Ok(())
    }

    /// Clears the key in memory first so concurrent actions stop using it
    /// even if persisting the removal fails.
    pub async fn invalidate(&self) -> StudioResult<()> {
        let _update = self.update.lock().await;
        self.clear().await
    }

    /// Clears the key only if it is still the one `rejected` was taken from.
    ///
    /// Returns whether anything was cleared; a key selected after the
    /// rejected call started is kept.
    pub async fn invalidate_if(&self, rejected: &ApiKey) -> StudioResult<bool> {
        let _update = self.update.lock().await;
        let still_current = self.key.read().as_deref() == Some(rejected.expose());
        if !still_current {
            tracing::info!("rejected api key was already replaced; keeping the current one");
            return Ok(false);
        }
        self.clear().await?;
        Ok(true)
    }

    async fn clear(&self) -> StudioResult<()> {
        let had_key = self.key.write().take().is_some();
        if had_key {
            tracing::warn!("api key invalidated; a new key must be selected");
        }
        self.store
            .remove(preferences::API_KEY)
            .await
            .map_err(|err| StudioError::Storage(err.to_string()))
    }
}

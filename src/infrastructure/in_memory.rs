use crate::domain::ports::PreferenceStore;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory preference store.
///
/// Clones share the same underlying value, so a test can keep a handle and
/// inspect what the bridge persisted. Nothing survives the process.
#[derive(Default, Clone)]
pub struct InMemoryPreferenceStore {
    use_wallet: Arc<RwLock<Option<bool>>>,
}

impl InMemoryPreferenceStore {
    /// Creates a new, empty in-memory preference store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already remembers a wallet preference.
    pub fn with_wallet_preference(use_wallet: bool) -> Self {
        Self {
            use_wallet: Arc::new(RwLock::new(Some(use_wallet))),
        }
    }
}

#[async_trait]
impl PreferenceStore for InMemoryPreferenceStore {
    async fn wallet_preference(&self) -> Result<Option<bool>> {
        Ok(*self.use_wallet.read().await)
    }

    async fn store_wallet_preference(&self, use_wallet: bool) -> Result<()> {
        *self.use_wallet.write().await = Some(use_wallet);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.use_wallet.write().await = None;
        Ok(())
    }
}

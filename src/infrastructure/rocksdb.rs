use crate::domain::ports::PreferenceStore;
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use std::path::Path;
use std::sync::Arc;

/// Column Family holding the bridge's persisted preferences.
pub const CF_PREFERENCES: &str = "paybridge_preferences";
/// Key of the "user prefers wallet pay" flag.
pub const WALLET_PREFERENCE_KEY: &[u8] = b"use_wallet_pay";

/// A persistent preference store backed by RocksDB.
///
/// The flag survives process restarts. `Clone` shares the underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDBPreferenceStore {
    db: Arc<DB>,
}

impl RocksDBPreferenceStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the preferences column family exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_preferences = ColumnFamilyDescriptor::new(CF_PREFERENCES, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_preferences])?;

        Ok(Self { db: Arc::new(db) })
    }

    fn column_family(&self) -> Result<&rocksdb::ColumnFamily> {
        self.db.cf_handle(CF_PREFERENCES).ok_or_else(|| {
            BridgeError::InternalError(Box::new(std::io::Error::other(
                "Preferences column family not found",
            )))
        })
    }
}

#[async_trait]
impl PreferenceStore for RocksDBPreferenceStore {
    async fn wallet_preference(&self) -> Result<Option<bool>> {
        let cf = self.column_family()?;
        match self.db.get_cf(cf, WALLET_PREFERENCE_KEY)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn store_wallet_preference(&self, use_wallet: bool) -> Result<()> {
        let cf = self.column_family()?;
        let value = serde_json::to_vec(&use_wallet)?;
        self.db.put_cf(cf, WALLET_PREFERENCE_KEY, value)?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let cf = self.column_family()?;
        self.db.delete_cf(cf, WALLET_PREFERENCE_KEY)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBPreferenceStore::open(dir.path()).expect("Failed to open RocksDB");

        assert!(store.db.cf_handle(CF_PREFERENCES).is_some());
    }

    #[tokio::test]
    async fn test_rocksdb_preference_round_trip() {
        let dir = tempdir().unwrap();
        let store = RocksDBPreferenceStore::open(dir.path()).unwrap();

        assert_eq!(store.wallet_preference().await.unwrap(), None);
        store.store_wallet_preference(true).await.unwrap();
        assert_eq!(store.wallet_preference().await.unwrap(), Some(true));
        store.clear().await.unwrap();
        assert_eq!(store.wallet_preference().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rocksdb_preference_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = RocksDBPreferenceStore::open(dir.path()).unwrap();
            store.store_wallet_preference(false).await.unwrap();
        }
        let store = RocksDBPreferenceStore::open(dir.path()).unwrap();
        assert_eq!(store.wallet_preference().await.unwrap(), Some(false));
    }
}

//! Durable storage for trained models.
//!
//! Models are opaque blobs keyed by `(bin id, model kind)`; the feature
//! column list used at fit time is stored per bin alongside them. The store
//! takes no locks: concurrent training and prediction for the same bin may
//! race, and callers needing strict consistency must serialize per bin.

use crate::error::StoreError;
use crate::types::ModelKind;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

pub trait ModelStore {
    fn get_model(&self, bin_id: &str, kind: ModelKind) -> Result<Option<Vec<u8>>, StoreError>;
    fn put_model(&self, bin_id: &str, kind: ModelKind, blob: &[u8]) -> Result<(), StoreError>;
    fn get_feature_columns(&self, bin_id: &str) -> Result<Option<Vec<String>>, StoreError>;
    fn put_feature_columns(&self, bin_id: &str, columns: &[String]) -> Result<(), StoreError>;
}

/// Filesystem-backed store, one file per `(bin, kind)` pair plus one
/// feature-column file per bin.
#[derive(Debug, Clone)]
pub struct FsModelStore {
    dir: PathBuf,
}

impl FsModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn model_path(&self, bin_id: &str, kind: ModelKind) -> PathBuf {
        self.dir.join(format!("{bin_id}_{kind}.model"))
    }

    fn features_path(&self, bin_id: &str) -> PathBuf {
        self.dir.join(format!("{bin_id}_features.json"))
    }
}

fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl ModelStore for FsModelStore {
    fn get_model(&self, bin_id: &str, kind: ModelKind) -> Result<Option<Vec<u8>>, StoreError> {
        read_if_exists(&self.model_path(bin_id, kind))
    }

    fn put_model(&self, bin_id: &str, kind: ModelKind, blob: &[u8]) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.model_path(bin_id, kind);
        fs::write(&path, blob)?;
        debug!(path = %path.display(), bytes = blob.len(), "persisted model");
        Ok(())
    }

    fn get_feature_columns(&self, bin_id: &str) -> Result<Option<Vec<String>>, StoreError> {
        match read_if_exists(&self.features_path(bin_id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_feature_columns(&self, bin_id: &str, columns: &[String]) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let bytes = serde_json::to_vec(columns)?;
        fs::write(self.features_path(bin_id), bytes)?;
        Ok(())
    }
}

/// In-memory store, primarily a test double for the filesystem store.
#[derive(Debug, Default)]
pub struct MemoryModelStore {
    models: RwLock<HashMap<(String, ModelKind), Vec<u8>>>,
    columns: RwLock<HashMap<String, Vec<String>>>,
}

impl MemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModelStore for MemoryModelStore {
    fn get_model(&self, bin_id: &str, kind: ModelKind) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self.models.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(guard.get(&(bin_id.to_string(), kind)).cloned())
    }

    fn put_model(&self, bin_id: &str, kind: ModelKind, blob: &[u8]) -> Result<(), StoreError> {
        let mut guard = self.models.write().map_err(|_| StoreError::LockPoisoned)?;
        guard.insert((bin_id.to_string(), kind), blob.to_vec());
        Ok(())
    }

    fn get_feature_columns(&self, bin_id: &str) -> Result<Option<Vec<String>>, StoreError> {
        let guard = self.columns.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(guard.get(bin_id).cloned())
    }

    fn put_feature_columns(&self, bin_id: &str, columns: &[String]) -> Result<(), StoreError> {
        let mut guard = self.columns.write().map_err(|_| StoreError::LockPoisoned)?;
        guard.insert(bin_id.to_string(), columns.to_vec());
        Ok(())
    }
}

//! Filesystem Object Store
//!
//! Maps the CDMI tree onto a base directory:
//!
//! ```text
//! <base>/.cdmi_                    root record
//! <base>/a/                        container /a
//! <base>/.cdmi_a                   record of /a
//! <base>/a/f.txt                   body of data object /a/f.txt
//! <base>/a/.cdmi_f.txt             record of /a/f.txt
//! <base>/cdmi_objectid/<ID>        record of the entity with object id <ID>
//! ```
//!
//! Records hold the canonical JSON of the entity; the path entry itself is a
//! directory (containers, capabilities, domains) or a file holding the value.

use crate::domain::model::{
    normalize_path, split_path, CdmiObject, ObjectKind, OBJECT_ID_SEGMENT, ROOT_PATH,
};
use crate::domain::ports::{CreateOutcome, ObjectStore, StoreKind};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Staging files for atomic record writes; never a valid object id
const STAGING_PREFIX: &str = ".staging-";

/// Health check file. Stored as `<prefix><prefix>health`, the record name of
/// an object whose own name is reserved.
const HEALTH_FILE: &str = "health";

// =============================================================================
// Filesystem Store Configuration
// =============================================================================

/// Configuration for the filesystem store
#[derive(Debug, Clone)]
pub struct FilesystemStoreConfig {
    /// Directory the tree is rooted at
    pub base_directory: PathBuf,
    /// File name prefix of per-entity records
    pub record_prefix: String,
    /// Directory (under the base) holding identifier records
    pub object_id_directory: String,
    /// Whether to sync writes to disk
    pub sync_writes: bool,
}

impl Default for FilesystemStoreConfig {
    fn default() -> Self {
        Self {
            base_directory: PathBuf::from("/var/lib/cdmi"),
            record_prefix: ".cdmi_".to_string(),
            object_id_directory: OBJECT_ID_SEGMENT.to_string(),
            sync_writes: false,
        }
    }
}

// =============================================================================
// Filesystem Store
// =============================================================================

/// Object store backed by a directory tree
pub struct FilesystemStore {
    base_directory: PathBuf,
    id_directory: PathBuf,
    record_prefix: String,
    sync_writes: bool,
}

impl FilesystemStore {
    /// Create a store with default config
    pub async fn new() -> Result<Self> {
        Self::with_config(FilesystemStoreConfig::default()).await
    }

    /// Create a store rooted at `base_directory`
    pub async fn with_path(base_directory: impl Into<PathBuf>) -> Result<Self> {
        Self::with_config(FilesystemStoreConfig {
            base_directory: base_directory.into(),
            ..Default::default()
        })
        .await
    }

    /// Create a store with full config
    pub async fn with_config(config: FilesystemStoreConfig) -> Result<Self> {
        if config.record_prefix.is_empty() || config.record_prefix.contains('/') {
            return Err(Error::Configuration(format!(
                "invalid record prefix '{}'",
                config.record_prefix
            )));
        }

        let id_directory = config.base_directory.join(&config.object_id_directory);
        fs::create_dir_all(&id_directory).await?;

        debug!(
            base = %config.base_directory.display(),
            "Opened filesystem object store"
        );

        Ok(Self {
            base_directory: config.base_directory,
            id_directory,
            record_prefix: config.record_prefix,
            sync_writes: config.sync_writes,
        })
    }

    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    fn validate(&self, path: &str) -> Result<()> {
        if normalize_path(path)? != path {
            return Err(Error::invalid_path(path, "path is not normalised"));
        }
        if path
            .split('/')
            .any(|segment| segment.starts_with(&self.record_prefix))
        {
            return Err(Error::invalid_path(
                path,
                format!("names starting with '{}' are reserved", self.record_prefix),
            ));
        }
        Ok(())
    }

    /// Directory or body file of the entity at `path`
    fn data_path(&self, path: &str) -> PathBuf {
        let relative = path.trim_start_matches('/');
        if relative.is_empty() {
            self.base_directory.clone()
        } else {
            self.base_directory.join(relative)
        }
    }

    /// Record file of the entity at `path`, a sibling of its data path
    fn record_path(&self, path: &str) -> PathBuf {
        match split_path(path) {
            Some((parent, name)) => self
                .data_path(&parent)
                .join(format!("{}{}", self.record_prefix, name)),
            None => self.base_directory.join(&self.record_prefix),
        }
    }

    /// Identifier record, `None` if the id cannot name a file
    fn id_path(&self, object_id: &str) -> Option<PathBuf> {
        if object_id.is_empty() || !object_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(self.id_directory.join(object_id))
    }

    /// Replace `target` with `bytes` in one rename.
    ///
    /// The staging file lives in the identifier directory, on the same
    /// filesystem as every target, under a name no identifier can take.
    async fn write_file(&self, target: &Path, bytes: &[u8]) -> Result<()> {
        let staging = self
            .id_directory
            .join(format!("{}{}", STAGING_PREFIX, Uuid::new_v4().simple()));

        let written = async {
            let mut file = fs::File::create(&staging).await?;
            file.write_all(bytes).await?;
            if self.sync_writes {
                file.sync_all().await?;
            }
            fs::rename(&staging, target).await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Write the path record and the identifier record
    async fn write_records(&self, path: &str, object: &CdmiObject) -> Result<()> {
        let id_path = self.id_path(object.object_id()).ok_or_else(|| {
            Error::Malformed(format!("invalid object id '{}'", object.object_id()))
        })?;
        let bytes = object.to_vec()?;

        self.write_file(&self.record_path(path), &bytes).await?;
        self.write_file(&id_path, &bytes).await?;
        Ok(())
    }

    async fn read_record(file: &Path) -> Result<Option<CdmiObject>> {
        match fs::read(file).await {
            Ok(bytes) => CdmiObject::from_slice(&bytes).map(Some),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_if_exists(file: &Path) -> Result<()> {
        match fs::remove_file(file).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn body(object: &CdmiObject) -> &[u8] {
        match object {
            CdmiObject::DataObject(d) => d.value.as_bytes(),
            _ => &[],
        }
    }
}

#[async_trait]
impl ObjectStore for FilesystemStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Filesystem
    }

    async fn create(&self, path: &str, object: &CdmiObject) -> Result<CreateOutcome> {
        self.validate(path)?;

        let conflict = || Error::Conflict {
            key: path.to_string(),
        };

        if fs::try_exists(self.record_path(path)).await? {
            return Err(conflict());
        }

        if path != ROOT_PATH {
            let data = self.data_path(path);
            if let Some(parent) = data.parent() {
                if !fs::try_exists(parent).await? {
                    return Err(Error::not_found(
                        split_path(path).map(|(p, _)| p).unwrap_or_default(),
                    ));
                }
            }

            let created = if object.kind().holds_children() {
                fs::create_dir(&data).await
            } else {
                match fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&data)
                    .await
                {
                    Ok(mut file) => file.write_all(Self::body(object)).await,
                    Err(e) => Err(e),
                }
            };

            match created {
                Ok(()) => {}
                Err(e) if e.kind() == IoErrorKind::AlreadyExists => return Err(conflict()),
                Err(e) => return Err(e.into()),
            }
        }

        self.write_records(path, object).await?;
        debug!(path = %path, object_id = %object.object_id(), "Created object");
        Ok(CreateOutcome::Created)
    }

    async fn put(&self, path: &str, object: &CdmiObject) -> Result<()> {
        self.validate(path)?;

        if path != ROOT_PATH {
            let data = self.data_path(path);
            if object.kind().holds_children() {
                fs::create_dir_all(&data).await?;
            } else {
                if let Some(parent) = data.parent() {
                    fs::create_dir_all(parent).await?;
                }
                self.write_file(&data, Self::body(object)).await?;
            }
        }

        self.write_records(path, object).await?;
        debug!(path = %path, object_id = %object.object_id(), "Stored object");
        Ok(())
    }

    async fn get_by_path(&self, path: &str) -> Result<Option<CdmiObject>> {
        self.validate(path)?;
        Self::read_record(&self.record_path(path)).await
    }

    async fn get_by_id(&self, object_id: &str) -> Result<Option<CdmiObject>> {
        match self.id_path(object_id) {
            Some(file) => Self::read_record(&file).await,
            None => Ok(None),
        }
    }

    async fn delete_by_path(&self, path: &str) -> Result<Option<CdmiObject>> {
        self.validate(path)?;

        let object = match self.get_by_path(path).await? {
            Some(object) => object,
            None => return Ok(None),
        };

        if path != ROOT_PATH {
            let data = self.data_path(path);
            match fs::metadata(&data).await {
                Ok(meta) if meta.is_dir() => fs::remove_dir_all(&data).await?,
                Ok(_) => fs::remove_file(&data).await?,
                Err(e) if e.kind() == IoErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Self::remove_if_exists(&self.record_path(path)).await?;
        if let Some(id_path) = self.id_path(object.object_id()) {
            Self::remove_if_exists(&id_path).await?;
        }

        debug!(path = %path, object_id = %object.object_id(), "Deleted object");
        Ok(Some(object))
    }

    async fn delete_by_id(&self, object_id: &str) -> Result<Option<CdmiObject>> {
        let object = match self.get_by_id(object_id).await? {
            Some(object) => object,
            None => return Ok(None),
        };

        if let Some(path) = object.path() {
            let at_path = self.get_by_path(&path).await?;
            if at_path.as_ref().map(|o| o.object_id()) == Some(object_id) {
                return self.delete_by_path(&path).await;
            }
            warn!(object_id = %object_id, path = %path, "Identifier record has no matching path record");
        }

        if let Some(id_path) = self.id_path(object_id) {
            Self::remove_if_exists(&id_path).await?;
        }
        Ok(Some(object))
    }

    async fn contains(&self, path: &str) -> Result<bool> {
        self.validate(path)?;
        Ok(fs::try_exists(self.record_path(path)).await?)
    }

    async fn is_container(&self, path: &str) -> Result<bool> {
        self.validate(path)?;
        match fs::metadata(self.data_path(path)).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Ok(false),
            Err(e) if e.kind() == IoErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        Ok(self
            .get_by_path(path)
            .await?
            .map(|o| o.kind() == ObjectKind::Container)
            .unwrap_or(false))
    }

    async fn health_check(&self) -> Result<bool> {
        // Check that the base directory exists and is writable
        let check = self
            .base_directory
            .join(format!("{0}{0}{1}", self.record_prefix, HEALTH_FILE));
        match fs::write(&check, b"ok").await {
            Ok(_) => {
                let _ = fs::remove_file(&check).await;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }
}

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::services::naming::{STAGING_PREFIX, TRUSTED_PREFIX};

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct UploadResult {
    pub hash: String,
    pub size: u64,
    pub key: String,
}

/// Result of a size-bounded streaming write.
#[derive(Debug, Clone)]
pub enum StreamUpload {
    Complete(UploadResult),
    /// The stream outgrew the limit; bytes up to `written` may be on storage under the key.
    LimitExceeded { written: u64 },
    /// Reading the source failed (client went away, malformed body). Same leftovers as above.
    SourceFailed { written: u64 },
}

pub struct FileMetadata {
    pub last_modified: Option<DateTime<Utc>>,
    pub size: u64,
}

#[async_trait]
pub trait StorageService: Send + Sync {
    /// Streams `reader` into `key`, hashing on the fly and stopping before `max_size` is exceeded.
    async fn upload_stream_with_hash<'a>(
        &self,
        key: &str,
        reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
        max_size: u64,
    ) -> Result<StreamUpload>;
    async fn read_prefix(&self, key: &str, len: usize) -> Result<Vec<u8>>;
    async fn move_object(&self, source_key: &str, dest_key: &str) -> Result<()>;
    /// Deleting a key that is already gone succeeds.
    async fn delete_file(&self, key: &str) -> Result<()>;
    async fn file_exists(&self, key: &str) -> Result<bool>;
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>>;
    async fn get_object_metadata(&self, key: &str) -> Result<FileMetadata>;
    async fn health_check(&self) -> bool;
}

/// Storage area on the local filesystem. The root is never served and carries owner-only
/// permissions; stored files are written without any execute bit.
pub struct LocalStorageService {
    root: PathBuf,
}

impl LocalStorageService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the root plus the staging and trusted areas.
    pub async fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let storage = Self::new(root);
        for dir in [
            storage.root.clone(),
            storage.root.join(STAGING_PREFIX),
            storage.root.join(TRUSTED_PREFIX),
        ] {
            tokio::fs::create_dir_all(&dir).await?;
            restrict_dir(&dir).await?;
        }
        Ok(storage)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a key to a path under the root, refusing anything that could escape it.
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !is_plain {
            return Err(anyhow!("Invalid storage key: {:?}", key));
        }
        Ok(self.root.join(relative))
    }
}

#[cfg(unix)]
async fn restrict_dir(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn restrict_dir(_path: &Path) -> Result<()> {
    Ok(())
}

fn open_options() -> tokio::fs::OpenOptions {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    options
}

#[async_trait]
impl StorageService for LocalStorageService {
    async fn upload_stream_with_hash<'a>(
        &self,
        key: &str,
        mut reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
        max_size: u64,
    ) -> Result<StreamUpload> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // create_new: a name collision is an error, never an overwrite
        let mut file = open_options().open(&path).await?;
        let mut hasher = Sha256::new();
        let mut total_size: u64 = 0;
        let mut buffer = vec![0u8; CHUNK_SIZE];

        loop {
            let n = match reader.read(&mut buffer).await {
                Ok(n) => n,
                Err(e) => {
                    file.flush().await?;
                    tracing::debug!("Source stream for {} failed: {}", key, e);
                    return Ok(StreamUpload::SourceFailed {
                        written: total_size,
                    });
                }
            };
            if n == 0 {
                break;
            }

            if total_size + n as u64 > max_size {
                file.flush().await?;
                tracing::debug!(
                    "Stream for {} exceeded {} bytes, aborting write",
                    key,
                    max_size
                );
                return Ok(StreamUpload::LimitExceeded {
                    written: total_size,
                });
            }

            hasher.update(&buffer[..n]);
            file.write_all(&buffer[..n]).await?;
            total_size += n as u64;
        }

        file.flush().await?;
        file.sync_data().await?;

        Ok(StreamUpload::Complete(UploadResult {
            hash: hex::encode(hasher.finalize()),
            size: total_size,
            key: key.to_string(),
        }))
    }

    async fn read_prefix(&self, key: &str, len: usize) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        let file = tokio::fs::File::open(&path).await?;
        let mut prefix = Vec::with_capacity(len.min(CHUNK_SIZE));
        file.take(len as u64).read_to_end(&mut prefix).await?;
        Ok(prefix)
    }

    async fn move_object(&self, source_key: &str, dest_key: &str) -> Result<()> {
        let source = self.resolve(source_key)?;
        let dest = self.resolve(dest_key)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        if let Err(e) = tokio::fs::rename(&source, &dest).await {
            tracing::error!(
                "Storage move failed: source={}, dest={}, error={:?}",
                source_key,
                dest_key,
                e
            );
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete_file(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn file_exists(&self, key: &str) -> Result<bool> {
        let path = self.resolve(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        let dir = self.resolve(prefix)?;
        let mut objects = Vec::new();

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(objects),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file()
                && let Some(name) = entry.file_name().to_str()
            {
                objects.push(format!("{}/{}", prefix, name));
            }
        }

        objects.sort();
        Ok(objects)
    }

    async fn get_object_metadata(&self, key: &str) -> Result<FileMetadata> {
        let path = self.resolve(key)?;
        let metadata = tokio::fs::metadata(&path).await?;

        Ok(FileMetadata {
            last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            size: metadata.len(),
        })
    }

    async fn health_check(&self) -> bool {
        tokio::fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }
}

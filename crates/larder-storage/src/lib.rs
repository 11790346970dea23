use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

const MAX_KEY_ATTEMPTS: usize = 100;

/// `{millis}_{name}` becomes `{millis}_{n}_{name}`.
fn with_suffix(key: &str, n: usize) -> String {
    match key.split_once('_') {
        Some((millis, name)) => format!("{}_{}_{}", millis, n, name),
        None => format!("{}_{}", key, n),
    }
}

/// On-disk blob storage for recipe images.
///
/// Each blob is a flat file at `{storage_dir}/{key}`, where the key is the
/// upload time in milliseconds joined to a sanitized copy of the original
/// filename (`1718000000000_pancakes.jpg`).
pub struct BlobStorage {
    dir: PathBuf,
}

impl BlobStorage {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Image storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    /// Derive a storage key from the upload timestamp and original filename.
    pub fn key_for(filename: &str, uploaded_at: DateTime<Utc>) -> String {
        let name: String = filename
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
            .collect();
        let name = name.trim_start_matches('.');
        let name = if name.is_empty() { "image" } else { name };
        format!("{}_{}", uploaded_at.timestamp_millis(), name)
    }

    /// Keys never contain path separators or start with a dot.
    pub fn is_valid_key(key: &str) -> bool {
        !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    }

    /// Path to the file for a given key.
    pub fn file_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Store `data` under a fresh key derived from `filename`. Returns the key.
    ///
    /// Existing blobs are never overwritten: a key that is already taken gets
    /// a numeric suffix (`1718000000000_2_pancakes.jpg`).
    pub async fn put(&self, filename: &str, data: &[u8]) -> Result<String> {
        let base = Self::key_for(filename, Utc::now());

        for attempt in 0..MAX_KEY_ATTEMPTS {
            let key = if attempt == 0 {
                base.clone()
            } else {
                with_suffix(&base, attempt + 1)
            };

            let mut file = match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.file_path(&key))
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            };
            file.write_all(data).await?;
            file.flush().await?;

            info!("Stored image {} ({} bytes)", key, data.len());
            return Ok(key);
        }

        bail!("No free storage key for '{}'", base)
    }

    /// Read a blob. Returns `None` if the key is unknown.
    pub async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if !Self::is_valid_key(key) {
            bail!("Invalid storage key '{}'", key);
        }
        match fs::read(self.file_path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a blob. Deleting a missing blob succeeds.
    pub async fn delete(&self, key: &str) -> Result<()> {
        if !Self::is_valid_key(key) {
            bail!("Invalid storage key '{}'", key);
        }
        let path = self.file_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted image {}", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Image {} already gone", key);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tabula_common::{Result, TabulaError};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

pub mod config;

/// Byte store for uploaded files, rooted at a local directory
///
/// Keys are relative paths under the root. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Open the store, creating the root directory when missing
    pub async fn new(config: config::StorageConfig) -> Result<Self> {
        fs::create_dir_all(&config.root).await.map_err(|e| {
            TabulaError::Storage(format!(
                "failed to create storage root {}: {}",
                config.root.display(),
                e
            ))
        })?;

        info!("Storage initialized at {}", config.root.display());

        Ok(Self { root: config.root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    pub async fn upload(&self, key: &str, data: &[u8]) -> Result<UploadResult> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let checksum = calculate_sha256(data);
        let size = data.len() as i64;

        // Bytes land in a staging file first; only a complete write is renamed into place
        let staging = staging_path(&path);
        debug!("Writing {} bytes to {}", size, staging.display());
        if let Err(e) = write_then_rename(&staging, &path, data).await {
            if let Err(cleanup) = fs::remove_file(&staging).await {
                if cleanup.kind() != ErrorKind::NotFound {
                    warn!("Failed to remove staging file {}: {}", staging.display(), cleanup);
                }
            }
            return Err(TabulaError::Storage(format!(
                "failed to write blob '{}': {}",
                key, e
            )));
        }
        info!("Stored blob {}", key);

        Ok(UploadResult {
            key: key.to_string(),
            checksum,
            size,
        })
    }

    #[instrument(skip(self))]
    pub async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        let data = fs::read(&path).await.map_err(|e| {
            TabulaError::Storage(format!("failed to read blob '{}': {}", key, e))
        })?;

        debug!("Read {} bytes from {}", data.len(), path.display());

        Ok(data)
    }

    /// Remove a blob; a blob that is already gone is not an error
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted blob {}", key);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Blob {} already absent", key);
                Ok(())
            }
            Err(e) => Err(TabulaError::Storage(format!(
                "failed to delete blob '{}': {}",
                key, e
            ))),
        }
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.resolve(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    /// Unique stored name for an uploaded file: `{uuid}_{original}`
    pub fn build_key(&self, original_filename: &str) -> String {
        format!("{}_{}", Uuid::new_v4(), sanitize_filename(original_filename))
    }

    /// Map a key to a path under the root, rejecting anything that could leave it
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let is_contained = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));

        if !is_contained {
            return Err(TabulaError::Storage(format!("invalid storage key '{}'", key)));
        }

        Ok(self.root.join(relative))
    }
}

#[derive(Debug, Clone)]
pub struct UploadResult {
    pub key: String,
    pub checksum: String,
    pub size: i64,
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

async fn write_then_rename(staging: &Path, target: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(staging).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(staging, target).await
}

/// Keep only the final path segment and replace characters that are awkward on disk
fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| match c {
            c if c.is_control() => '_',
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();

    match cleaned.trim() {
        "" | "." | ".." => "upload".to_string(),
        trimmed => trimmed.to_string(),
    }
}

fn calculate_sha256(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn temp_storage() -> (Storage, TempDir) {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(config::StorageConfig::at(dir.path().join("blobs")))
            .await
            .unwrap();
        (storage, dir)
    }

    #[tokio::test]
    async fn test_upload_download_delete() {
        let (storage, _dir) = temp_storage().await;

        let result = storage.upload("a_people.csv", b"Hello, World!").await.unwrap();
        assert_eq!(result.key, "a_people.csv");
        assert_eq!(result.size, 13);
        assert_eq!(
            result.checksum,
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );

        assert!(storage.exists("a_people.csv").await.unwrap());
        assert_eq!(storage.download("a_people.csv").await.unwrap(), b"Hello, World!");

        storage.delete("a_people.csv").await.unwrap();
        assert!(!storage.exists("a_people.csv").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let (storage, _dir) = temp_storage().await;
        storage.delete("never-written.csv").await.unwrap();
    }

    #[tokio::test]
    async fn test_download_missing_is_storage_error() {
        let (storage, _dir) = temp_storage().await;
        let err = storage.download("missing.xlsx").await.unwrap_err();
        assert!(matches!(err, TabulaError::Storage(_)));
    }

    #[tokio::test]
    async fn test_keys_cannot_escape_root() {
        let (storage, _dir) = temp_storage().await;

        for key in ["../outside.csv", "/etc/passwd", "a/../../b.csv", ""] {
            let err = storage.upload(key, b"x").await.unwrap_err();
            assert!(matches!(err, TabulaError::Storage(_)), "key {key:?} was accepted");
        }
    }

    #[tokio::test]
    async fn test_build_key_is_unique_and_keeps_name() {
        let (storage, _dir) = temp_storage().await;

        let first = storage.build_key("report.xlsx");
        let second = storage.build_key("report.xlsx");

        assert_ne!(first, second);
        assert!(first.ends_with("_report.xlsx"));
        assert_eq!(first.len(), 36 + 1 + "report.xlsx".len());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_nothing_behind() {
        let (storage, _dir) = temp_storage().await;

        // A non-empty directory at the target makes the final rename fail after every byte is written
        let target = storage.root().join("blocked.csv");
        std::fs::create_dir_all(target.join("occupied")).unwrap();

        let err = storage.upload("blocked.csv", &vec![b'x'; 512 * 1024]).await.unwrap_err();
        assert!(matches!(err, TabulaError::Storage(_)));

        let mut entries: Vec<String> = std::fs::read_dir(storage.root())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        entries.sort();
        assert_eq!(entries, vec!["blocked.csv".to_string()]);
        assert!(target.is_dir());
    }

    #[tokio::test]
    async fn test_upload_replaces_existing_blob() {
        let (storage, _dir) = temp_storage().await;

        storage.upload("same.csv", b"first version").await.unwrap();
        storage.upload("same.csv", b"second").await.unwrap();

        assert_eq!(storage.download("same.csv").await.unwrap(), b"second");
        assert!(!storage.root().join("same.csv.partial").exists());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd.csv"), "passwd.csv");
        assert_eq!(sanitize_filename("C:\\Users\\me\\data.xls"), "data.xls");
        assert_eq!(sanitize_filename("what?.csv"), "what_.csv");
        assert_eq!(sanitize_filename(".."), "upload");
    }

    #[test]
    fn test_calculate_sha256() {
        assert_eq!(
            calculate_sha256(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}

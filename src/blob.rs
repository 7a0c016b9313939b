//! Published-media storage boundary.
//!
//! The decider only needs `put`/`delete` (and `read` for verification
//! tooling); production deployments put an object store behind this trait.
//! The filesystem implementation keeps the same URL shape the platform
//! uses: `deepmark/<username>/<random>.<ext>`.

use anyhow::{anyhow, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

pub trait BlobStore {
    /// Store a finished blob and return its media URL.
    fn put(&self, username: &str, extension: &str, bytes: &[u8]) -> Result<String>;

    /// Remove a stored blob. Deleting a missing blob is an error (the
    /// caller is compensating a failed ingest and should know).
    fn delete(&self, media_url: &str) -> Result<()>;

    /// Fetch a stored blob.
    fn read(&self, media_url: &str) -> Result<Vec<u8>>;
}

pub struct FilesystemBlobStore {
    root: PathBuf,
}

impl FilesystemBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn resolve(&self, media_url: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        for component in media_url.split('/') {
            if component.is_empty() || component == "." || component == ".." {
                return Err(anyhow!("malformed media url '{}'", media_url));
            }
            path.push(component);
        }
        Ok(path)
    }
}

impl BlobStore for FilesystemBlobStore {
    fn put(&self, username: &str, extension: &str, bytes: &[u8]) -> Result<String> {
        if extension.is_empty() || !extension.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(anyhow!("malformed blob extension '{}'", extension));
        }
        let media_url = format!("deepmark/{}/{}.{}", username, uuid::Uuid::new_v4(), extension);
        let path = self.resolve(&media_url)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_atomic(&path, bytes)?;
        Ok(media_url)
    }

    fn delete(&self, media_url: &str) -> Result<()> {
        let path = self.resolve(media_url)?;
        if !path.exists() {
            return Err(anyhow!("blob not found or already deleted: {}", media_url));
        }
        fs::remove_file(path)?;
        Ok(())
    }

    fn read(&self, media_url: &str) -> Result<Vec<u8>> {
        let path = self.resolve(media_url)?;
        Ok(fs::read(path)?)
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}

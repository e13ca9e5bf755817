//! File operations

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::errors::DeployError;

/// Owner read/write only
pub const MODE_SECRET: u32 = 0o600;

/// A file wrapper with path
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
}

impl File {
    /// Create a new file reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the file exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    /// Read file contents as string
    pub async fn read_string(&self) -> Result<String, DeployError> {
        Ok(fs::read_to_string(&self.path).await?)
    }

    /// Read file contents, `None` when the file does not exist
    pub async fn read_optional(&self) -> Result<Option<String>, DeployError> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write string to file
    pub async fn write_string(&self, contents: &str) -> Result<(), DeployError> {
        self.ensure_parent().await?;

        let mut file = fs::File::create(&self.path).await?;
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Delete the file. Returns whether anything was removed.
    pub async fn delete(&self) -> Result<bool, DeployError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Set file permissions to owner-read/write only (0o600) on Unix.
    ///
    /// A no-op on non-Unix platforms.
    pub async fn set_permissions_600(&self) -> Result<(), DeployError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let meta = fs::metadata(&self.path).await?;
            let mut perms = meta.permissions();
            perms.set_mode(MODE_SECRET);
            fs::set_permissions(&self.path, perms).await?;
        }
        Ok(())
    }

    /// Permission bits of the file (Unix only)
    #[cfg(unix)]
    pub async fn mode(&self) -> Result<u32, DeployError> {
        use std::os::unix::fs::PermissionsExt;
        let meta = fs::metadata(&self.path).await?;
        Ok(meta.permissions().mode() & 0o777)
    }

    /// Atomic write using a temporary file in the same directory
    pub async fn write_atomic(&self, contents: &[u8]) -> Result<(), DeployError> {
        self.write_atomic_inner(contents, None).await
    }

    /// Atomic write where the temporary file is created with `mode`, so the
    /// contents are never readable with wider permissions.
    pub async fn write_atomic_with_mode(&self, contents: &[u8], mode: u32) -> Result<(), DeployError> {
        self.write_atomic_inner(contents, Some(mode)).await
    }

    async fn write_atomic_inner(&self, contents: &[u8], mode: Option<u32>) -> Result<(), DeployError> {
        self.ensure_parent().await?;
        let temp_path = self.sibling_temp_path();

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            if let Some(mode) = mode {
                options.mode(mode);
            }
        }
        #[cfg(not(unix))]
        let _ = mode;

        let mut file = options.open(&temp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        // An existing target keeps the temp file's mode after rename, but
        // umask may have narrowed it at creation.
        if mode == Some(MODE_SECRET) {
            self.set_permissions_600().await?;
        }
        Ok(())
    }

    /// A hidden path next to this file, unique per call
    pub fn sibling_temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        self.path
            .with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
    }

    async fn ensure_parent(&self) -> Result<(), DeployError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }
}

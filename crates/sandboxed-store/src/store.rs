//! Core sandboxed store implementation.

use crate::{
    error::{Result, StoreError},
    security::{set_secure_permissions, validate_file_name, validate_path_within_sandbox},
};

use std::path::{Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

/// Hidden directory under the base directory holding staged writes.
pub const PARTIAL_DIR: &str = ".partial";

/// Flat-file store confined to a single directory.
#[derive(Clone, Debug)]
pub struct SandboxedStore {
    base_dir: PathBuf,
    partial_dir: PathBuf,
}

impl SandboxedStore {
    /// Create a new builder for configuring the store.
    #[must_use]
    pub fn builder() -> SandboxedStoreBuilder {
        SandboxedStoreBuilder::new()
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve `name` to its absolute path inside the store.
    ///
    /// # Errors
    /// Returns an error if the name is not a plain file name or resolves outside the sandbox.
    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_file_name(name)?;
        let path = self.base_dir.join(name);
        validate_path_within_sandbox(&path, &self.base_dir)?;
        Ok(path)
    }

    /// Write `contents` to a temporary file that becomes `name` on [`StagedFile::commit`].
    ///
    /// The temporary file is flushed to disk before this returns.
    ///
    /// # Errors
    /// Returns an error if the name is invalid or the temporary file cannot be written.
    pub async fn stage(&self, name: &str, contents: &[u8]) -> Result<StagedFile> {
        let final_path = self.path_for(name)?;
        let temp_path = self.partial_dir.join(format!("{}-{name}", Uuid::new_v4()));

        let staged = StagedFile {
            temp_path,
            final_path,
            name: name.to_string(),
            finished: false,
        };

        let mut file = fs::File::create(&staged.temp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);

        tracing::trace!(name, bytes = contents.len(), "Staged write");
        Ok(staged)
    }

    /// Stage and immediately commit `contents` under `name`.
    ///
    /// # Errors
    /// Returns an error if staging or the final rename fails.
    pub async fn write_atomic(&self, name: &str, contents: &[u8]) -> Result<PathBuf> {
        self.stage(name, contents).await?.commit().await
    }

    /// Read the entire contents of `name`.
    ///
    /// # Errors
    /// Returns [`StoreError::FileNotFound`] if the file does not exist, or an I/O error.
    pub async fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path_for(name)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::FileNotFound {
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Metadata of `name`, or `None` if it does not exist.
    ///
    /// # Errors
    /// Returns an error if the name is invalid or the stat fails for another reason.
    pub async fn metadata(&self, name: &str) -> Result<Option<std::fs::Metadata>> {
        let path = self.path_for(name)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(Some(meta)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// # Errors
    /// Returns an error if the name is invalid.
    pub async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.metadata(name).await?.is_some())
    }

    /// Remove `name`. Returns `false` if there was nothing to remove.
    ///
    /// # Errors
    /// Returns an error if the name is invalid or the removal fails.
    pub async fn remove_file(&self, name: &str) -> Result<bool> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// List the names of all regular files in the store. Staged writes are not listed.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be read.
    pub async fn list_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        let mut entries = fs::read_dir(&self.base_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str()
                && validate_file_name(name).is_ok()
            {
                files.push(name.to_string());
            }
        }

        files.sort();
        Ok(files)
    }

    /// Remove every leftover staged write, e.g. after a crash. Returns the number removed.
    ///
    /// # Errors
    /// Returns an error if the staging directory cannot be read.
    pub async fn purge_partials(&self) -> Result<usize> {
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.partial_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!(
                    path = %entry.path().display(),
                    "Failed to remove partial file: {}",
                    e
                ),
            }
        }

        if removed > 0 {
            tracing::info!("Removed {} stale partial file(s)", removed);
        }
        Ok(removed)
    }
}

/// A write that has reached disk under a temporary name.
///
/// Dropping a `StagedFile` without committing it removes the temporary file.
#[derive(Debug)]
pub struct StagedFile {
    temp_path: PathBuf,
    final_path: PathBuf,
    name: String,
    finished: bool,
}

impl StagedFile {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Read back the staged bytes as they are on disk.
    ///
    /// # Errors
    /// Returns an error if the temporary file cannot be read.
    pub async fn read_back(&self) -> Result<Vec<u8>> {
        Ok(fs::read(&self.temp_path).await?)
    }

    /// Move the staged file into place, replacing any existing file of the same name.
    ///
    /// # Errors
    /// Returns an error if the rename fails; the temporary file is then removed on drop.
    pub async fn commit(mut self) -> Result<PathBuf> {
        fs::rename(&self.temp_path, &self.final_path).await?;
        self.finished = true;
        tracing::trace!(name = %self.name, "Committed staged write");
        Ok(self.final_path.clone())
    }

    /// Remove the staged file without committing it.
    ///
    /// # Errors
    /// Returns an error if the temporary file cannot be removed.
    pub async fn discard(mut self) -> Result<()> {
        self.finished = true;
        match fs::remove_file(&self.temp_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.finished {
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}

/// Builder for configuring a [`SandboxedStore`].
pub struct SandboxedStoreBuilder {
    base_directory: Option<PathBuf>,
    secure_permissions: bool,
}

impl SandboxedStoreBuilder {
    fn new() -> Self {
        Self {
            base_directory: None,
            secure_permissions: true,
        }
    }

    /// Set the base directory for file storage.
    #[must_use]
    pub fn base_directory<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.base_directory = Some(path.into());
        self
    }

    /// Restrict the base directory to its owner (Unix only). Enabled by default.
    #[must_use]
    pub fn secure_permissions(mut self, enabled: bool) -> Self {
        self.secure_permissions = enabled;
        self
    }

    /// Build the `SandboxedStore`, creating the base and staging directories.
    ///
    /// # Errors
    /// Returns an error if:
    /// - Base directory is not set
    /// - Base or staging directory cannot be created or secured
    pub async fn build(self) -> Result<SandboxedStore> {
        let base_dir = self
            .base_directory
            .ok_or_else(|| StoreError::Configuration {
                message: "Base directory is required".to_string(),
            })?;

        fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| StoreError::DirectoryCreation {
                path: base_dir.clone(),
                source: e,
            })?;
        if self.secure_permissions {
            set_secure_permissions(&base_dir).await?;
        }

        let partial_dir = base_dir.join(PARTIAL_DIR);
        fs::create_dir_all(&partial_dir)
            .await
            .map_err(|e| StoreError::DirectoryCreation {
                path: partial_dir.clone(),
                source: e,
            })?;

        tracing::debug!(base_dir = %base_dir.display(), "SandboxedStore initialized");

        Ok(SandboxedStore {
            base_dir,
            partial_dir,
        })
    }
}

//! Temp Resource Manager
//!
//! Stages request payloads (images, templates) as files the engine can open
//! by path, and guarantees they are gone once the request is over.
//!
//! Names look like `<tmp_dir>/<prefix>_<20 random letters>`. Files are
//! created with `create_new`, so even an astronomically unlikely name
//! collision fails loudly instead of overwriting another request's upload.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

const SUFFIX_LEN: usize = 20;
const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Failure to create, write, read or delete a staged file
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to create {path}: {source}")]
    Create { path: PathBuf, source: io::Error },

    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to remove {path}: {source}")]
    Remove { path: PathBuf, source: io::Error },
}

impl StorageError {
    pub fn create(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Create { path: path.to_path_buf(), source }
    }

    pub fn write(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Write { path: path.to_path_buf(), source }
    }

    pub fn read(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Read { path: path.to_path_buf(), source }
    }

    pub fn remove(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Remove { path: path.to_path_buf(), source }
    }
}

/// Creates and removes request-scoped files under one directory
pub struct TempStager {
    dir: PathBuf,
    prefix: String,
    /// Seeded once; only used for names
    rng: Mutex<StdRng>,
}

impl TempStager {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self::with_rng(dir, prefix, StdRng::from_os_rng())
    }

    /// Stager with a fixed seed, for reproducible names
    pub fn with_seed(dir: impl Into<PathBuf>, prefix: impl Into<String>, seed: u64) -> Self {
        Self::with_rng(dir, prefix, StdRng::seed_from_u64(seed))
    }

    fn with_rng(dir: impl Into<PathBuf>, prefix: impl Into<String>, rng: StdRng) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            rng: Mutex::new(rng),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn random_suffix(&self) -> String {
        let mut rng = self.rng.lock();
        (0..SUFFIX_LEN)
            .map(|_| LETTERS[rng.random_range(0..LETTERS.len())] as char)
            .collect()
    }

    /// Fresh path `<dir>/<prefix>_<suffix>`; nothing is created
    pub fn next_path(&self) -> PathBuf {
        self.dir.join(format!("{}_{}", self.prefix, self.random_suffix()))
    }

    /// Create an empty staged file and return it with an open handle
    pub async fn create(&self) -> Result<(StagedFile, tokio::fs::File), StorageError> {
        let path = self.next_path();
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(StorageError::create(&path))?;

        Ok((StagedFile::new(path), file))
    }

    /// Persist `bytes` to a fresh staged file
    pub async fn stage(&self, bytes: &[u8]) -> Result<StagedFile, StorageError> {
        let (staged, mut file) = self.create().await?;

        file.write_all(bytes)
            .await
            .map_err(StorageError::write(staged.path()))?;
        file.flush().await.map_err(StorageError::write(staged.path()))?;

        tracing::debug!(path = %staged.path().display(), bytes = bytes.len(), "Staged file");
        Ok(staged)
    }

    /// Delete a staged file
    pub fn release(path: &Path) -> Result<(), StorageError> {
        std::fs::remove_file(path).map_err(StorageError::remove(path))
    }

    /// Output file and aux directory for one page of engine output
    pub fn scratch_page(&self) -> ScratchPage {
        let aux_dir = self.next_path();
        let mut output = aux_dir.clone().into_os_string();
        output.push(".txt");
        ScratchPage {
            output: PathBuf::from(output),
            aux_dir,
        }
    }
}

/// A staged file, removed when dropped
///
/// Call [`StagedFile::release`] to observe deletion errors; a drop only
/// logs them.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    released: bool,
}

impl StagedFile {
    fn new(path: PathBuf) -> Self {
        Self { path, released: false }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now
    pub fn release(mut self) -> Result<(), StorageError> {
        self.released = true;
        TempStager::release(&self.path)
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = TempStager::release(&self.path) {
            tracing::warn!(error = %e, "Failed to clean up staged file");
        }
    }
}

/// Per-page engine scratch space, removed when dropped
#[derive(Debug)]
pub struct ScratchPage {
    output: PathBuf,
    aux_dir: PathBuf,
}

impl ScratchPage {
    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn aux_dir(&self) -> &Path {
        &self.aux_dir
    }
}

impl Drop for ScratchPage {
    fn drop(&mut self) {
        // The engine may not have created either one.
        if let Err(e) = std::fs::remove_file(&self.output) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.output.display(), error = %e, "Failed to remove page output");
            }
        }
        if let Err(e) = std::fs::remove_dir_all(&self.aux_dir) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.aux_dir.display(), error = %e, "Failed to remove page aux dir");
            }
        }
    }
}

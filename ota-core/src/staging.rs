use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{OtaError, Result};

/// Temporary file holding a downloaded image until it is flashed.
#[derive(Debug, Clone)]
pub struct Staging {
    path: PathBuf,
}

impl Staging {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove a leftover file from a previous cycle
    pub fn prepare(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                log::info!("Removed stale update file {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn create(&self) -> Result<File> {
        Ok(File::create(&self.path)?)
    }

    /// Open the staged image for reading together with its size
    pub fn open(&self) -> Result<(File, u64)> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(OtaError::StagingMissing(self.path.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        let size = file.metadata()?.len();
        Ok((file, size))
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn discard(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                log::warn!("Failed to remove {}: {}", self.path.display(), e);
            }
        }
    }
}

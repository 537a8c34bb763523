use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::transfer::ContentLength;

pub type Result<T> = std::result::Result<T, OtaError>;

#[derive(Debug)]
pub enum OtaError {
    /// Server answered with something other than 200
    Http(u16),
    Io(io::Error),
    /// Wi-Fi dropped and could not be brought back
    Network(String),
    Incomplete {
        received: u64,
        expected: ContentLength,
    },
    EmptyImage,
    StagingMissing(PathBuf),
    Flash(String),
    ChecksumMismatch {
        expected: String,
        actual: String,
    },
    InvalidConfig(String),
}

impl OtaError {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtaError::Http(_) => "HTTP",
            OtaError::Io(_) => "IO",
            OtaError::Network(_) => "NETWORK",
            OtaError::Incomplete { .. } => "INCOMPLETE",
            OtaError::EmptyImage => "EMPTY_IMAGE",
            OtaError::StagingMissing(_) => "STAGING_MISSING",
            OtaError::Flash(_) => "FLASH",
            OtaError::ChecksumMismatch { .. } => "CHECKSUM",
            OtaError::InvalidConfig(_) => "CONFIG",
        }
    }
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OtaError::Http(status) => write!(f, "{}: unexpected status code {}", self.as_str(), status),
            OtaError::Io(e) => write!(f, "{}: {}", self.as_str(), e),
            OtaError::Network(msg) => write!(f, "{}: {}", self.as_str(), msg),
            OtaError::Incomplete { received, expected } => write!(
                f,
                "{}: received {} of {} bytes",
                self.as_str(),
                received,
                expected
            ),
            OtaError::EmptyImage => write!(f, "{}: firmware image has zero length", self.as_str()),
            OtaError::StagingMissing(path) => {
                write!(f, "{}: update file {} not found", self.as_str(), path.display())
            }
            OtaError::Flash(msg) => write!(f, "{}: {}", self.as_str(), msg),
            OtaError::ChecksumMismatch { expected, actual } => write!(
                f,
                "{}: expected sha256 {}, got {}",
                self.as_str(),
                expected,
                actual
            ),
            OtaError::InvalidConfig(msg) => write!(f, "{}: {}", self.as_str(), msg),
        }
    }
}

impl std::error::Error for OtaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OtaError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for OtaError {
    fn from(e: io::Error) -> Self {
        OtaError::Io(e)
    }
}

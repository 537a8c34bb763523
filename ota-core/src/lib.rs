//! OTA Core - Hardware-independent logic for the simple-ota firmware
//!
//! This crate contains the download loop, the flash-apply step and the
//! configuration model. Everything here runs on the host so it can be tested
//! without an ESP32 attached.

pub mod config;
pub mod digest;
pub mod error;
pub mod flash;
pub mod progress;
pub mod staging;
pub mod transfer;

pub use config::{OtaConfig, WriteStrategy};
pub use error::{OtaError, Result};
pub use flash::{apply_image, stream_image, ApplyReport, FirmwareSink};
pub use staging::Staging;
pub use transfer::{copy_stream, ContentLength, Link, Offline, TransferReport};

// Flash apply step - streams a staged image into the update partition

use std::io::{self, ErrorKind, Read, Write};

use crate::digest::Sha256Verifier;
use crate::error::{OtaError, Result};
use crate::transfer::{copy_stream, ContentLength, Link, TransferReport};

/// Target of a firmware write, normally the inactive OTA partition.
///
/// `complete` must make the image bootable; `abort` must leave the currently
/// running image untouched.
pub trait FirmwareSink {
    fn begin(&mut self, size: ContentLength) -> Result<()>;
    fn write(&mut self, chunk: &[u8]) -> Result<()>;
    fn complete(&mut self) -> Result<()>;
    fn abort(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyReport {
    pub bytes: u64,
}

/// Write exactly `size` bytes from `reader` into `sink`.
///
/// Returns `Ok` only once `sink.complete()` succeeded. On any failure after
/// `begin` the sink is aborted before the error is returned.
pub fn apply_image<R, S, F>(
    reader: &mut R,
    size: u64,
    sink: &mut S,
    buffer: &mut [u8],
    mut on_chunk: F,
) -> Result<ApplyReport>
where
    R: Read + ?Sized,
    S: FirmwareSink + ?Sized,
    F: FnMut(u64),
{
    if size == 0 {
        return Err(OtaError::EmptyImage);
    }
    if buffer.is_empty() {
        return Err(OtaError::InvalidConfig("flash buffer is empty".into()));
    }

    sink.begin(ContentLength::Known(size))?;

    match stream_into(reader, size, sink, buffer, &mut on_chunk) {
        Ok(bytes) => {
            sink.complete()?;
            Ok(ApplyReport { bytes })
        }
        Err(e) => {
            if let Err(abort_err) = sink.abort() {
                log::warn!("Abort after failed flash write also failed: {}", abort_err);
            }
            Err(e)
        }
    }
}

fn stream_into<R, S, F>(
    reader: &mut R,
    size: u64,
    sink: &mut S,
    buffer: &mut [u8],
    on_chunk: &mut F,
) -> Result<u64>
where
    R: Read + ?Sized,
    S: FirmwareSink + ?Sized,
    F: FnMut(u64),
{
    let mut written = 0u64;

    while written < size {
        let left = size - written;
        let want = buffer.len().min(usize::try_from(left).unwrap_or(usize::MAX));

        let n = match reader.read(&mut buffer[..want]) {
            Ok(0) => {
                return Err(OtaError::Incomplete {
                    received: written,
                    expected: ContentLength::Known(size),
                })
            }
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };

        sink.write(&buffer[..n])?;
        written += n as u64;
        on_chunk(written);
    }

    Ok(written)
}

/// Exposes a sink as a writer, optionally hashing what passes through
struct SinkWriter<'a, S: ?Sized> {
    sink: &'a mut S,
    verifier: Option<Sha256Verifier>,
    // Sink error behind the last failed write, returned instead of the io wrapper
    failure: Option<OtaError>,
}

impl<S: FirmwareSink + ?Sized> Write for SinkWriter<'_, S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Err(e) = self.sink.write(buf) {
            let msg = e.to_string();
            self.failure = Some(e);
            return Err(io::Error::new(ErrorKind::Other, msg));
        }
        if let Some(verifier) = self.verifier.as_mut() {
            verifier.update(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Write an HTTP body straight into `sink` without staging it first.
///
/// The length rules of [`copy_stream`] apply. When `sha256` is given the
/// digest is checked before `complete`, so a mismatching image is aborted
/// rather than made bootable.
pub fn stream_image<R, S, L, F>(
    reader: &mut R,
    expected: ContentLength,
    sink: &mut S,
    buffer: &mut [u8],
    link: &mut L,
    sha256: Option<&str>,
    on_chunk: F,
) -> Result<TransferReport>
where
    R: Read + ?Sized,
    S: FirmwareSink + ?Sized,
    L: Link + ?Sized,
    F: FnMut(u64),
{
    if expected == ContentLength::Known(0) {
        return Err(OtaError::EmptyImage);
    }

    sink.begin(expected)?;

    let mut writer = SinkWriter {
        sink: &mut *sink,
        verifier: sha256.map(|_| Sha256Verifier::new()),
        failure: None,
    };
    let result = copy_stream(reader, &mut writer, expected, buffer, link, on_chunk)
        .map_err(|e| writer.failure.take().unwrap_or(e))
        .and_then(|report| {
            if report.bytes == 0 {
                return Err(OtaError::EmptyImage);
            }
            if let (Some(verifier), Some(sum)) = (writer.verifier.take(), sha256) {
                verifier.verify(sum)?;
            }
            Ok(report)
        });

    match result {
        Ok(report) => {
            sink.complete()?;
            Ok(report)
        }
        Err(e) => {
            if let Err(abort_err) = sink.abort() {
                log::warn!("Abort after failed stream also failed: {}", abort_err);
            }
            Err(e)
        }
    }
}

/// Download copy loop
/// Moves bytes from an HTTP body into the staging writer one buffer at a time,
/// tracking how many bytes are still expected.
use std::fmt;
use std::io::{ErrorKind, Read, Write};

use crate::error::{OtaError, Result};

/// Length announced by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentLength {
    Known(u64),
    /// No Content-Length header, read until the connection closes
    Unknown,
}

impl ContentLength {
    pub fn from_header(value: Option<u64>) -> Self {
        match value {
            Some(len) => ContentLength::Known(len),
            None => ContentLength::Unknown,
        }
    }

    pub fn known(&self) -> Option<u64> {
        match self {
            ContentLength::Known(len) => Some(*len),
            ContentLength::Unknown => None,
        }
    }
}

impl fmt::Display for ContentLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentLength::Known(len) => write!(f, "{}", len),
            ContentLength::Unknown => write!(f, "unknown"),
        }
    }
}

/// Network link the transfer depends on.
pub trait Link {
    fn is_up(&mut self) -> bool;
    fn reconnect(&mut self) -> Result<()>;
}

/// For sources that do not need a network, e.g. the staging file.
pub struct Offline;

impl Link for Offline {
    fn is_up(&mut self) -> bool {
        true
    }

    fn reconnect(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    pub bytes: u64,
    pub expected: ContentLength,
    pub reconnects: u32,
}

/// Copy `reader` into `writer` until `expected` bytes arrived or the reader hits EOF.
///
/// Each iteration reads at most `buffer.len()` bytes. The link is checked before
/// every read and brought back up if it dropped. `on_chunk` gets the running total
/// after each write; the caller uses it to feed the watchdog and log progress.
pub fn copy_stream<R, W, L, F>(
    reader: &mut R,
    writer: &mut W,
    expected: ContentLength,
    buffer: &mut [u8],
    link: &mut L,
    mut on_chunk: F,
) -> Result<TransferReport>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
    L: Link + ?Sized,
    F: FnMut(u64),
{
    if buffer.is_empty() {
        return Err(OtaError::InvalidConfig("transfer buffer is empty".into()));
    }
    if expected == ContentLength::Known(0) {
        return Err(OtaError::EmptyImage);
    }

    let mut remaining = expected.known();
    let mut bytes = 0u64;
    let mut reconnects = 0u32;

    loop {
        if remaining == Some(0) {
            break;
        }

        if !link.is_up() {
            log::warn!("Link dropped after {} bytes, reconnecting...", bytes);
            link.reconnect()?;
            reconnects += 1;
        }

        // Never ask for more than is still expected
        let want = match remaining {
            Some(left) => buffer.len().min(usize::try_from(left).unwrap_or(usize::MAX)),
            None => buffer.len(),
        };

        let n = match reader.read(&mut buffer[..want]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };

        writer.write_all(&buffer[..n])?;
        bytes += n as u64;
        if let Some(left) = remaining.as_mut() {
            *left = left.saturating_sub(n as u64);
        }
        log::trace!("Read: {} bytes, remaining: {:?}", n, remaining);

        on_chunk(bytes);
    }

    writer.flush()?;

    if let ContentLength::Known(len) = expected {
        if bytes != len {
            return Err(OtaError::Incomplete { received: bytes, expected });
        }
    }

    Ok(TransferReport { bytes, expected, reconnects })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::{self, Cursor};

    /// Reader that hands out at most `step` bytes per call
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.step).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    /// Reader whose every other call fails with `Interrupted`
    struct Interrupting {
        inner: Cursor<Vec<u8>>,
        calls: u32,
    }

    impl Read for Interrupting {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.calls += 1;
            if self.calls % 2 == 1 {
                return Err(io::Error::new(ErrorKind::Interrupted, "signal"));
            }
            self.inner.read(buf)
        }
    }

    /// Link that drops once after `drop_after` checks
    struct FlakyLink {
        checks: u32,
        drop_after: u32,
        up: bool,
        fail_reconnect: bool,
    }

    impl FlakyLink {
        fn new(drop_after: u32) -> Self {
            Self { checks: 0, drop_after, up: true, fail_reconnect: false }
        }
    }

    impl Link for FlakyLink {
        fn is_up(&mut self) -> bool {
            self.checks += 1;
            if self.checks == self.drop_after {
                self.up = false;
            }
            self.up
        }

        fn reconnect(&mut self) -> Result<()> {
            if self.fail_reconnect {
                return Err(OtaError::Network("access point gone".into()));
            }
            self.up = true;
            Ok(())
        }
    }

    #[test]
    fn copies_known_length_exactly() {
        let data: Vec<u8> = (0..2000u32).map(|i| i as u8).collect();
        let mut reader = Cursor::new(data.clone());
        let mut out = Vec::new();
        let mut buf = [0u8; 512];

        let report = copy_stream(
            &mut reader,
            &mut out,
            ContentLength::Known(2000),
            &mut buf,
            &mut Offline,
            |_| {},
        )
        .unwrap();

        assert_eq!(report.bytes, 2000);
        assert_eq!(report.reconnects, 0);
        assert_eq!(out, data);
    }

    #[test]
    fn stops_at_content_length_even_if_more_bytes_follow() {
        let mut reader = Cursor::new(vec![7u8; 100]);
        let mut out = Vec::new();
        let mut buf = [0u8; 64];

        let report = copy_stream(
            &mut reader,
            &mut out,
            ContentLength::Known(70),
            &mut buf,
            &mut Offline,
            |_| {},
        )
        .unwrap();

        assert_eq!(report.bytes, 70);
        assert_eq!(out.len(), 70);
    }

    #[test]
    fn unknown_length_reads_until_eof() {
        let mut reader = Trickle { data: vec![1u8; 1234], pos: 0, step: 100 };
        let mut out = Vec::new();
        let mut buf = [0u8; 512];

        let report = copy_stream(
            &mut reader,
            &mut out,
            ContentLength::Unknown,
            &mut buf,
            &mut Offline,
            |_| {},
        )
        .unwrap();

        assert_eq!(report.bytes, 1234);
        assert_eq!(report.expected, ContentLength::Unknown);
    }

    #[test]
    fn interrupted_reads_are_retried() {
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 97) as u8).collect();
        let mut reader = Interrupting { inner: Cursor::new(data.clone()), calls: 0 };
        let mut out = Vec::new();
        let mut buf = [0u8; 128];

        let report = copy_stream(
            &mut reader,
            &mut out,
            ContentLength::Known(1000),
            &mut buf,
            &mut Offline,
            |_| {},
        )
        .unwrap();

        assert_eq!(report.bytes, 1000);
        assert_eq!(out, data);
        assert_eq!(reader.calls, 16);
    }

    #[test]
    fn other_read_errors_abort() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(ErrorKind::ConnectionReset, "reset by peer"))
            }
        }

        let mut out = Vec::new();
        let mut buf = [0u8; 128];

        let err = copy_stream(
            &mut Broken,
            &mut out,
            ContentLength::Known(1000),
            &mut buf,
            &mut Offline,
            |_| {},
        )
        .unwrap_err();

        assert!(matches!(err, OtaError::Io(_)));
        assert!(out.is_empty());
    }

    #[test]
    fn early_eof_is_incomplete() {
        let mut reader = Cursor::new(vec![0u8; 300]);
        let mut out = Vec::new();
        let mut buf = [0u8; 128];

        let err = copy_stream(
            &mut reader,
            &mut out,
            ContentLength::Known(500),
            &mut buf,
            &mut Offline,
            |_| {},
        )
        .unwrap_err();

        match err {
            OtaError::Incomplete { received, expected } => {
                assert_eq!(received, 300);
                assert_eq!(expected, ContentLength::Known(500));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn zero_length_is_rejected_before_reading() {
        let mut reader = Cursor::new(vec![0u8; 10]);
        let mut out = Vec::new();
        let mut buf = [0u8; 16];

        let err = copy_stream(
            &mut reader,
            &mut out,
            ContentLength::Known(0),
            &mut buf,
            &mut Offline,
            |_| {},
        )
        .unwrap_err();

        assert!(matches!(err, OtaError::EmptyImage));
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn reconnects_when_link_drops() {
        let mut reader = Trickle { data: vec![3u8; 1000], pos: 0, step: 100 };
        let mut out = Vec::new();
        let mut buf = [0u8; 512];
        let mut link = FlakyLink::new(4);

        let report = copy_stream(
            &mut reader,
            &mut out,
            ContentLength::Known(1000),
            &mut buf,
            &mut link,
            |_| {},
        )
        .unwrap();

        assert_eq!(report.reconnects, 1);
        assert_eq!(out.len(), 1000);
    }

    #[test]
    fn failed_reconnect_aborts_transfer() {
        let mut reader = Cursor::new(vec![3u8; 1000]);
        let mut out = Vec::new();
        let mut buf = [0u8; 100];
        let mut link = FlakyLink::new(2);
        link.fail_reconnect = true;

        let err = copy_stream(
            &mut reader,
            &mut out,
            ContentLength::Known(1000),
            &mut buf,
            &mut link,
            |_| {},
        )
        .unwrap_err();

        assert!(matches!(err, OtaError::Network(_)));
        assert_eq!(out.len(), 100);
    }

    #[test]
    fn on_chunk_sees_running_total() {
        let mut reader = Cursor::new(vec![0u8; 1024]);
        let mut out = Vec::new();
        let mut buf = [0u8; 256];
        let mut seen = Vec::new();

        copy_stream(
            &mut reader,
            &mut out,
            ContentLength::Known(1024),
            &mut buf,
            &mut Offline,
            |total| seen.push(total),
        )
        .unwrap();

        assert_eq!(seen, vec![256, 512, 768, 1024]);
    }

    #[test]
    fn empty_buffer_is_a_config_error() {
        let mut reader = Cursor::new(vec![0u8; 4]);
        let mut out = Vec::new();
        let mut buf: [u8; 0] = [];

        let err = copy_stream(
            &mut reader,
            &mut out,
            ContentLength::Unknown,
            &mut buf,
            &mut Offline,
            |_| {},
        )
        .unwrap_err();

        assert!(matches!(err, OtaError::InvalidConfig(_)));
    }

    proptest! {
        #[test]
        fn prop_bytes_preserved_for_any_buffer(
            data in proptest::collection::vec(any::<u8>(), 1..4096),
            buf_len in 1usize..700,
            step in 1usize..900,
        ) {
            let mut reader = Trickle { data: data.clone(), pos: 0, step };
            let mut out = Vec::new();
            let mut buf = vec![0u8; buf_len];

            let report = copy_stream(
                &mut reader,
                &mut out,
                ContentLength::Known(data.len() as u64),
                &mut buf,
                &mut Offline,
                |_| {},
            ).unwrap();

            prop_assert_eq!(report.bytes, data.len() as u64);
            prop_assert_eq!(out, data);
        }

        #[test]
        fn prop_never_writes_past_content_length(
            body_len in 1usize..3000,
            announced in 1u64..3000,
            buf_len in 1usize..600,
        ) {
            let mut reader = Cursor::new(vec![0xA5u8; body_len]);
            let mut out = Vec::new();
            let mut buf = vec![0u8; buf_len];

            let result = copy_stream(
                &mut reader,
                &mut out,
                ContentLength::Known(announced),
                &mut buf,
                &mut Offline,
                |_| {},
            );

            prop_assert!(out.len() as u64 <= announced);
            prop_assert_eq!(result.is_ok(), body_len as u64 >= announced);
        }
    }
}

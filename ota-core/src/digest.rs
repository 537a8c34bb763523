/// SHA-256 check of a staged image before it is flashed
use std::io::{ErrorKind, Read, Write};

use sha2::{Digest, Sha256};

use crate::error::{OtaError, Result};

#[derive(Default)]
pub struct Sha256Verifier {
    hasher: Sha256,
}

impl Sha256Verifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    pub fn finish_hex(self) -> String {
        to_hex(&self.hasher.finalize())
    }

    /// Compare against an expected hex digest, ignoring case
    pub fn verify(self, expected: &str) -> Result<()> {
        let actual = self.finish_hex();
        if actual.eq_ignore_ascii_case(expected.trim()) {
            Ok(())
        } else {
            Err(OtaError::ChecksumMismatch {
                expected: expected.trim().to_ascii_lowercase(),
                actual,
            })
        }
    }
}

/// Lets the verifier sit behind a tee while bytes stream elsewhere
impl Write for Sha256Verifier {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Hash everything `reader` yields and compare with `expected`
pub fn verify_reader<R: Read + ?Sized>(reader: &mut R, expected: &str, buffer: &mut [u8]) -> Result<()> {
    let mut verifier = Sha256Verifier::new();
    loop {
        match reader.read(buffer) {
            Ok(0) => break,
            Ok(n) => verifier.update(&buffer[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    verifier.verify(expected)
}

pub fn is_sha256_hex(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Progress reporting for long transfers
use crate::transfer::ContentLength;

const STEP_PERCENT: u8 = 10;

/// Decides when a progress line is worth logging.
///
/// The first chunk is always reported. After that a line is emitted every 10%
/// with a known length, or every `unknown_step_bytes` with an unknown one.
/// `verbose` reports every chunk.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total: ContentLength,
    verbose: bool,
    last_percent: Option<u8>,
    last_bytes: u64,
    unknown_step_bytes: u64,
}

impl ProgressTracker {
    pub fn new(total: ContentLength, verbose: bool) -> Self {
        Self {
            total,
            verbose,
            last_percent: None,
            last_bytes: 0,
            unknown_step_bytes: 64 * 1024,
        }
    }

    pub fn percent(&self, bytes: u64) -> Option<u8> {
        match self.total {
            ContentLength::Known(0) => Some(100),
            ContentLength::Known(total) => Some(((bytes.min(total) * 100) / total) as u8),
            ContentLength::Unknown => None,
        }
    }

    /// Returns a message when `bytes` crosses the next reporting step
    pub fn update(&mut self, bytes: u64) -> Option<String> {
        let percent = self.percent(bytes);

        let due = if self.verbose {
            true
        } else {
            match percent {
                Some(p) => {
                    let bucket = p / STEP_PERCENT;
                    self.last_percent.map_or(true, |last| bucket > last / STEP_PERCENT)
                }
                None => self.last_bytes == 0 || bytes >= self.last_bytes + self.unknown_step_bytes,
            }
        };

        if !due {
            return None;
        }

        self.last_percent = percent;
        self.last_bytes = bytes;

        Some(match percent {
            Some(p) => format!("{}% ({}/{})", p, bytes, self.total),
            None => format!("{} bytes", bytes),
        })
    }
}

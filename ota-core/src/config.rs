/// Configuration structures that can be tested independently
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::digest::is_sha256_hex;
use crate::error::{OtaError, Result};

pub const DEFAULT_STAGING_FILE: &str = "/spiffs/update.bin";
pub const DEFAULT_BUFFER_SIZE: usize = 512;
pub const MIN_BUFFER_SIZE: usize = 128;
pub const MAX_BUFFER_SIZE: usize = 16 * 1024;
pub const DEFAULT_PROBE_URL: &str = "http://clients3.google.com/generate_204";
pub const MAX_HTTP_TIMEOUT_MS: u64 = 30_000;
pub const LOG_LEVELS: &[&str] = &["off", "error", "warn", "warning", "info", "debug", "trace"];

/// How the downloaded image reaches the update partition
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum WriteStrategy {
    /// Download to the staging file, drop Wi-Fi, then flash from storage
    #[default]
    Staged,
    /// Write the HTTP body straight into the update partition
    Streaming,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OtaConfig {
    // WiFi settings
    pub wifi_ssid: String,
    pub wifi_password: String,

    // Download settings
    pub firmware_url: String,
    pub proxy_url: Option<String>,
    pub internet_probe_url: String,
    pub buffer_size: usize,

    // Update settings
    pub staging_file: String,
    pub strategy: WriteStrategy,
    pub expected_sha256: Option<String>,
    pub watchdog_timeout_secs: u32,

    // Logging
    pub log_level: String,
    pub verbose_progress: bool,
}

impl Default for OtaConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_password: String::new(),
            firmware_url: String::new(),
            proxy_url: None,
            internet_probe_url: DEFAULT_PROBE_URL.to_string(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            staging_file: DEFAULT_STAGING_FILE.to_string(),
            strategy: WriteStrategy::Staged,
            expected_sha256: None,
            watchdog_timeout_secs: 8,
            log_level: "info".to_string(),
            verbose_progress: false,
        }
    }
}

impl OtaConfig {
    /// URL the firmware is actually fetched from.
    ///
    /// With a proxy configured the request goes to
    /// `{proxy}/download-file?url={firmware_url}`.
    pub fn download_url(&self) -> String {
        match self.proxy_url.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            Some(proxy) => format!(
                "{}/download-file?url={}",
                proxy.trim_end_matches('/'),
                urlencoding::encode(&self.firmware_url)
            ),
            None => self.firmware_url.clone(),
        }
    }

    /// Timeout for one blocking HTTP call (connect, submit or a body read).
    ///
    /// Three quarters of the watchdog timeout, capped at 30 s, so a stalled
    /// request returns an error while the task is still being watched.
    pub fn http_timeout(&self) -> Duration {
        let watchdog_ms = u64::from(self.watchdog_timeout_secs.max(1)) * 1000;
        Duration::from_millis((watchdog_ms * 3 / 4).min(MAX_HTTP_TIMEOUT_MS))
    }

    pub fn validate(&self) -> Result<()> {
        if self.wifi_ssid.is_empty() {
            return Err(invalid("WiFi SSID cannot be empty"));
        }
        if self.wifi_ssid.len() > 32 {
            return Err(invalid("WiFi SSID longer than 32 bytes"));
        }
        if self.wifi_password.len() > 64 {
            return Err(invalid("WiFi password longer than 64 bytes"));
        }
        if !is_http_url(&self.firmware_url) {
            return Err(invalid(format!("firmware URL '{}' is not http(s)", self.firmware_url)));
        }
        if let Some(proxy) = self.proxy_url.as_deref().filter(|p| !p.trim().is_empty()) {
            if !is_http_url(proxy) {
                return Err(invalid(format!("proxy URL '{}' is not http(s)", proxy)));
            }
        }
        if !(MIN_BUFFER_SIZE..=MAX_BUFFER_SIZE).contains(&self.buffer_size) {
            return Err(invalid(format!(
                "buffer size {} outside {}..={}",
                self.buffer_size, MIN_BUFFER_SIZE, MAX_BUFFER_SIZE
            )));
        }
        if !self.staging_file.starts_with('/') {
            return Err(invalid(format!("staging file '{}' must be absolute", self.staging_file)));
        }
        if let Some(sum) = &self.expected_sha256 {
            if !is_sha256_hex(sum.trim()) {
                return Err(invalid("expected_sha256 must be 64 hex characters"));
            }
        }
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(invalid(format!("unknown log level '{}'", self.log_level)));
        }
        if self.watchdog_timeout_secs == 0 {
            return Err(invalid("watchdog timeout must be at least one second"));
        }
        Ok(())
    }

    /// Fill empty credentials and URL from compiled-in defaults.
    /// Returns true when anything changed.
    pub fn merge_missing(&mut self, defaults: &OtaConfig) -> bool {
        let mut changed = false;
        if self.wifi_ssid.is_empty() && !defaults.wifi_ssid.is_empty() {
            self.wifi_ssid = defaults.wifi_ssid.clone();
            self.wifi_password = defaults.wifi_password.clone();
            changed = true;
        }
        if self.firmware_url.is_empty() && !defaults.firmware_url.is_empty() {
            self.firmware_url = defaults.firmware_url.clone();
            changed = true;
        }
        if self.proxy_url.is_none() && defaults.proxy_url.is_some() {
            self.proxy_url = defaults.proxy_url.clone();
            changed = true;
        }
        changed
    }
}

fn is_http_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"));
    matches!(rest, Some(host) if !host.is_empty())
}

fn invalid(msg: impl Into<String>) -> OtaError {
    OtaError::InvalidConfig(msg.into())
}

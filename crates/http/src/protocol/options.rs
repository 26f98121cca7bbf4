//! Named options controlling how an exchange is processed.
//!
//! Every option has a neutral "unset" value (zero, or `None`) so per-call options
//! can be merged over client or server defaults with [`ProcessingOptions::merge`].
//! Options deserialize from camelCase keys, e.g. `{"timeoutMillis": 5000}`.

use serde::Deserialize;
use std::time::Duration;

/// Default maximum number of data bytes carried by one chunk.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 8 * 1024;

/// Largest payload a subsequent chunk can declare with its 3-byte length prefix
/// (the prefix also counts the version byte).
pub const MAX_BODY_CHUNK_SIZE: usize = 0xFF_FFFF - 1;

/// Largest envelope a lead chunk can declare with its 2-byte length prefix.
pub const MAX_LEAD_CHUNK_SIZE: usize = 0xFFFF;

/// Default limit on bytes buffered when a response body is read into memory.
pub const DEFAULT_RESPONSE_BODY_BUFFERING_SIZE_LIMIT: usize = 128 * 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessingOptions {
    timeout_millis: i64,
    max_chunk_size: usize,
    response_buffering_enabled: Option<bool>,
    response_body_buffering_size_limit: usize,
}

impl ProcessingOptions {
    pub fn new() -> Self {
        Default::default()
    }

    /// Non-positive values disable the timeout.
    pub fn with_timeout_millis(mut self, timeout_millis: i64) -> Self {
        self.timeout_millis = timeout_millis;
        self
    }

    pub fn with_max_chunk_size(mut self, max_chunk_size: usize) -> Self {
        self.max_chunk_size = max_chunk_size;
        self
    }

    pub fn with_response_buffering_enabled(mut self, enabled: bool) -> Self {
        self.response_buffering_enabled = Some(enabled);
        self
    }

    pub fn with_response_body_buffering_size_limit(mut self, limit: usize) -> Self {
        self.response_body_buffering_size_limit = limit;
        self
    }

    /// Fills every unset option of `self` from `fallback`.
    pub fn merge(&self, fallback: &ProcessingOptions) -> ProcessingOptions {
        ProcessingOptions {
            timeout_millis: if self.timeout_millis != 0 { self.timeout_millis } else { fallback.timeout_millis },
            max_chunk_size: if self.max_chunk_size != 0 { self.max_chunk_size } else { fallback.max_chunk_size },
            response_buffering_enabled: self.response_buffering_enabled.or(fallback.response_buffering_enabled),
            response_body_buffering_size_limit: if self.response_body_buffering_size_limit != 0 {
                self.response_body_buffering_size_limit
            } else {
                fallback.response_body_buffering_size_limit
            },
        }
    }

    pub fn timeout_millis(&self) -> i64 {
        self.timeout_millis
    }

    /// The timeout as a duration, `None` when disabled.
    pub fn timeout(&self) -> Option<Duration> {
        u64::try_from(self.timeout_millis).ok().filter(|millis| *millis > 0).map(Duration::from_millis)
    }

    /// Maximum data bytes per outgoing chunk, clamped to what the chunk prefix can express.
    pub fn max_chunk_size(&self) -> usize {
        match self.max_chunk_size {
            0 => DEFAULT_MAX_CHUNK_SIZE,
            n => n.min(MAX_BODY_CHUNK_SIZE),
        }
    }

    /// Largest chunk accepted while decoding.
    ///
    /// Never below the default so that peers using the default size always interoperate.
    pub fn chunk_size_limit(&self) -> usize {
        self.max_chunk_size().max(DEFAULT_MAX_CHUNK_SIZE)
    }

    pub fn response_buffering_enabled(&self) -> bool {
        self.response_buffering_enabled.unwrap_or(true)
    }

    pub fn response_body_buffering_size_limit(&self) -> usize {
        match self.response_body_buffering_size_limit {
            0 => DEFAULT_RESPONSE_BODY_BUFFERING_SIZE_LIMIT,
            n => n,
        }
    }
}

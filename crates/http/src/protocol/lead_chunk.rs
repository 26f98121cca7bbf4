//! The envelope sent once per exchange ahead of any body bytes.
//!
//! A lead chunk carries the request line or status line equivalents, the headers
//! and the metadata of the body that may follow. The same structure is embedded
//! in transfer PDUs on message-oriented transports.

use http::HeaderMap;

use crate::protocol::PayloadSize;

/// Current version of the lead chunk and subsequent chunk formats.
pub const LEAD_CHUNK_VERSION: u8 = 1;

/// Set when a body follows the lead chunk on the wire.
pub const FLAG_HAS_CONTENT: u8 = 0x01;

#[derive(Debug, Clone, PartialEq)]
pub struct LeadChunk {
    pub version: u8,
    pub flags: u8,
    pub request_target: Option<String>,
    pub status_code: u16,
    pub content_length: i64,
    pub method: Option<String>,
    pub http_version: Option<String>,
    pub http_status_message: Option<String>,
    pub content_type: Option<String>,
    pub headers: HeaderMap,
}

impl Default for LeadChunk {
    fn default() -> Self {
        Self {
            version: LEAD_CHUNK_VERSION,
            flags: 0,
            request_target: None,
            status_code: 0,
            content_length: 0,
            method: None,
            http_version: None,
            http_status_message: None,
            content_type: None,
            headers: HeaderMap::new(),
        }
    }
}

impl LeadChunk {
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns true if a body follows this lead chunk.
    #[inline]
    pub fn has_content(&self) -> bool {
        self.flags & FLAG_HAS_CONTENT != 0
    }

    pub fn set_has_content(&mut self, has_content: bool) {
        if has_content {
            self.flags |= FLAG_HAS_CONTENT;
        } else {
            self.flags &= !FLAG_HAS_CONTENT;
        }
    }

    /// Records the size of the body about to follow, keeping the has-content flag
    /// and the declared content length consistent.
    pub fn set_payload_size(&mut self, payload_size: PayloadSize) {
        self.set_has_content(!payload_size.is_empty());
        self.content_length = payload_size.content_length();
    }

    pub fn payload_size(&self) -> PayloadSize {
        if self.has_content() { PayloadSize::from_content_length(self.content_length) } else { PayloadSize::Empty }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_size_drives_flag() {
        let mut lead_chunk = LeadChunk::new();
        assert!(!lead_chunk.has_content());

        lead_chunk.set_payload_size(PayloadSize::Unknown);
        assert!(lead_chunk.has_content());
        assert_eq!(lead_chunk.content_length, -1);
        assert_eq!(lead_chunk.payload_size(), PayloadSize::Unknown);

        lead_chunk.set_payload_size(PayloadSize::Empty);
        assert!(!lead_chunk.has_content());
        assert_eq!(lead_chunk.payload_size(), PayloadSize::Empty);
    }
}

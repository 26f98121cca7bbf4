//! Quasi-http responses.

use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

use crate::protocol::body::SharedBody;
use crate::protocol::{LeadChunk, PayloadSize};

/// A response produced by the application or decoded by the client.
///
/// The status code is kept as a plain `u16` so non-standard codes survive a round
/// trip; [`StatusCode`] is used to classify it and to supply default reason phrases.
#[derive(Debug, Clone)]
pub struct QuasiResponse {
    status_code: u16,
    status_message: Option<String>,
    http_version: Option<String>,
    headers: HeaderMap,
    body: Option<SharedBody>,
}

impl Default for QuasiResponse {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

impl QuasiResponse {
    pub fn new(status: impl Into<StatusCode>) -> Self {
        Self::with_status_code(status.into().as_u16())
    }

    pub fn with_status_code(status_code: u16) -> Self {
        Self { status_code, status_message: None, http_version: None, headers: HeaderMap::new(), body: None }
    }

    pub fn with_status_message(mut self, status_message: impl Into<String>) -> Self {
        self.status_message = Some(status_message.into());
        self
    }

    pub fn with_http_version(mut self, http_version: impl Into<String>) -> Self {
        self.http_version = Some(http_version.into());
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: SharedBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// The explicit status message, or the canonical reason of the status code.
    pub fn status_message(&self) -> Option<&str> {
        self.status_message
            .as_deref()
            .or_else(|| StatusCode::from_u16(self.status_code).ok().and_then(|status| status.canonical_reason()))
    }

    pub fn is_success(&self) -> bool {
        StatusCode::from_u16(self.status_code).is_ok_and(|status| status.is_success())
    }

    pub fn is_client_error(&self) -> bool {
        StatusCode::from_u16(self.status_code).is_ok_and(|status| status.is_client_error())
    }

    pub fn http_version(&self) -> Option<&str> {
        self.http_version.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> Option<&SharedBody> {
        self.body.as_ref()
    }

    pub fn take_body(&mut self) -> Option<SharedBody> {
        self.body.take()
    }

    pub fn set_body(&mut self, body: Option<SharedBody>) {
        self.body = body;
    }

    pub(crate) fn to_lead_chunk(&self) -> LeadChunk {
        let mut lead_chunk = LeadChunk {
            status_code: self.status_code,
            http_status_message: self.status_message().map(str::to_string),
            http_version: self.http_version.clone(),
            headers: self.headers.clone(),
            ..LeadChunk::new()
        };
        match &self.body {
            Some(body) => {
                lead_chunk.set_payload_size(PayloadSize::from_content_length(body.content_length()));
                lead_chunk.content_type = body.content_type().map(str::to_string);
            }
            None => lead_chunk.set_payload_size(PayloadSize::Empty),
        }
        lead_chunk
    }

    pub(crate) fn from_lead_chunk(lead_chunk: LeadChunk, body: Option<SharedBody>) -> Self {
        Self {
            status_code: lead_chunk.status_code,
            status_message: lead_chunk.http_status_message,
            http_version: lead_chunk.http_version,
            headers: lead_chunk.headers,
            body,
        }
    }
}

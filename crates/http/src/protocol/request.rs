//! Quasi-http requests.

use http::{HeaderMap, HeaderName, HeaderValue};

use crate::protocol::body::SharedBody;
use crate::protocol::{LeadChunk, PayloadSize};

/// A request as seen by the client and by the application.
///
/// Unlike `http::Request`, the method and target are free-form strings: the protocol
/// does not interpret them. `http::Method` values convert through `AsRef<str>`.
#[derive(Debug, Clone)]
pub struct QuasiRequest {
    method: String,
    target: String,
    http_version: Option<String>,
    headers: HeaderMap,
    body: Option<SharedBody>,
}

impl QuasiRequest {
    pub fn new(method: impl AsRef<str>, target: impl Into<String>) -> Self {
        Self {
            method: method.as_ref().to_string(),
            target: target.into(),
            http_version: None,
            headers: HeaderMap::new(),
            body: None,
        }
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

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn target(&self) -> &str {
        &self.target
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
            request_target: Some(self.target.clone()),
            method: Some(self.method.clone()),
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
            method: lead_chunk.method.unwrap_or_default(),
            target: lead_chunk.request_target.unwrap_or_default(),
            http_version: lead_chunk.http_version,
            headers: lead_chunk.headers,
            body,
        }
    }
}

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use bytes::{Buf, Bytes};

use crate::protocol::QuasiHttpError;
use crate::protocol::body::{BodyGate, QuasiBody};

/// A body over bytes already in memory.
#[derive(Debug)]
pub struct BytesBody {
    gate: BodyGate,
    content_length: i64,
    content_type: Option<String>,
    remaining: Mutex<Bytes>,
}

impl BytesBody {
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            gate: BodyGate::new(),
            content_length: i64::try_from(data.len()).unwrap_or(i64::MAX),
            content_type: None,
            remaining: Mutex::new(data),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Reports a content length of `-1`, for bytes whose length was never declared.
    pub fn with_unknown_length(mut self) -> Self {
        self.content_length = -1;
        self
    }

    /// Bytes not read yet.
    pub fn remaining(&self) -> usize {
        self.remaining.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl QuasiBody for BytesBody {
    fn content_length(&self) -> i64 {
        self.content_length
    }

    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    async fn read_bytes(&self, buf: &mut [u8]) -> Result<usize, QuasiHttpError> {
        self.gate
            .read(async {
                let mut remaining = self.remaining.lock().unwrap_or_else(PoisonError::into_inner);
                let len = remaining.len().min(buf.len());
                buf[..len].copy_from_slice(&remaining[..len]);
                remaining.advance(len);
                Ok(len)
            })
            .await
    }

    async fn end_read(&self, error: Option<QuasiHttpError>) {
        if self.gate.end(error) {
            self.remaining.lock().unwrap_or_else(PoisonError::into_inner).clear();
        }
    }
}

impl From<Bytes> for BytesBody {
    fn from(bytes: Bytes) -> Self {
        Self::new(bytes)
    }
}

impl From<Vec<u8>> for BytesBody {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<String> for BytesBody {
    fn from(data: String) -> Self {
        Self::new(data)
    }
}

impl From<&'static str> for BytesBody {
    fn from(data: &'static str) -> Self {
        Self::new(data)
    }
}

impl From<&'static [u8]> for BytesBody {
    fn from(data: &'static [u8]) -> Self {
        Self::new(data)
    }
}

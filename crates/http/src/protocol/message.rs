use bytes::{Buf, Bytes};

/// Represents a quasi-http message that can either be a lead chunk or payload.
///
/// The generic parameter `T` is the envelope type (normally a [`LeadChunk`](crate::protocol::LeadChunk)),
/// while `Data` represents the type of the payload data (defaults to `Bytes`).
pub enum Message<T, Data: Buf = Bytes> {
    /// Contains the envelope of type `T`
    Header(T),
    /// Contains a chunk of payload data or EOF marker
    Payload(PayloadItem<Data>),
}

/// Represents an item in the body stream.
///
/// This enum is produced by the chunk decoder: either a data chunk
/// or the end of the body (the zero-length sentinel chunk on the wire).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    /// A chunk of payload data
    Chunk(Data),
    /// Marks the end of the payload stream
    Eof,
}

/// Represents the size information of a body.
///
/// - Known length: the content length declared in the lead chunk
/// - Unknown: content length `-1`, the body ends with the end-of-body chunk
/// - Empty: no body follows the lead chunk
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// Payload with known length in bytes
    Length(u64),
    /// Payload of unknown length
    Unknown,
    /// Empty payload (no body)
    Empty,
}

impl PayloadSize {
    /// Size of a body present on the wire, from its declared content length.
    ///
    /// Negative lengths mean unknown.
    pub fn from_content_length(content_length: i64) -> Self {
        u64::try_from(content_length).map(PayloadSize::Length).unwrap_or(PayloadSize::Unknown)
    }

    /// The content length to declare in a lead chunk.
    pub fn content_length(&self) -> i64 {
        match self {
            PayloadSize::Length(n) => i64::try_from(*n).unwrap_or(i64::MAX),
            PayloadSize::Unknown => -1,
            PayloadSize::Empty => 0,
        }
    }

    /// Returns true if the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty)
    }
}

impl<D: Buf> PayloadItem<D> {
    /// Returns true if this item represents the end of the payload stream
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    /// Returns true if this item contains chunk data
    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }
}

impl PayloadItem {
    /// Returns a reference to the contained bytes if this is a Chunk
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}

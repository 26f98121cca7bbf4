use bytes::Bytes;

use crate::protocol::{LeadChunk, QuasiHttpError};

/// The body a chunk-get or chunk-ret refers to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BodyDirection {
    Request,
    Response,
}

/// Wire code of a [`TransferPdu`].
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PduType {
    Request = 1,
    Response = 2,
    Fin = 3,
    RequestChunkGet = 4,
    RequestChunkRet = 5,
    ResponseChunkGet = 6,
    ResponseChunkRet = 7,
}

impl TryFrom<u8> for PduType {
    type Error = QuasiHttpError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let pdu_type = match value {
            1 => PduType::Request,
            2 => PduType::Response,
            3 => PduType::Fin,
            4 => PduType::RequestChunkGet,
            5 => PduType::RequestChunkRet,
            6 => PduType::ResponseChunkGet,
            7 => PduType::ResponseChunkRet,
            other => return Err(QuasiHttpError::malformed_envelope(format!("unknown pdu type {other}"))),
        };
        Ok(pdu_type)
    }
}

/// One message of the message-oriented transfer protocols.
///
/// Requests and responses carry a lead chunk and, when the whole body fits in the
/// same message, its bytes inline. Larger bodies are pulled with chunk-get /
/// chunk-ret round trips; an empty chunk-ret ends the body.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferPdu {
    Request { lead_chunk: LeadChunk, inline_data: Option<Bytes> },
    Response { lead_chunk: LeadChunk, inline_data: Option<Bytes> },
    Fin,
    ChunkGet { direction: BodyDirection, sequence_number: u32, max_len: u32 },
    ChunkRet { direction: BodyDirection, sequence_number: u32, data: Bytes },
}

impl TransferPdu {
    pub fn pdu_type(&self) -> PduType {
        match self {
            TransferPdu::Request { .. } => PduType::Request,
            TransferPdu::Response { .. } => PduType::Response,
            TransferPdu::Fin => PduType::Fin,
            TransferPdu::ChunkGet { direction: BodyDirection::Request, .. } => PduType::RequestChunkGet,
            TransferPdu::ChunkGet { direction: BodyDirection::Response, .. } => PduType::ResponseChunkGet,
            TransferPdu::ChunkRet { direction: BodyDirection::Request, .. } => PduType::RequestChunkRet,
            TransferPdu::ChunkRet { direction: BodyDirection::Response, .. } => PduType::ResponseChunkRet,
        }
    }
}

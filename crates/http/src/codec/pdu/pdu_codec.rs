//! Binary layout of a [`TransferPdu`]:
//!
//! ```text
//! [version u8][pdu type u8][flags u8][sequence u32][requested length u32][envelope length u16][envelope][data]
//! ```
//!
//! Integers are big-endian. Flag bit 0 tells whether data is present, which keeps an
//! inlined empty body distinct from no inline body at all. The envelope is the CSV
//! lead chunk envelope and is only present for requests and responses.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::codec::header::envelope::{deserialize_envelope, serialize_envelope};
use crate::codec::pdu::{BodyDirection, PduType, TransferPdu};
use crate::ensure;
use crate::protocol::{LEAD_CHUNK_VERSION, LeadChunk, MAX_LEAD_CHUNK_SIZE, QuasiHttpError};

/// Fixed bytes in front of a PDU's envelope and data.
pub const PDU_HEADER_LEN: usize = 13;

const FLAG_DATA_PRESENT: u8 = 0x01;

/// Encodes and decodes transfer PDUs.
///
/// Message transports preserve message boundaries, so the decoder treats the whole
/// buffer as one PDU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PduCodec;

impl PduCodec {
    pub fn encode_pdu(pdu: TransferPdu) -> Result<Bytes, QuasiHttpError> {
        let mut dst = BytesMut::new();
        PduCodec.encode(pdu, &mut dst)?;
        Ok(dst.freeze())
    }

    pub fn decode_pdu(data: &[u8]) -> Result<TransferPdu, QuasiHttpError> {
        let mut src = BytesMut::from(data);
        PduCodec.decode(&mut src)?.ok_or_else(|| QuasiHttpError::malformed_envelope("empty pdu"))
    }
}

fn put_header(dst: &mut BytesMut, pdu_type: PduType, has_data: bool, sequence_number: u32, requested: u32, envelope_len: u16) {
    dst.put_u8(LEAD_CHUNK_VERSION);
    dst.put_u8(pdu_type as u8);
    dst.put_u8(if has_data { FLAG_DATA_PRESENT } else { 0 });
    dst.put_u32(sequence_number);
    dst.put_u32(requested);
    dst.put_u16(envelope_len);
}

fn put_lead_chunk(dst: &mut BytesMut, pdu_type: PduType, lead_chunk: &LeadChunk, inline_data: Option<&Bytes>) -> Result<(), QuasiHttpError> {
    let envelope = serialize_envelope(lead_chunk)?;
    ensure!(
        envelope.len() <= MAX_LEAD_CHUNK_SIZE,
        QuasiHttpError::chunk_size_exceeded(envelope.len(), MAX_LEAD_CHUNK_SIZE)
    );

    let data_len = inline_data.map(Bytes::len).unwrap_or(0);
    dst.reserve(PDU_HEADER_LEN + envelope.len() + data_len);
    put_header(dst, pdu_type, inline_data.is_some(), 0, 0, envelope.len() as u16);
    dst.put_slice(&envelope);
    if let Some(data) = inline_data {
        dst.put_slice(data);
    }
    Ok(())
}

impl Encoder<TransferPdu> for PduCodec {
    type Error = QuasiHttpError;

    fn encode(&mut self, item: TransferPdu, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let pdu_type = item.pdu_type();
        match item {
            TransferPdu::Request { lead_chunk, inline_data } | TransferPdu::Response { lead_chunk, inline_data } => {
                put_lead_chunk(dst, pdu_type, &lead_chunk, inline_data.as_ref())?;
            }
            TransferPdu::Fin => {
                dst.reserve(PDU_HEADER_LEN);
                put_header(dst, pdu_type, false, 0, 0, 0);
            }
            TransferPdu::ChunkGet { sequence_number, max_len, .. } => {
                dst.reserve(PDU_HEADER_LEN);
                put_header(dst, pdu_type, false, sequence_number, max_len, 0);
            }
            TransferPdu::ChunkRet { sequence_number, data, .. } => {
                dst.reserve(PDU_HEADER_LEN + data.len());
                put_header(dst, pdu_type, !data.is_empty(), sequence_number, 0, 0);
                dst.put_slice(&data);
            }
        }
        trace!(?pdu_type, len = dst.len(), "encoded pdu");
        Ok(())
    }
}

impl Decoder for PduCodec {
    type Item = TransferPdu;
    type Error = QuasiHttpError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        ensure!(
            src.len() >= PDU_HEADER_LEN,
            QuasiHttpError::malformed_envelope(format!("pdu of {} bytes is shorter than its header", src.len()))
        );

        let version = src.get_u8();
        ensure!(version == LEAD_CHUNK_VERSION, QuasiHttpError::malformed_envelope(format!("unsupported pdu version {version}")));
        let pdu_type = PduType::try_from(src.get_u8())?;
        let has_data = src.get_u8() & FLAG_DATA_PRESENT != 0;
        let sequence_number = src.get_u32();
        let requested = src.get_u32();
        let envelope_len = src.get_u16() as usize;
        ensure!(
            envelope_len <= src.len(),
            QuasiHttpError::malformed_envelope(format!("pdu envelope of {envelope_len} bytes exceed the message"))
        );

        let envelope = src.split_to(envelope_len);
        let data = src.split().freeze();
        trace!(?pdu_type, envelope_len, data_len = data.len(), "decoded pdu");

        let lead_chunk = || {
            ensure!(!envelope.is_empty(), QuasiHttpError::malformed_envelope("pdu lacks its lead chunk"));
            deserialize_envelope(&envelope)
        };
        let inline_data = if has_data { Some(data.clone()) } else { None };

        let pdu = match pdu_type {
            PduType::Request => TransferPdu::Request { lead_chunk: lead_chunk()?, inline_data },
            PduType::Response => TransferPdu::Response { lead_chunk: lead_chunk()?, inline_data },
            PduType::Fin => TransferPdu::Fin,
            PduType::RequestChunkGet => {
                TransferPdu::ChunkGet { direction: BodyDirection::Request, sequence_number, max_len: requested }
            }
            PduType::ResponseChunkGet => {
                TransferPdu::ChunkGet { direction: BodyDirection::Response, sequence_number, max_len: requested }
            }
            PduType::RequestChunkRet => TransferPdu::ChunkRet { direction: BodyDirection::Request, sequence_number, data },
            PduType::ResponseChunkRet => TransferPdu::ChunkRet { direction: BodyDirection::Response, sequence_number, data },
        };
        Ok(Some(pdu))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PayloadSize;
    use http::HeaderValue;

    fn request_lead_chunk() -> LeadChunk {
        let mut lead_chunk = LeadChunk {
            method: Some("POST".into()),
            request_target: Some("/echo".into()),
            http_version: Some("1.1".into()),
            ..LeadChunk::new()
        };
        lead_chunk.set_payload_size(PayloadSize::Length(5));
        lead_chunk.headers.insert("x-request-id", HeaderValue::from_static("42"));
        lead_chunk
    }

    #[test]
    fn request_with_inline_body() {
        let pdu = TransferPdu::Request { lead_chunk: request_lead_chunk(), inline_data: Some(Bytes::from_static(b"hello")) };
        let encoded = PduCodec::encode_pdu(pdu.clone()).unwrap();
        assert_eq!(encoded[1], PduType::Request as u8);
        assert_eq!(encoded[2], FLAG_DATA_PRESENT);
        assert_eq!(PduCodec::decode_pdu(&encoded).unwrap(), pdu);
    }

    #[test]
    fn inline_empty_body_stays_distinct() {
        let with_empty = TransferPdu::Response { lead_chunk: LeadChunk::new(), inline_data: Some(Bytes::new()) };
        let without = TransferPdu::Response { lead_chunk: LeadChunk::new(), inline_data: None };

        assert_eq!(PduCodec::decode_pdu(&PduCodec::encode_pdu(with_empty.clone()).unwrap()).unwrap(), with_empty);
        assert_eq!(PduCodec::decode_pdu(&PduCodec::encode_pdu(without.clone()).unwrap()).unwrap(), without);
    }

    #[test]
    fn chunk_get_layout() {
        let pdu = TransferPdu::ChunkGet { direction: BodyDirection::Response, sequence_number: 3, max_len: 8192 };
        let encoded = PduCodec::encode_pdu(pdu.clone()).unwrap();
        assert_eq!(&encoded[..], &[1, 6, 0, 0, 0, 0, 3, 0, 0, 0x20, 0, 0, 0]);
        assert_eq!(PduCodec::decode_pdu(&encoded).unwrap(), pdu);
    }

    #[test]
    fn chunk_ret_and_fin() {
        let pdu = TransferPdu::ChunkRet { direction: BodyDirection::Request, sequence_number: 9, data: Bytes::from_static(b"part") };
        let encoded = PduCodec::encode_pdu(pdu.clone()).unwrap();
        assert_eq!(encoded.len(), PDU_HEADER_LEN + 4);
        assert_eq!(PduCodec::decode_pdu(&encoded).unwrap(), pdu);

        let end = TransferPdu::ChunkRet { direction: BodyDirection::Request, sequence_number: 10, data: Bytes::new() };
        assert_eq!(PduCodec::decode_pdu(&PduCodec::encode_pdu(end.clone()).unwrap()).unwrap(), end);

        let fin = PduCodec::encode_pdu(TransferPdu::Fin).unwrap();
        assert_eq!(PduCodec::decode_pdu(&fin).unwrap(), TransferPdu::Fin);
    }

    #[test]
    fn rejects_malformed_pdus() {
        assert!(matches!(PduCodec::decode_pdu(&[1, 2, 0]), Err(QuasiHttpError::MalformedEnvelope { .. })));
        assert!(matches!(PduCodec::decode_pdu(&[1, 9, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]), Err(QuasiHttpError::MalformedEnvelope { .. })));
        assert!(matches!(PduCodec::decode_pdu(&[2, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]), Err(QuasiHttpError::MalformedEnvelope { .. })));
        // a response without its envelope
        assert!(matches!(PduCodec::decode_pdu(&[1, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]), Err(QuasiHttpError::MalformedEnvelope { .. })));
        // envelope length beyond the message
        assert!(matches!(PduCodec::decode_pdu(&[1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 9, b'x']), Err(QuasiHttpError::MalformedEnvelope { .. })));
        assert!(PduCodec::decode_pdu(&[]).is_err());
    }
}

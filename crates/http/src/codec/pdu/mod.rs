//! Transfer PDUs for message-oriented transports.

mod pdu_codec;
mod transfer_pdu;

pub use pdu_codec::{PDU_HEADER_LEN, PduCodec};
pub use transfer_pdu::{BodyDirection, PduType, TransferPdu};

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::codec::{BodyDirection, TransferPdu};
use crate::connection::message_exchange::{MessageExchange, OutgoingBody, incoming_body};
use crate::connection::{ConnectionLease, ExchangeState};
use crate::protocol::{QuasiHttpError, QuasiRequest, QuasiResponse, TransferPhase};
use crate::transport::MessageTransport;

/// Client side of the message-oriented protocol.
///
/// The request goes out as one PDU, its body inlined when it fits. A larger request
/// body is served to the peer's chunk-gets while the response is awaited.
pub(crate) async fn send_request<T: MessageTransport>(
    lease: &ConnectionLease<T>,
    exchange: &Arc<MessageExchange<T>>,
    request: &QuasiRequest,
    state: &mut ExchangeState,
) -> Result<QuasiResponse, QuasiHttpError> {
    let lead_chunk = request.to_lead_chunk();
    let capacity = exchange
        .inline_capacity(TransferPdu::Request { lead_chunk: lead_chunk.clone(), inline_data: Some(Bytes::new()) })
        .map_err(|e| e.in_phase(TransferPhase::HeaderSend))?;

    let outgoing = OutgoingBody::prepare(BodyDirection::Request, request.body(), capacity)
        .await
        .map_err(|e| e.in_phase(TransferPhase::BodyTransfer))?;
    let (inline_data, transfer) = outgoing.into_parts();
    let chunked = transfer.is_some();
    if let Some(transfer) = transfer {
        exchange.set_outgoing(transfer).await;
    }

    exchange.send(TransferPdu::Request { lead_chunk, inline_data }).await.map_err(|e| e.in_phase(TransferPhase::HeaderSend))?;
    state.advance(ExchangeState::HeaderSent);
    debug!(chunked, request_target = request.target(), "request sent");

    state.advance(ExchangeState::HeaderExpected);
    let (lead_chunk, inline_data) = exchange
        .receive_matching(|pdu| match pdu {
            TransferPdu::Response { lead_chunk, inline_data } => Some((lead_chunk, inline_data)),
            _ => None,
        })
        .await
        .map_err(|e| e.in_phase(TransferPhase::HeaderReceive))?;

    let body = incoming_body(exchange, BodyDirection::Response, &lead_chunk, inline_data)
        .map_err(|e| e.in_phase(TransferPhase::HeaderReceive))?;
    if let Some(body) = &body {
        lease.attach_body(body.clone()).await;
        state.advance(ExchangeState::BodyInFlight);
    }

    let response = QuasiResponse::from_lead_chunk(lead_chunk, body);
    debug!(status = response.status_code(), has_body = response.body().is_some(), "response received");
    Ok(response)
}

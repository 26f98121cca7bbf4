use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::codec::{BodyDirection, TransferPdu};
use crate::connection::message_exchange::{MessageExchange, OutgoingBody, incoming_body};
use crate::connection::{ConnectionLease, ExchangeState};
use crate::handler::{QuasiApplication, invoke_application};
use crate::protocol::{QuasiHttpError, QuasiRequest, TransferPhase};
use crate::transport::MessageTransport;

/// Server side of the message-oriented protocol.
///
/// Waits for the request PDU, lets the application respond and sends the response
/// PDU. A response body too large to inline is served chunk by chunk until the peer
/// has pulled it to its end.
pub(crate) async fn receive_request<T, A>(
    lease: &ConnectionLease<T>,
    exchange: &Arc<MessageExchange<T>>,
    application: &A,
    state: &mut ExchangeState,
) -> Result<(), QuasiHttpError>
where
    T: MessageTransport,
    A: QuasiApplication + ?Sized,
{
    state.advance(ExchangeState::HeaderExpected);
    let (lead_chunk, inline_data) = exchange
        .receive_matching(|pdu| match pdu {
            TransferPdu::Request { lead_chunk, inline_data } => Some((lead_chunk, inline_data)),
            _ => None,
        })
        .await
        .map_err(|e| e.in_phase(TransferPhase::HeaderReceive))?;

    let body = incoming_body(exchange, BodyDirection::Request, &lead_chunk, inline_data)
        .map_err(|e| e.in_phase(TransferPhase::HeaderReceive))?;
    if let Some(body) = &body {
        lease.attach_body(body.clone()).await;
    }

    let request = QuasiRequest::from_lead_chunk(lead_chunk, body);
    debug!(method = request.method(), request_target = request.target(), "request received");

    let response = invoke_application(application, request).await?;
    if let Some(body) = response.body() {
        lease.attach_body(body.clone()).await;
    }

    let lead_chunk = response.to_lead_chunk();
    let capacity = exchange
        .inline_capacity(TransferPdu::Response { lead_chunk: lead_chunk.clone(), inline_data: Some(Bytes::new()) })
        .map_err(|e| e.in_phase(TransferPhase::HeaderSend))?;
    let outgoing = OutgoingBody::prepare(BodyDirection::Response, response.body(), capacity)
        .await
        .map_err(|e| e.in_phase(TransferPhase::BodyTransfer))?;
    let (inline_data, transfer) = outgoing.into_parts();
    let chunked = transfer.is_some();
    if let Some(transfer) = transfer {
        exchange.set_outgoing(transfer).await;
    }

    exchange.send(TransferPdu::Response { lead_chunk, inline_data }).await.map_err(|e| e.in_phase(TransferPhase::HeaderSend))?;
    state.advance(ExchangeState::HeaderSent);

    if chunked {
        state.advance(ExchangeState::BodyInFlight);
        exchange.finish_outgoing().await.map_err(|e| e.in_phase(TransferPhase::BodyTransfer))?;
    }

    debug!(status = response.status_code(), chunked, "response sent");
    state.advance(ExchangeState::Completed);
    Ok(())
}

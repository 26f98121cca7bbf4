use tracing::debug;

use crate::codec::LeadChunkDecoder;
use crate::connection::stream_io::{FrameReader, FrameWriter};
use crate::connection::{ConnectionLease, ExchangeState};
use crate::protocol::{QuasiHttpError, QuasiRequest, QuasiResponse, TransferPhase};
use crate::transport::StreamTransport;

/// Client side of the byte-stream protocol.
///
/// Writes the request lead chunk and body, then reads the response lead chunk. A
/// response body is exposed over the rest of the connection and attached to the lease,
/// so it ends when the connection is released.
pub(crate) async fn send_request<T: StreamTransport>(
    lease: &ConnectionLease<T>,
    request: &QuasiRequest,
    state: &mut ExchangeState,
) -> Result<QuasiResponse, QuasiHttpError> {
    let context = lease.context();
    let mut writer = FrameWriter::new(context.clone());

    writer.send_lead_chunk(request.to_lead_chunk()).await.map_err(|e| e.in_phase(TransferPhase::HeaderSend))?;
    state.advance(ExchangeState::HeaderSent);

    if let Some(body) = request.body() {
        let sent = writer.send_body(body).await.map_err(|e| e.in_phase(TransferPhase::BodyTransfer))?;
        debug!(sent, request_target = request.target(), "request body sent");
    }

    state.advance(ExchangeState::HeaderExpected);
    let mut reader = FrameReader::new(context.clone());
    let lead_chunk =
        reader.read_frame(&mut LeadChunkDecoder::default()).await.map_err(|e| e.in_phase(TransferPhase::HeaderReceive))?;

    let body = reader.into_content(&lead_chunk);
    if let Some(body) = &body {
        lease.attach_body(body.clone()).await;
        state.advance(ExchangeState::BodyInFlight);
    }

    let response = QuasiResponse::from_lead_chunk(lead_chunk, body);
    debug!(status = response.status_code(), has_body = response.body().is_some(), "response received");
    Ok(response)
}

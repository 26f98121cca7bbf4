use tracing::debug;

use crate::codec::LeadChunkDecoder;
use crate::connection::stream_io::{FrameReader, FrameWriter};
use crate::connection::{ConnectionLease, ExchangeState};
use crate::handler::{QuasiApplication, invoke_application};
use crate::protocol::{QuasiHttpError, QuasiRequest, TransferPhase};
use crate::transport::StreamTransport;

/// Server side of the byte-stream protocol.
///
/// Reads the request lead chunk, exposes the request body over the rest of the
/// connection, lets the application produce a response and writes it back. Both
/// bodies stay attached to the lease and end when the connection is released.
pub(crate) async fn receive_request<T, A>(
    lease: &ConnectionLease<T>,
    application: &A,
    state: &mut ExchangeState,
) -> Result<(), QuasiHttpError>
where
    T: StreamTransport,
    A: QuasiApplication + ?Sized,
{
    let context = lease.context();

    state.advance(ExchangeState::HeaderExpected);
    let mut reader = FrameReader::new(context.clone());
    let lead_chunk =
        reader.read_frame(&mut LeadChunkDecoder::default()).await.map_err(|e| e.in_phase(TransferPhase::HeaderReceive))?;

    let body = reader.into_content(&lead_chunk);
    if let Some(body) = &body {
        lease.attach_body(body.clone()).await;
    }

    let request = QuasiRequest::from_lead_chunk(lead_chunk, body);
    debug!(method = request.method(), request_target = request.target(), "request received");

    let response = invoke_application(application, request).await?;
    if let Some(body) = response.body() {
        lease.attach_body(body.clone()).await;
    }

    let mut writer = FrameWriter::new(context.clone());
    writer.send_lead_chunk(response.to_lead_chunk()).await.map_err(|e| e.in_phase(TransferPhase::HeaderSend))?;
    state.advance(ExchangeState::HeaderSent);

    if let Some(body) = response.body() {
        state.advance(ExchangeState::BodyInFlight);
        let sent = writer.send_body(body).await.map_err(|e| e.in_phase(TransferPhase::BodyTransfer))?;
        debug!(sent, "response body sent");
    }

    state.advance(ExchangeState::Completed);
    Ok(())
}

mod common;

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use quasi_http::codec::{BodyDirection, PduCodec, PduType, TransferPdu};
use quasi_http::handler::make_application;
use quasi_http::protocol::body::{BytesBody, QuasiBody, StreamBody, read_all_bytes};
use quasi_http::protocol::{LeadChunk, PayloadSize, ProcessingOptions, QuasiHttpError, QuasiRequest, QuasiResponse, TransferPhase};
use quasi_http::transport::{MessageInbound, MessageTransport};
use quasi_http::transport::memory::{MemoryMessageTransport, MemoryNetwork};
use quasi_http::{MessageQuasiHttpClient, StandardQuasiHttpServer};
use tokio_util::sync::CancellationToken;

use common::{RecordingMessageTransport, echo_application, init_tracing, spawn_message_server};

fn count(pdus: &[TransferPdu], pdu_type: PduType) -> usize {
    pdus.iter().filter(|pdu| pdu.pdu_type() == pdu_type).count()
}

#[tokio::test]
async fn small_body_travels_in_one_pdu() {
    init_tracing();
    let network = MemoryNetwork::new();
    let server_transport = Arc::new(RecordingMessageTransport::new(&network, 1024));
    let _results = spawn_message_server(&network, "echo", server_transport.clone(), StandardQuasiHttpServer::new(echo_application()));

    let client_transport = Arc::new(RecordingMessageTransport::new(&network, 1024));
    let client = MessageQuasiHttpClient::new(client_transport.clone());

    let request = QuasiRequest::new("POST", "/tiny").with_body(Arc::new(BytesBody::from("tiny").with_content_type("text/plain")));
    let response = client.send("echo", request, None).await.unwrap();

    let body = response.body().unwrap();
    assert_eq!(body.content_type(), Some("text/plain"));
    assert_eq!(&read_all_bytes(body, None).await.unwrap()[..], b"tiny");

    let sent = client_transport.sent();
    assert_eq!(sent.len(), 1);
    assert!(matches!(&sent[0], TransferPdu::Request { inline_data: Some(data), .. } if &data[..] == b"tiny"));

    let replied = server_transport.sent();
    assert_eq!(replied.len(), 1);
    assert!(matches!(&replied[0], TransferPdu::Response { inline_data: Some(_), .. }));
}

#[tokio::test]
async fn large_body_is_pulled_chunk_by_chunk() {
    init_tracing();
    let network = MemoryNetwork::new();
    let server_transport = Arc::new(RecordingMessageTransport::new(&network, 256));
    let mut results =
        spawn_message_server(&network, "echo", server_transport.clone(), StandardQuasiHttpServer::new(echo_application()));

    let client_transport = Arc::new(RecordingMessageTransport::new(&network, 256));
    let client = MessageQuasiHttpClient::new(client_transport.clone());

    let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 253) as u8).collect();
    let request = QuasiRequest::new("PUT", "/blob").with_body(Arc::new(StreamBody::new(Cursor::new(payload.clone()))));
    let response = client.send("echo", request, None).await.unwrap();
    assert_eq!(read_all_bytes(response.body().unwrap(), None).await.unwrap(), payload);
    assert!(results.recv().await.unwrap().is_ok());

    let sent = client_transport.sent();
    let replied = server_transport.sent();

    assert!(matches!(&sent[0], TransferPdu::Request { inline_data: None, .. }));
    let request_rets = count(&sent, PduType::RequestChunkRet);
    assert!(request_rets > 1);
    assert_eq!(request_rets, count(&replied, PduType::RequestChunkGet));
    assert!(matches!(
        sent.iter().rev().find(|pdu| pdu.pdu_type() == PduType::RequestChunkRet),
        Some(TransferPdu::ChunkRet { direction: BodyDirection::Request, data, .. }) if data.is_empty()
    ));

    // the echoed body has a known length and still ends with an empty chunk-ret
    let response_rets = count(&replied, PduType::ResponseChunkRet);
    assert!(response_rets > 1);
    assert_eq!(response_rets, count(&sent, PduType::ResponseChunkGet));
    assert_eq!(last_chunk_ret_len(&replied, BodyDirection::Response), Some(0));
    assert_eq!(count(&sent, PduType::Fin) + count(&replied, PduType::Fin), 0);
}

fn last_chunk_ret_len(pdus: &[TransferPdu], direction: BodyDirection) -> Option<usize> {
    pdus.iter().rev().find_map(|pdu| match pdu {
        TransferPdu::ChunkRet { direction: d, data, .. } if *d == direction => Some(data.len()),
        _ => None,
    })
}

#[tokio::test]
async fn known_length_request_ends_with_empty_chunk_ret() {
    let network = MemoryNetwork::new();
    let mut results = spawn_message_server(
        &network,
        "echo",
        Arc::new(MemoryMessageTransport::new(network.clone()).with_max_message_size(256)),
        StandardQuasiHttpServer::new(echo_application()),
    );

    let client_transport = Arc::new(RecordingMessageTransport::new(&network, 256));
    let client = MessageQuasiHttpClient::new(client_transport.clone());

    let payload = vec![b'q'; 2000];
    let request = QuasiRequest::new("PUT", "/known").with_body(Arc::new(BytesBody::new(payload.clone())));
    let response = client.send("echo", request, None).await.unwrap();
    assert_eq!(read_all_bytes(response.body().unwrap(), None).await.unwrap(), payload);
    assert!(results.recv().await.unwrap().is_ok());

    let sent = client_transport.sent();
    let sizes: Vec<usize> = sent
        .iter()
        .filter_map(|pdu| match pdu {
            TransferPdu::ChunkRet { direction: BodyDirection::Request, data, .. } => Some(data.len()),
            _ => None,
        })
        .collect();
    assert_eq!(sizes.iter().sum::<usize>(), payload.len());
    assert_eq!(sizes.last(), Some(&0));
}

async fn next_pdu(inbound: &mut MessageInbound) -> TransferPdu {
    PduCodec::decode_pdu(&inbound.next_message().await.unwrap()).unwrap()
}

/// Plays a server by hand: pulls the request body to its end, asks once more, then
/// answers without a body.
#[tokio::test]
async fn client_answers_every_chunk_get_of_a_known_length_body() {
    let network = MemoryNetwork::new();
    let mut listener = network.bind_message("manual").unwrap();
    let server_transport = MemoryMessageTransport::new(network.clone());

    let peer = tokio::spawn(async move {
        let (connection, mut inbound) = listener.accept().await.unwrap();
        let token = CancellationToken::new();
        let TransferPdu::Request { lead_chunk, inline_data: None } = next_pdu(&mut inbound).await else {
            panic!("expect a request pulled in chunks");
        };
        assert_eq!(lead_chunk.payload_size(), PayloadSize::Length(600));

        let get = |sequence_number| {
            PduCodec::encode_pdu(TransferPdu::ChunkGet { direction: BodyDirection::Request, sequence_number, max_len: 256 }).unwrap()
        };
        let mut received = Vec::new();
        let mut sequence_number = 0;
        loop {
            server_transport.send_message(&connection, get(sequence_number), &token).await.unwrap();
            let TransferPdu::ChunkRet { sequence_number: seq, data, .. } = next_pdu(&mut inbound).await else {
                panic!("expect a chunk ret");
            };
            assert_eq!(seq, sequence_number);
            if data.is_empty() {
                break;
            }
            received.extend_from_slice(&data);
            sequence_number += 1;
        }
        assert_eq!(received.len(), 600);

        server_transport.send_message(&connection, get(sequence_number), &token).await.unwrap();
        let TransferPdu::ChunkRet { sequence_number: seq, data, .. } = next_pdu(&mut inbound).await else {
            panic!("expect a chunk ret");
        };
        assert_eq!(seq, sequence_number);
        assert!(data.is_empty());

        let response = LeadChunk { status_code: 204, ..LeadChunk::new() };
        let response = PduCodec::encode_pdu(TransferPdu::Response { lead_chunk: response, inline_data: None }).unwrap();
        server_transport.send_message(&connection, response, &token).await.unwrap();
        received
    });

    let client = MessageQuasiHttpClient::new(Arc::new(MemoryMessageTransport::new(network.clone()).with_max_message_size(256)));
    let request = QuasiRequest::new("POST", "/manual").with_body(Arc::new(BytesBody::new(vec![7u8; 600])));
    let response = tokio::time::timeout(Duration::from_secs(5), client.send("manual", request, None)).await.unwrap().unwrap();

    assert_eq!(response.status_code(), 204);
    assert_eq!(peer.await.unwrap(), vec![7u8; 600]);
}

#[tokio::test]
async fn streaming_response_over_messages() {
    let network = MemoryNetwork::new();
    let server_transport = Arc::new(MemoryMessageTransport::new(network.clone()).with_max_message_size(128));
    let mut results = spawn_message_server(&network, "echo", server_transport, StandardQuasiHttpServer::new(echo_application()));

    let client = MessageQuasiHttpClient::new(Arc::new(MemoryMessageTransport::new(network.clone()).with_max_message_size(128)))
        .with_default_options(ProcessingOptions::new().with_response_buffering_enabled(false));

    let payload = "a streamed body long enough to need several chunk round trips ".repeat(8);
    let request = QuasiRequest::new("POST", "/stream").with_body(Arc::new(BytesBody::from(payload.clone())));
    let response = client.send("echo", request, None).await.unwrap();

    let body = response.body().unwrap();
    assert_eq!(body.content_length(), payload.len() as i64);
    assert_eq!(&read_all_bytes(body, None).await.unwrap()[..], payload.as_bytes());
    body.end_read(None).await;

    assert!(results.recv().await.unwrap().is_ok());
}

#[tokio::test(start_paused = true)]
async fn server_abort_sends_fin() {
    let network = MemoryNetwork::new();
    let application = make_application(|_request| async {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok::<_, QuasiHttpError>(Some(QuasiResponse::with_status_code(200)))
    });
    let server_transport = Arc::new(RecordingMessageTransport::new(&network, 1024));
    let server = StandardQuasiHttpServer::new(application).with_default_options(ProcessingOptions::new().with_timeout_millis(100));
    let mut results = spawn_message_server(&network, "slow", server_transport.clone(), server);

    let client = MessageQuasiHttpClient::new(Arc::new(MemoryMessageTransport::new(network.clone())));
    let error = client.send("slow", QuasiRequest::new("GET", "/"), None).await.unwrap_err();

    assert_eq!(error.phase(), Some(TransferPhase::HeaderReceive));
    assert!(matches!(error.root(), QuasiHttpError::PeerAborted));
    assert!(results.recv().await.unwrap().unwrap_err().is_timeout());
    assert_eq!(count(&server_transport.sent(), PduType::Fin), 1);
}

#[tokio::test(start_paused = true)]
async fn client_cancel_sends_fin() {
    let network = MemoryNetwork::new();
    let application = make_application(|_request| async {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok::<_, QuasiHttpError>(Some(QuasiResponse::with_status_code(200)))
    });
    let server_transport = Arc::new(MemoryMessageTransport::new(network.clone()));
    let _results = spawn_message_server(&network, "slow", server_transport, StandardQuasiHttpServer::new(application));

    let client_transport = Arc::new(RecordingMessageTransport::new(&network, 1024));
    let client = MessageQuasiHttpClient::new(client_transport.clone());

    let cancellation = CancellationToken::new();
    let canceller = cancellation.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let error = client.send_with_cancellation("slow", QuasiRequest::new("GET", "/"), None, cancellation).await.unwrap_err();
    assert!(error.is_cancelled());
    assert_eq!(count(&client_transport.sent(), PduType::Fin), 1);
}

#[tokio::test]
async fn oversized_envelope_is_rejected() {
    let network = MemoryNetwork::new();
    let _results = spawn_message_server(
        &network,
        "echo",
        Arc::new(MemoryMessageTransport::new(network.clone())),
        StandardQuasiHttpServer::new(echo_application()),
    );

    let client = MessageQuasiHttpClient::new(Arc::new(MemoryMessageTransport::new(network.clone()).with_max_message_size(32)));
    let error = client.send("echo", QuasiRequest::new("GET", "/a/target/longer/than/the/message"), None).await.unwrap_err();

    assert_eq!(error.phase(), Some(TransferPhase::HeaderSend));
    assert!(matches!(error.root(), QuasiHttpError::ChunkSizeExceeded { limit: 32, .. }));
}

//! Integration tests for transient and fatal channel faults.

mod helpers;

use std::io;

use helpers::faults::{Faults, faulty};
use helpers::peer::{self, Peer};
use helpers::{reply_for, request};
use p9mux::{
    ChannelError, CloseReason, FrameType, MemChannel, Transport, TransportConfig,
    TransportError, TransportState,
};
use tokio_util::sync::CancellationToken;

fn open_faulty(faults: &Faults) -> (Transport, Peer) {
    let (client, server) = MemChannel::pair(8);
    let transport = Transport::spawn(
        faulty(client, faults.clone()),
        CancellationToken::new(),
        TransportConfig::default(),
    );
    (transport, Peer::new(server))
}

#[tokio::test]
async fn transient_read_faults_are_retried() {
    let faults = Faults::default();
    faults.fail_read(io::ErrorKind::TimedOut);
    faults.fail_read(io::ErrorKind::Interrupted);
    let (transport, mut peer) = open_faulty(&faults);

    let call = tokio::spawn({
        let transport = transport.clone();
        async move {
            transport
                .send(&CancellationToken::new(), request(FrameType::TSTAT))
                .await
        }
    });
    let req = peer.next_request().await;
    peer.reply(req.tag, reply_for(req.ty, b"stat")).await;

    assert_eq!(
        call.await.unwrap().unwrap(),
        reply_for(FrameType::TSTAT, b"stat")
    );
    assert_eq!(transport.state(), TransportState::Open);
}

#[tokio::test]
async fn fatal_read_fault_closes_transport() {
    let faults = Faults::default();
    faults.fail_read(io::ErrorKind::ConnectionReset);
    let (transport, _peer) = open_faulty(&faults);

    peer::wait_closed(&transport).await;
    assert!(matches!(
        transport.close_reason(),
        Some(CloseReason::ReadFailed(msg)) if msg.contains("injected read fault")
    ));
    let result = transport
        .send(&CancellationToken::new(), request(FrameType::TSTAT))
        .await;
    assert!(matches!(result, Err(TransportError::Closed)));
}

#[tokio::test]
async fn write_failure_only_fails_the_triggering_call() {
    let faults = Faults::default();
    let (transport, mut peer) = open_faulty(&faults);

    faults.fail_writes(1);
    let failed = transport
        .send(&CancellationToken::new(), request(FrameType::TWRITE))
        .await;
    match failed {
        Err(TransportError::Write(ChannelError::Io(e))) => {
            assert_eq!(e.kind(), io::ErrorKind::BrokenPipe)
        }
        other => panic!("expected write error, got {:?}", other),
    }
    assert_eq!(transport.state(), TransportState::Open);

    // The next request goes through and may reuse the released tag.
    let call = tokio::spawn({
        let transport = transport.clone();
        async move {
            transport
                .send(&CancellationToken::new(), request(FrameType::TWRITE))
                .await
        }
    });
    let req = peer.next_request().await;
    peer.reply(req.tag, reply_for(req.ty, &[4, 0, 0, 0])).await;
    assert_eq!(
        call.await.unwrap().unwrap(),
        reply_for(FrameType::TWRITE, &[4, 0, 0, 0])
    );
}

#[tokio::test]
async fn reply_for_a_request_that_was_never_written_is_a_violation() {
    let faults = Faults::default();
    let (transport, mut peer) = open_faulty(&faults);

    faults.fail_writes(1);
    let _ = transport
        .send(&CancellationToken::new(), request(FrameType::TREAD))
        .await;

    // Tag 1 was released when its write failed.
    peer.reply(p9mux::Tag::new(1), reply_for(FrameType::TREAD, &[]))
        .await;
    peer::wait_closed(&transport).await;
    assert!(matches!(
        transport.close_reason(),
        Some(CloseReason::ProtocolViolation { .. })
    ));
}

#[tokio::test]
async fn failed_flush_write_reports_write_error() {
    let faults = Faults::default();
    let (transport, mut peer) = open_faulty(&faults);

    let call = tokio::spawn({
        let transport = transport.clone();
        async move {
            transport
                .send(&CancellationToken::new(), request(FrameType::TREAD))
                .await
        }
    });
    let req = peer.next_request().await;

    faults.fail_writes(1);
    let result = transport.flush(req.tag).await;
    assert!(matches!(result, Err(TransportError::Write(_))));

    // The original call is still live and receives its reply.
    peer.reply(req.tag, reply_for(req.ty, b"data")).await;
    assert_eq!(
        call.await.unwrap().unwrap(),
        reply_for(FrameType::TREAD, b"data")
    );
}

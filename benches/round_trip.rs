//! Benchmark for multiplexed round trips.
//!
//! Measures how long a batch of concurrent requests takes to complete over an
//! in-memory channel answered by an echo peer. Larger batches keep more tags
//! outstanding at once and stress the tag table.
//!
//! Run with: cargo bench --bench round_trip

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use p9mux::{
    Frame, FrameChannel, FrameRead, FrameType, FrameWrite, MemChannel, Message, Transport,
    TransportConfig,
};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

/// Spawn a peer that answers every request with an empty reply of the
/// matching type.
fn spawn_echo_peer(peer: MemChannel) {
    let (mut rx, mut tx) = peer.split();
    tokio::spawn(async move {
        while let Ok(request) = rx.read_frame().await {
            let reply = Message::Opaque {
                ty: FrameType::new(request.ty.as_u8() + 1),
                body: Vec::new(),
            };
            if tx.write_frame(&Frame::new(request.tag, reply)).await.is_err() {
                break;
            }
        }
    });
}

fn bench_concurrent_round_trips(c: &mut Criterion) {
    let rt = Runtime::new().expect("Failed to build runtime");
    let mut group = c.benchmark_group("round_trip");

    for batch in [1usize, 16, 256] {
        let transport = rt.block_on(async {
            let (client, server) = MemChannel::pair(64);
            spawn_echo_peer(server);
            let config = TransportConfig {
                submit_queue: 64,
                frame_queue: 64,
                ..TransportConfig::default()
            };
            Transport::spawn(client, CancellationToken::new(), config)
        });

        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            b.iter(|| {
                rt.block_on(async {
                    let cancel = CancellationToken::new();
                    let mut calls = Vec::with_capacity(batch);
                    for _ in 0..batch {
                        let transport = transport.clone();
                        let cancel = cancel.clone();
                        calls.push(tokio::spawn(async move {
                            transport
                                .send(
                                    &cancel,
                                    Message::Opaque {
                                        ty: FrameType::TCLUNK,
                                        body: vec![0; 4],
                                    },
                                )
                                .await
                        }));
                    }
                    for call in calls {
                        let _ = black_box(call.await);
                    }
                })
            });
        });

        let _ = transport.close();
    }

    group.finish();
}

criterion_group!(benches, bench_concurrent_round_trips);
criterion_main!(benches);

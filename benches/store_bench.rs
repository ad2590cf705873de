use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use nemoria::core::codec::PacketCodec;
use nemoria::core::packet::Packet;
use nemoria::persistence::Codec;
use nemoria::protocol::message::{Message, Request};
use nemoria::store::{Route, RouteTree, Value};
use tokio_util::codec::{Decoder, Encoder};

#[allow(clippy::unwrap_used)]
fn populated(entries: usize) -> (RouteTree, Vec<Route>) {
    let mut tree = RouteTree::new();
    let routes: Vec<Route> = (0..entries)
        .map(|i| Route::new([format!("group{}", i % 32), format!("item{i}"), "value".into()]).unwrap())
        .collect();
    for (i, route) in routes.iter().enumerate() {
        tree.set(route, Value::from(i as i64)).unwrap();
    }
    (tree, routes)
}

#[allow(clippy::unwrap_used)]
fn bench_tree_ops(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_tree");

    for &entries in &[100usize, 10_000] {
        let (tree, routes) = populated(entries);

        group.bench_function(format!("get_{entries}"), |b| {
            let mut i = 0;
            b.iter(|| {
                i = (i + 1) % routes.len();
                black_box(tree.get(&routes[i]).unwrap());
            })
        });

        group.bench_function(format!("set_overwrite_{entries}"), |b| {
            b.iter_batched(
                || tree.clone(),
                |mut tree| {
                    tree.set(&routes[entries / 2], Value::from("replaced")).unwrap();
                    tree
                },
                BatchSize::LargeInput,
            )
        });

        group.bench_function(format!("all_{entries}"), |b| b.iter(|| black_box(tree.all())));

        for codec in Codec::ALL {
            let snapshot = tree.all();
            group.bench_function(format!("encode_{codec}_{entries}"), |b| {
                b.iter(|| black_box(codec.encode(&snapshot).unwrap()))
            });
        }
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_framing(c: &mut Criterion) {
    let mut group = c.benchmark_group("framing");

    for &size in &[16usize, 1024, 64 * 1024] {
        let msg = Message::Request(Request::Set {
            route: "bench/payload".parse().unwrap(),
            value: Value::from("x".repeat(size)),
            save: None,
        });
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("encode_{size}b"), |b| {
            b.iter(|| {
                let payload = bincode::serialize(&msg).unwrap();
                let mut buf = BytesMut::with_capacity(payload.len() + 16);
                PacketCodec.encode(Packet::new(payload), &mut buf).unwrap();
                black_box(buf)
            })
        });

        let mut encoded = BytesMut::new();
        PacketCodec
            .encode(Packet::new(bincode::serialize(&msg).unwrap()), &mut encoded)
            .unwrap();
        group.bench_function(format!("decode_{size}b"), |b| {
            b.iter_batched(
                || encoded.clone(),
                |mut buf| {
                    let packet = PacketCodec.decode(&mut buf).unwrap().unwrap();
                    black_box(bincode::deserialize::<Message>(&packet.payload).unwrap())
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_tree_ops, bench_framing);
criterion_main!(benches);

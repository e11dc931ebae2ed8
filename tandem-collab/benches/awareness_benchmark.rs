use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use serde_json::json;
use std::hint::black_box;
use tandem_collab::awareness::{Awareness, Origin};
use tandem_collab::protocol::{AwarenessEntry, AwarenessUpdate};

fn peer_state(i: u64) -> serde_json::Value {
    json!({
        "user": {
            "name": format!("user-{i}"),
            "displayName": format!("User {i}"),
            "color": "#3F51B5",
            "initials": "U",
        },
        "current": format!("notebook:work/{i}.ipynb"),
    })
}

fn bench_update_encode(c: &mut Criterion) {
    let update = AwarenessUpdate::new(
        (0..100)
            .map(|i| AwarenessEntry { client_id: i, clock: i, state: Some(peer_state(i)) })
            .collect(),
    );

    let mut group = c.benchmark_group("Awareness codec");
    group.throughput(Throughput::Elements(100));
    group.bench_function("encode_100_peers", |b| {
        b.iter(|| black_box(update.encode().unwrap()))
    });

    let bytes = update.encode().unwrap();
    group.bench_function("decode_100_peers", |b| {
        b.iter(|| black_box(AwarenessUpdate::decode(black_box(&bytes)).unwrap()))
    });
    group.finish();
}

fn bench_apply_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("Awareness store");
    group.throughput(Throughput::Elements(100));

    group.bench_function("apply_100_peers", |b| {
        let awareness = Awareness::with_client_id(u64::MAX);
        let mut clock = 0;
        b.iter(|| {
            clock += 1;
            let entries = (0..100)
                .map(|i| AwarenessEntry { client_id: i, clock, state: Some(peer_state(i)) })
                .collect();
            black_box(awareness.apply_entries(entries, Origin::Remote));
        })
    });

    group.bench_function("states_snapshot_100_peers", |b| {
        let awareness = Awareness::with_client_id(u64::MAX);
        awareness.apply_entries(
            (0..100)
                .map(|i| AwarenessEntry { client_id: i, clock: 1, state: Some(peer_state(i)) })
                .collect(),
            Origin::Remote,
        );
        b.iter(|| black_box(awareness.states()))
    });
    group.finish();
}

criterion_group!(benches, bench_update_encode, bench_apply_update);
criterion_main!(benches);

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::hint::black_box;
use tandem_follow::{read_snapshot, FollowConfig, Roster};

fn presence(peers: u64) -> BTreeMap<u64, Value> {
    (0..peers)
        .map(|i| {
            let docs: serde_json::Map<String, Value> = (0..8)
                .map(|d| (format!("k{d}"), json!({ "path": format!("work/{i}/{d}.ipynb"), "factory": "notebook" })))
                .collect();
            let state = json!({
                "user": { "name": format!("user-{i}"), "displayName": format!("User {i}"), "color": "#3F51B5", "initials": "U" },
                "current": format!("notebook:work/{i}/0.ipynb"),
                "layout": {
                    "freshnessToken": format!("token-{i}"),
                    "currentKey": "k0",
                    "openDocuments": docs,
                    "geometryMode": "multiple-document",
                    "rawGeometry": { "main": { "dock": null } },
                },
            });
            (i, state)
        })
        .collect()
}

fn bench_read_snapshot(c: &mut Criterion) {
    let states = presence(100);
    let config = FollowConfig::default();

    let mut group = c.benchmark_group("Presence reader");
    group.throughput(Throughput::Elements(100));
    group.bench_function("read_100_peers", |b| {
        b.iter(|| black_box(read_snapshot(black_box(&states), "user-0", &config)))
    });
    group.finish();
}

fn bench_roster(c: &mut Criterion) {
    let states = presence(100);
    let config = FollowConfig::default();

    let mut group = c.benchmark_group("Roster");
    group.bench_function("recompute_and_check_follow", |b| {
        let mut roster = Roster::new();
        roster.recompute(&states, "user-0", &config);
        roster.start_follow("user-42");
        b.iter(|| {
            roster.recompute(black_box(&states), "user-0", &config);
            black_box(roster.pending_replay())
        })
    });
    group.bench_function("view_100_peers", |b| {
        let mut roster = Roster::new();
        roster.recompute(&states, "user-0", &config);
        b.iter(|| black_box(roster.view()))
    });
    group.finish();
}

criterion_group!(benches, bench_read_snapshot, bench_roster);
criterion_main!(benches);

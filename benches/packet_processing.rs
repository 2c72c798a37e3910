//! Benchmarks for packet processing operations
//!
//! Run with: cargo bench

use chrono::{TimeZone, Utc};
use cranio::backend::{
    create_dummy_sensor, decode_telegram, shared, Packet, Producer, Store,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn torque_packets(count: usize) -> Vec<Packet> {
    (0..count)
        .map(|i| {
            let ts = Utc
                .timestamp_millis_opt(1_600_000_000_000 + i as i64 * 100)
                .unwrap();
            Packet::single(ts, vec![("torque (Nm)".to_string(), Some(i as f64 * 0.01))]).unwrap()
        })
        .collect()
}

fn bench_concat(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_concat");

    for size in [10, 100, 1000].iter() {
        let packets = torque_packets(*size);
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("concat", size), &packets, |b, packets| {
            b.iter(|| black_box(Packet::concat(packets).unwrap()));
        });
    }

    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_codec");

    let packet = Packet::concat(&torque_packets(1000)).unwrap();
    let bytes = packet.encode().unwrap();

    group.bench_function("encode_1000", |b| {
        b.iter(|| black_box(packet.encode().unwrap()));
    });

    group.bench_function("decode_1000", |b| {
        b.iter(|| black_box(Packet::decode(&bytes).unwrap()));
    });

    group.bench_function("as_table_1000", |b| {
        b.iter(|| black_box(packet.as_table()));
    });

    group.finish();
}

fn bench_producer(c: &mut Criterion) {
    let mut group = c.benchmark_group("producer");

    for sensors in [1, 4].iter() {
        let mut producer = Producer::new();
        for _ in 0..*sensors {
            producer.register_sensor(shared(create_dummy_sensor(3).unwrap()));
        }
        group.bench_with_input(BenchmarkId::new("read_all", sensors), sensors, |b, _| {
            b.iter(|| black_box(producer.read_all()));
        });
    }

    group.finish();
}

fn bench_store_drain(c: &mut Criterion) {
    let packets = torque_packets(10);

    c.bench_function("store_write_drain_10", |b| {
        let store = Store::in_memory();
        b.iter(|| {
            for packet in &packets {
                store.write(packet.clone()).unwrap();
            }
            black_box(store.drain().unwrap())
        });
    });
}

fn bench_telegram(c: &mut Criterion) {
    c.bench_function("decode_telegram", |b| {
        b.iter(|| black_box(decode_telegram(black_box("+12.34KTO")).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_concat,
    bench_codec,
    bench_producer,
    bench_store_drain,
    bench_telegram
);
criterion_main!(benches);

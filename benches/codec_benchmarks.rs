//! Performance benchmarks for the SEI timestamp codec and reconciler
//!
//! Run with: cargo bench --bench codec_benchmarks
//!
//! The stamp/search path runs once per keyframe and the search once per
//! decoded frame, so it has to stay far below a frame interval.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use seistamp::ntp::{ClockOffset, NtpPacket, TimeValue};
use seistamp::sei::{
    encode_record, extract_payload, find_record, merge_units, wrap_for_transport, UnitKind,
};

/// Access unit of `size` bytes that looks like slice data
fn generate_access_unit(size: usize) -> Vec<u8> {
    let mut au = vec![0, 0, 0, 1, 0x65];
    au.extend((0..size).map(|i| ((i * 7 + 3) % 251) as u8 | 0x01));
    au
}

fn bench_record_codec(c: &mut Criterion) {
    let time = TimeValue::new(3_900_000_000, 0x8000_0000);
    let record = encode_record(33_333_333, time);
    let unit = wrap_for_transport(&record, UnitKind::H264);

    let mut group = c.benchmark_group("sei_unit");
    group.bench_function("encode_and_wrap", |b| {
        b.iter(|| wrap_for_transport(&encode_record(black_box(33_333_333), black_box(time)), UnitKind::H264))
    });
    group.bench_function("extract", |b| b.iter(|| extract_payload(black_box(&unit))));
    group.finish();
}

fn bench_find_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_record");

    for size in [1_000usize, 50_000, 500_000] {
        let slice = generate_access_unit(size);
        let unit = wrap_for_transport(&encode_record(0, TimeValue::new(3_900_000_000, 0)), UnitKind::H264);
        let stamped = merge_units(&unit, Some(slice.as_slice()));

        group.throughput(Throughput::Bytes(stamped.len() as u64));
        group.bench_with_input(BenchmarkId::new("stamped", size), &stamped, |b, au| {
            b.iter(|| find_record(black_box(au)))
        });
        // Worst case: no record anywhere, full fallback scan
        group.bench_with_input(BenchmarkId::new("unstamped", size), &slice, |b, au| {
            b.iter(|| find_record(black_box(au)))
        });
    }

    group.finish();
}

fn bench_ntp(c: &mut Criterion) {
    let request = NtpPacket::client_request(TimeValue::now()).to_bytes();

    c.bench_function("ntp_packet_parse", |b| b.iter(|| NtpPacket::parse(black_box(&request))));
    c.bench_function("clock_offset", |b| {
        b.iter(|| ClockOffset::calculate(black_box(100), black_box(250), black_box(260), black_box(400)))
    });
    c.bench_function("time_value_to_unix_nanos", |b| {
        let t = TimeValue::now();
        b.iter(|| black_box(t).to_unix_nanos())
    });
}

criterion_group!(benches, bench_record_codec, bench_find_record, bench_ntp);
criterion_main!(benches);

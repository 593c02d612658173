
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use obec::banded_align::BandedAligner;
use obec::error_diff::{compute_errors, ErrorDiffParams};
use obec::string_util::*;

/// a deterministic pseudo-random read, long enough to exercise the band
fn make_read(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed;
    let mut read: Vec<u8> = Vec::with_capacity(len);
    for _ in 0..len {
        //xorshift64
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        read.push((state % 4) as u8);
    }
    read
}

/// sprinkle errors over a read at a fixed stride
fn degrade(read: &[u8], stride: usize) -> Vec<u8> {
    let mut degraded = read.to_vec();
    for pos in (stride..degraded.len()).step_by(stride) {
        degraded[pos] = (degraded[pos] + 1) % 4;
    }
    degraded
}

pub fn bench_string_util(c: &mut Criterion) {
    let read = make_read(1000, 0x5eed);
    let ascii = convert_itos(&read);

    c.bench_function("convert_stoi", |b| b.iter(|| {
        black_box(convert_stoi(&ascii));
    }));

    c.bench_function("reverse_complement_i", |b| b.iter(|| {
        black_box(reverse_complement_i(&read));
    }));
}

pub fn bench_prefix_edit_distance(c: &mut Criterion) {
    let read = make_read(1000, 0x5eed);
    let clean = read.clone();
    let noisy = degrade(&read, 50);
    let mut aligner = BandedAligner::new(0.06);
    let limit = aligner.error_bound(read.len());

    c.bench_function("prefix_edit_distance_identical", |b| b.iter(|| {
        black_box(aligner.prefix_edit_distance(&read, &clean, limit));
    }));

    c.bench_function("prefix_edit_distance_2pct_errors", |b| b.iter(|| {
        black_box(aligner.prefix_edit_distance(&read, &noisy, limit));
    }));
}

pub fn bench_compute_errors(c: &mut Criterion) {
    let read = make_read(1000, 0x5eed);
    let noisy = degrade(&read, 50);
    let mut aligner = BandedAligner::new(0.06);
    let limit = aligner.error_bound(read.len());
    let alignment = aligner.prefix_edit_distance(&read, &noisy, limit);
    let params = ErrorDiffParams::default();

    c.bench_function("compute_errors", |b| b.iter(|| {
        black_box(compute_errors(&read[..alignment.a_end], &noisy[..alignment.b_end], &alignment.delta, &params));
    }));
}

criterion_group!(benches, bench_string_util, bench_prefix_edit_distance, bench_compute_errors);
criterion_main!(benches);

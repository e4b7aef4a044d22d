//! Microbenchmarks for the scaled IDCT kernel family.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use jscale::idct;

fn make_block(mut seed: u32) -> [i32; 64] {
    let mut block = [0i32; 64];
    for v in block.iter_mut() {
        seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
        *v = ((seed >> 16) as i32 & 0x3FF) - 512;
    }
    block
}

fn bench_idct_sizes(c: &mut Criterion) {
    let quant = [16i32; 64];
    let block = make_block(7);

    let mut group = c.benchmark_group("idct");
    for n in [1u8, 2, 3, 4, 5, 6, 7, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let mut scratch = block;
                idct(black_box(&mut scratch), black_box(&quant), n);
                scratch[0]
            });
        });
    }
    group.finish();
}

fn bench_idct_dc_only(c: &mut Criterion) {
    // The AC-zero shortcut path of the full-size kernel.
    let quant = [16i32; 64];
    let mut block = [0i32; 64];
    block[0] = 42;

    c.bench_function("idct/8_dc_only", |b| {
        b.iter(|| {
            let mut scratch = block;
            idct(black_box(&mut scratch), black_box(&quant), 8);
            scratch[0]
        });
    });
}

criterion_group!(benches, bench_idct_sizes, bench_idct_dc_only);
criterion_main!(benches);

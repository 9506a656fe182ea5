use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use mpproc_core::{registry, CallError, Host};

/// Host that only counts returned bytes, so the timings cover decode/encode.
struct Discard(usize);

impl Host for Discard {
    fn return_mp(&mut self, mp: &[u8]) -> Result<(), CallError> {
        self.0 += mp.len();
        Ok(())
    }
}

fn bench_procedures(c: &mut Criterion) {
    let mut group = c.benchmark_group("procedures");
    group.throughput(Throughput::Elements(1));

    let small: &[u8] = &[0x92, 0x01, 0x02];
    let wide: &[u8] = &[0x92, 0xce, 0xff, 0xff, 0xff, 0xff, 0xce, 0xff, 0xff, 0xff, 0xff];

    group.bench_function("sum_fixint", |b| {
        let mut host = Discard(0);
        b.iter(|| registry::SUM.invoke(&mut host, black_box(small)));
    });

    group.bench_function("sum_uint32", |b| {
        let mut host = Discard(0);
        b.iter(|| registry::SUM.invoke(&mut host, black_box(wide)));
    });

    group.bench_function("echo", |b| {
        let mut host = Discard(0);
        b.iter(|| registry::ECHO.invoke(&mut host, black_box(wide)));
    });

    group.bench_function("lookup_qualified", |b| {
        b.iter(|| registry::lookup(black_box("procedures.sum")).is_some());
    });

    group.finish();
}

criterion_group!(benches, bench_procedures);
criterion_main!(benches);

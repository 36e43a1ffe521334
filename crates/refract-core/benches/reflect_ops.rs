use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use refract_core::value::{make_slice, new};
use refract_core::{basic, make_func, Kind, ModuleBuilder, ToValue, TypeRegistry};

fn bench_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry");
    let reg = TypeRegistry::new();
    let int = basic(Kind::Int64);
    reg.slice_of(int);
    reg.map_of(basic(Kind::String), int).unwrap();

    group.bench_function("slice_of_hit", |b| b.iter(|| reg.slice_of(black_box(int))));
    group.bench_function("map_of_hit", |b| {
        b.iter(|| reg.map_of(black_box(basic(Kind::String)), black_box(int)).unwrap())
    });
    for len in [4usize, 1024, 1 << 20] {
        reg.array_of(int, len).unwrap();
        group.bench_with_input(BenchmarkId::new("array_of_hit", len), &len, |b, &len| {
            b.iter(|| reg.array_of(int, black_box(len)).unwrap())
        });
    }
    group.finish();
}

fn bench_fields(c: &mut Criterion) {
    let reg = TypeRegistry::new();
    let mut m = ModuleBuilder::new("bench");
    let point = m
        .struct_type()
        .field("X", basic(Kind::Int64))
        .field("Y", basic(Kind::Int64))
        .field("Label", basic(Kind::String))
        .build()
        .unwrap();
    let v = new(&reg, point).deref();
    let s = v.as_struct().unwrap();

    c.bench_function("field_get", |b| {
        b.iter(|| s.field(black_box(1)).as_int().unwrap().get())
    });
    c.bench_function("field_set", |b| {
        b.iter(|| s.field(0).as_int().unwrap().set(black_box(7)))
    });
    c.bench_function("field_by_name", |b| {
        b.iter(|| s.field_by_name(black_box("Label")).unwrap())
    });
}

fn bench_calls(c: &mut Criterion) {
    let mut m = ModuleBuilder::new("bench");
    let int = basic(Kind::Int);
    let ft = m.func(&[int, int], &[int], false).unwrap();
    let add = make_func(ft, |args| {
        let sum = args[0].as_int().unwrap().get() + args[1].as_int().unwrap().get();
        vec![(sum as isize).to_value()]
    })
    .unwrap();
    let args = [1isize.to_value(), 2isize.to_value()];

    c.bench_function("call_make_func", |b| b.iter(|| add.call(black_box(&args)).unwrap()));
}

fn bench_deep_equal(c: &mut Criterion) {
    let mut group = c.benchmark_group("deep_equal");
    let reg = TypeRegistry::new();
    let st = reg.slice_of(basic(Kind::Float64));

    for len in [16usize, 256] {
        let build = || {
            let xs = make_slice(st, len, len).unwrap();
            for i in 0..len {
                xs.index(i).as_float().unwrap().set(i as f64);
            }
            xs
        };
        let (a, b) = (build(), build());
        group.bench_with_input(BenchmarkId::new("float_slice", len), &len, |bench, _| {
            bench.iter(|| a.deep_equal(black_box(&b)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_registry, bench_fields, bench_calls, bench_deep_equal);
criterion_main!(benches);

//! Benchmarks for the container pipeline.
//!
//! Measures the three phases on a synthetic container of a few hundred classes:
//! - Building and placing in natural and canonical layout
//! - Encoding a placed container
//! - Parsing an encoded container, and re-encoding it in place

extern crate dexscope;

use criterion::{criterion_group, criterion_main, Criterion};
use dexscope::prelude::*;
use std::hint::black_box;

const CLASSES: usize = 300;

/// Interns `CLASSES` classes, each extending the previous one, with one field and one method.
fn build(options: DexOptions) -> DexFile {
    let mut dex = DexFile::with_options(options);
    let object = dex.intern_type("Ljava/lang/Object;").unwrap();
    let mut superclass = object;

    for index in 0..CLASSES {
        let descriptor = format!("Lbench/C{index:04};");
        let class = dex.intern_type(&descriptor).unwrap();
        let field = dex.intern_field(&descriptor, "value", "I").unwrap();
        let method = dex.intern_method(&descriptor, "get", "I", &[]).unwrap();
        let label = dex.intern_string(&format!("class {index}")).unwrap();

        let code = dex
            .intern(
                CodeItem::new(
                    2,
                    1,
                    0,
                    vec![
                        0x001A, 0x0000, // const-string v0, label
                        0x0012, // const/4 v0, 0
                        0x000F, // return v0
                    ],
                    vec![Reference::String(label)],
                )
                .unwrap(),
            )
            .unwrap();
        let data = dex
            .intern(
                ClassDataItem::new(
                    vec![],
                    vec![EncodedField {
                        field,
                        access_flags: AccessFlags::PRIVATE,
                    }],
                    vec![],
                    vec![EncodedMethod {
                        method,
                        access_flags: AccessFlags::PUBLIC,
                        code: Some(code),
                    }],
                )
                .unwrap(),
            )
            .unwrap();

        let definition = ClassDefItem {
            class_data: Some(data),
            ..ClassDefItem::new(class, AccessFlags::PUBLIC, Some(superclass))
        };
        dex.intern(definition).unwrap();
        superclass = class;
    }
    dex
}

fn bench_build_and_place_natural(c: &mut Criterion) {
    c.bench_function("build_place_natural", |b| {
        b.iter(|| {
            let mut dex = build(DexOptions::natural());
            dex.place().unwrap();
            black_box(dex)
        });
    });
}

fn bench_build_and_place_canonical(c: &mut Criterion) {
    c.bench_function("build_place_canonical", |b| {
        b.iter(|| {
            let mut dex = build(DexOptions::canonical());
            dex.place().unwrap();
            black_box(dex)
        });
    });
}

fn bench_encode(c: &mut Criterion) {
    let mut dex = build(DexOptions::natural());
    dex.place().unwrap();

    c.bench_function("encode", |b| {
        b.iter(|| black_box(dex.encode().unwrap()));
    });
}

fn bench_parse(c: &mut Criterion) {
    let mut dex = build(DexOptions::natural());
    dex.place().unwrap();
    let bytes = dex.encode().unwrap();

    c.bench_function("parse", |b| {
        b.iter(|| black_box(DexFile::from_bytes(black_box(&bytes)).unwrap()));
    });
}

fn bench_in_place_rewrite(c: &mut Criterion) {
    let mut dex = build(DexOptions::natural());
    dex.place().unwrap();
    let bytes = dex.encode().unwrap();

    c.bench_function("in_place_rewrite", |b| {
        b.iter(|| {
            let mut parsed = DexFile::from_bytes_with(&bytes, DexOptions::in_place()).unwrap();
            parsed.place().unwrap();
            black_box(parsed.encode().unwrap())
        });
    });
}

criterion_group!(
    benches,
    bench_build_and_place_natural,
    bench_build_and_place_canonical,
    bench_encode,
    bench_parse,
    bench_in_place_rewrite
);
criterion_main!(benches);

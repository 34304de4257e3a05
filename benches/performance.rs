//! Performance benchmarks for the sample store.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{DynamicImage, Rgb, RgbImage};
use ndarray::{ArrayD, IxDyn};
use sample_store::{
    ConfigOverrides, Fields, NdArray, ReaderOptions, RecordReader, RecordType, RecordWriter, Value,
};
use std::path::PathBuf;
use tempfile::TempDir;

fn array(i: u64) -> NdArray {
    ArrayD::from_elem(IxDyn(&[64, 64]), i as f32).into()
}

fn build_numpy_store(dir: &TempDir, count: u64) -> PathBuf {
    let path = dir.path().join("store");
    let mut writer = RecordWriter::create(&path).unwrap();
    for i in 0..count {
        writer.write_numpy(i, &array(i)).unwrap();
    }
    writer.write_config(ConfigOverrides::default()).unwrap();
    writer.close().unwrap();
    path
}

/// Benchmark writing whole stores of varying size
fn bench_write_numpy(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_numpy");
    group.sample_size(10);

    for count in [100u64, 1000] {
        group.bench_with_input(BenchmarkId::new("records", count), &count, |b, &count| {
            b.iter(|| {
                let dir = TempDir::new().unwrap();
                black_box(build_numpy_store(&dir, count));
            });
        });
    }

    group.finish();
}

/// Benchmark random reads against stores of varying size
fn bench_random_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_get");

    for count in [100u64, 10_000] {
        let dir = TempDir::new().unwrap();
        let path = build_numpy_store(&dir, count);
        let reader = RecordReader::new(&path, ReaderOptions::new(RecordType::Numpy));
        reader.open().unwrap();

        group.bench_with_input(BenchmarkId::new("records", count), &count, |b, &count| {
            let mut index = 0u64;
            b.iter(|| {
                index = (index * 7919 + 13) % count;
                black_box(reader.get(index).unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark PNG re-encoding of in-memory images
fn bench_write_image(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let mut writer = RecordWriter::create(dir.path().join("store")).unwrap();
    let image = DynamicImage::ImageRgb8(RgbImage::from_fn(256, 256, |x, y| {
        Rgb([x as u8, y as u8, (x ^ y) as u8])
    }));

    let mut index = 0u64;
    c.bench_function("write_image_256", |b| {
        b.iter(|| {
            writer.write_image(index, image.clone()).unwrap();
            index += 1;
        });
    });
}

/// Benchmark dict decoding
fn bench_get_dict(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store");

    let mut writer = RecordWriter::create(&path).unwrap();
    for i in 0..1000u64 {
        let fields = Fields::from([
            ("caption".to_string(), Value::from(format!("sample {i}"))),
            ("score".to_string(), Value::from(i as f64 / 1000.0)),
            ("embedding".to_string(), Value::Array(array(i))),
        ]);
        writer.write_dict(i, &fields).unwrap();
    }
    writer.write_config(ConfigOverrides::default()).unwrap();
    writer.close().unwrap();

    let reader = RecordReader::load(path.as_path()).unwrap();
    c.bench_function("get_dict", |b| {
        b.iter(|| black_box(reader.get(500).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_write_numpy,
    bench_random_get,
    bench_write_image,
    bench_get_dict,
);

criterion_main!(benches);

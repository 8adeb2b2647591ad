//! Benchmarks for identifier generation and key-value creates

use cdmi_server::domain::model::{ContainerRequest, DataObjectRequest};
use cdmi_server::{ContainerDao, DataObjectDao, Hierarchy, KeyValueStore, ObjectIdGenerator};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;

fn bench_generate_ids(c: &mut Criterion) {
    let mut group = c.benchmark_group("object_id");
    group.throughput(Throughput::Elements(1));

    let ids = ObjectIdGenerator::default();
    group.bench_function("generate", |b| {
        b.iter(|| black_box(ids.generate()));
    });

    group.finish();
}

fn bench_kv_creates(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyvalue_store");
    group.throughput(Throughput::Elements(1));

    let hierarchy = Arc::new(Hierarchy::new(Arc::new(KeyValueStore::new())));
    let containers = ContainerDao::new(hierarchy.clone());
    let data_objects = DataObjectDao::new(hierarchy.clone());
    tokio_test::block_on(async {
        hierarchy.ensure_root().await.unwrap();
        containers
            .create_by_path("/bench", &ContainerRequest::default())
            .await
            .unwrap();
    });

    let request = DataObjectRequest {
        value: Some("x".repeat(256)),
        ..Default::default()
    };
    let mut counter = 0u64;
    group.bench_function("create_data_object", |b| {
        b.iter(|| {
            counter += 1;
            let path = format!("/bench/obj-{}", counter);
            tokio_test::block_on(data_objects.create_by_path(black_box(&path), &request)).unwrap()
        });
    });

    group.bench_function("find_by_path", |b| {
        b.iter(|| {
            tokio_test::block_on(data_objects.find_by_path(black_box("/bench/obj-1"))).unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_generate_ids, bench_kv_creates);
criterion_main!(benches);

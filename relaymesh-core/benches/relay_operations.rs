use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use relaymesh_core::core_crypto::{unwrap_session_key, wrap_session_key, SessionKey};
use relaymesh_core::core_router::forwarding::{open, seal};
use relaymesh_core::test_utils::{backbone_graph, shared_keypair};
use relaymesh_core::{Node, Route};

fn bench_shortest_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("topology_shortest_path");
    let graph = backbone_graph();

    for (start, end) in [("WA", "NY"), ("CA2", "DC"), ("CO", "GA")] {
        group.bench_with_input(
            BenchmarkId::new("backbone", format!("{}-{}", start, end)),
            &(start, end),
            |b, &(s, e)| b.iter(|| black_box(graph.shortest_path(black_box(s), black_box(e)))),
        );
    }

    group.finish();
}

fn bench_all_routes(c: &mut Criterion) {
    let mut group = c.benchmark_group("topology_all_routes");
    let graph = backbone_graph();

    group.throughput(Throughput::Elements(graph.node_count() as u64));
    group.bench_function("backbone", |b| b.iter(|| black_box(graph.all_routes())));

    group.finish();
}

fn bench_session_cipher(c: &mut Criterion) {
    let mut group = c.benchmark_group("crypto_session_cipher");
    let key = SessionKey::generate();

    for size in [64usize, 1024, 16 * 1024, 256 * 1024].iter() {
        let data = vec![0xA5u8; *size];
        let sealed = key.encrypt_bytes(&data).unwrap();
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new("encrypt", size), &data, |b, d| {
            b.iter(|| black_box(key.encrypt_bytes(black_box(d)).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("decrypt", size), &sealed, |b, s| {
            b.iter(|| black_box(key.decrypt_bytes(black_box(s)).unwrap()))
        });
    }

    group.finish();
}

fn bench_key_wrap(c: &mut Criterion) {
    let mut group = c.benchmark_group("crypto_key_wrap");
    let keys = shared_keypair(0);
    let pem = keys.public_key_pem().unwrap();
    let key = SessionKey::generate();
    let wrapped = wrap_session_key(&key, &pem).unwrap();

    group.bench_function("wrap", |b| {
        b.iter(|| black_box(wrap_session_key(&key, black_box(&pem)).unwrap()))
    });
    group.bench_function("unwrap", |b| {
        b.iter(|| black_box(unwrap_session_key(black_box(&wrapped), keys).unwrap()))
    });

    group.finish();
}

fn bench_seal_and_open(c: &mut Criterion) {
    let mut group = c.benchmark_group("forwarding_envelope");
    let path: Vec<Node> = ["A", "B", "C"]
        .iter()
        .enumerate()
        .map(|(i, name)| {
            Node::new(*name, "127.0.0.1", 9000 + i as u16)
                .with_public_key(shared_keypair(i).public_key_pem().unwrap())
        })
        .collect();
    let route = Route::new(path[0].clone(), path[2].clone(), path.clone());
    let destination = shared_keypair(2);

    group.bench_function("seal_text", |b| {
        b.iter(|| black_box(seal(&route, black_box("hello"), None).unwrap()))
    });

    let payload = vec![7u8; 64 * 1024];
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("seal_file_64k", |b| {
        b.iter(|| black_box(seal(&route, "clip.wav", Some(black_box(&payload[..]))).unwrap()))
    });

    let envelope = seal(&route, "clip.wav", Some(&payload[..])).unwrap();
    group.bench_function("open_file_64k", |b| {
        b.iter(|| black_box(open(black_box(&envelope), destination).unwrap()))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_shortest_path,
    bench_all_routes,
    bench_session_cipher,
    bench_key_wrap,
    bench_seal_and_open
);
criterion_main!(benches);

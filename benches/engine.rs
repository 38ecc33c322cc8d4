use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn bench_fingerprint(c: &mut Criterion) {
    c.bench_function("fingerprint_typical", |b| {
        b.iter(|| {
            mailtriage::fingerprint::fingerprint(
                black_box("ACME Store <promo@newsletter.acme.example>"),
                black_box("Réduction d'été — jusqu'à 50% OFF sur tout le site"),
            )
        })
    });
}

fn bench_salvage(c: &mut Criterion) {
    let strict = r#"{"category": ["Promotions"], "decision": "delete", "confidence": 0.85, "reason": "old promo", "summary": "seasonal sale announcement"}"#;
    let broken = r#"Sure, here's my take: {"decision": "delete", "confidence": 0.85, "reason": "old promo", "category": ["Promotions""#;

    c.bench_function("salvage_strict", |b| {
        b.iter(|| mailtriage::oracle::salvage::parse_response(black_box(strict)))
    });
    c.bench_function("salvage_broken", |b| {
        b.iter(|| mailtriage::oracle::salvage::parse_response(black_box(broken)))
    });
}

criterion_group!(benches, bench_fingerprint, bench_salvage);
criterion_main!(benches);

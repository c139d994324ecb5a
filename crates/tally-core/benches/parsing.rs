use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::{json, Value};

use tally_core::event::AttemptEvent;
use tally_core::identity::normalize;
use tally_core::pipeline::split_batch;

fn record(i: usize) -> Value {
    let answers: serde_json::Map<String, Value> = (1..=90)
        .map(|q| (q.to_string(), json!(["a", "B", "c", "SKIP"][(q + i) % 4])))
        .collect();
    json!({
        "event_id": format!("evt-{i}"),
        "student_name": "Bench Student",
        "student_email": format!("Student.{}+mock@Gmail.com", i % 50),
        "student_phone": null,
        "test_id": format!("test-{}", i % 3),
        "test_name": "Bench Test",
        "started_at": "2025-03-01T09:00:00+05:30",
        "submitted_at": "2025-03-01 10:00:00",
        "answers": answers
    })
}

fn bench_parse_event(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_event");

    let single = record(0);
    group.bench_function("single", |b| {
        b.iter(|| AttemptEvent::parse(black_box(single.clone())))
    });

    let batch: Vec<Value> = (0..500).map(record).collect();
    group.bench_function("split_batch_500", |b| {
        b.iter(|| split_batch(black_box(batch.clone())))
    });

    group.finish();
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize_identity");

    group.bench_function("gmail_alias", |b| {
        b.iter(|| normalize(black_box(Some("  Asha.Rao+jee@Gmail.COM ")), None))
    });

    group.bench_function("phone", |b| {
        b.iter(|| normalize(None, black_box(Some("+91 (765) 432-1098"))))
    });

    group.finish();
}

criterion_group!(benches, bench_parse_event, bench_normalize);
criterion_main!(benches);

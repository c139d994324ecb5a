use criterion::{black_box, criterion_group, criterion_main, Criterion};

use tally_core::model::{Answer, AnswerSheet, MarkingScheme};
use tally_core::scoring::score;
use tally_core::similarity::similarity;

const CHOICES: [Answer; 4] = [Answer::A, Answer::B, Answer::C, Answer::D];

fn sheet(questions: u32, shift: usize) -> AnswerSheet {
    (1..=questions)
        .map(|q| (q, CHOICES[(q as usize + shift) % 4].clone()))
        .collect()
}

/// Every seventh answer changed, the rest equal to `base`.
fn near_copy(base: &AnswerSheet) -> AnswerSheet {
    base.iter()
        .map(|(&q, a)| {
            if q % 7 == 0 {
                (q, Answer::Skip)
            } else {
                (q, a.clone())
            }
        })
        .collect()
}

fn bench_score(c: &mut Criterion) {
    let mut group = c.benchmark_group("score");
    let scheme = MarkingScheme::default();

    for questions in [25u32, 90, 200] {
        let key = sheet(questions, 0);
        let answers = near_copy(&sheet(questions, 1));
        group.bench_function(format!("questions={questions}"), |b| {
            b.iter(|| score(black_box(&answers), black_box(&key), black_box(&scheme)))
        });
    }

    group.finish();
}

fn bench_similarity(c: &mut Criterion) {
    let mut group = c.benchmark_group("similarity");

    for questions in [25u32, 90, 200] {
        let a = sheet(questions, 0);
        let b = near_copy(&a);
        group.bench_function(format!("questions={questions}"), |bench| {
            bench.iter(|| similarity(black_box(&a), black_box(&b)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_score, bench_similarity);
criterion_main!(benches);

use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use matchminer::consensus::{ConsensusConfig, ModelOutputBundle, score};
use matchminer::outcome::Outcome;
use matchminer::patterns::{Direction, RuleThresholds, classify};
use matchminer::record::{ColumnMap, RawInput, normalize};

fn sample_row() -> RawInput {
    let cells = vec![
        "2026-03-01",
        "Reds",
        "Blues",
        "HomeWin",
        "Draw",
        "AwayWin",
        "HomeWin",
        "Draw",
        "AwayWin",
        "0.45",
        "Over",
        "Yes",
        "0.81",
        "0.10",
        "1-2",
    ];
    RawInput::TableRow {
        cells: cells.into_iter().map(str::to_string).collect(),
    }
}

fn bench_normalize(c: &mut Criterion) {
    let input = sample_row();
    let columns = ColumnMap::default();
    c.bench_function("normalize_table_row", |b| {
        b.iter(|| {
            let record = normalize(black_box(&input), &columns, 0).unwrap();
            black_box(record);
        })
    });
}

fn bench_classify(c: &mut Criterion) {
    let input = sample_row();
    let columns = ColumnMap::default();
    let thresholds = RuleThresholds::default();
    let record = normalize(&input, &columns, 0).unwrap().unwrap();
    c.bench_function("classify_miss_rules", |b| {
        b.iter(|| {
            let got = classify(black_box(&record), Direction::Miss, &thresholds);
            black_box(got);
        })
    });
}

fn bench_consensus(c: &mut Criterion) {
    let bundle = ModelOutputBundle {
        poisson: Some(Outcome::Home),
        bradley_terry: Some(Outcome::Home),
        osl: Some(Outcome::Draw),
        regression: Some(Outcome::Away),
        fuzzy: Some(Outcome::Home),
        upset_diff: 0.35,
    };
    let config = ConsensusConfig::default();
    c.bench_function("consensus_score", |b| {
        b.iter(|| {
            let result = score(black_box(&bundle), &config);
            black_box(result.label);
        })
    });
}

criterion_group!(benches, bench_normalize, bench_classify, bench_consensus);
criterion_main!(benches);

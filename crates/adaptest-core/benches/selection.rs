use std::collections::{BTreeMap, HashSet};

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use adaptest_core::bank::ItemBank;
use adaptest_core::estimator::{AbilityEstimator, EstimationMethod, EstimatorSettings, Observation};
use adaptest_core::irt::Metric;
use adaptest_core::model::{Item, ItemContent, ItemId, ItemParams};
use adaptest_core::selector::{ItemSelector, SelectionContext};

fn make_bank(n: usize) -> ItemBank {
    let domains = ["verbal", "numeric", "spatial", "logical"];
    let items = (0..n)
        .map(|i| {
            Item::new(
                format!("b{i}"),
                domains[i % domains.len()],
                ItemParams::new(
                    1.0 + (i % 5) as f64 * 0.2,
                    -3.0 + 6.0 * i as f64 / n as f64,
                    0.15,
                ),
                ItemContent::default(),
                "a",
            )
            .unwrap()
        })
        .collect();
    ItemBank::new("bench", "Bench", Metric::NormalOgive, items).unwrap()
}

fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("select_next");
    let selector = ItemSelector::default();

    for size in [100, 1000] {
        let bank = make_bank(size);
        let administered: HashSet<ItemId> =
            (0..20).map(|i| ItemId::from(format!("b{i}"))).collect();
        let counts = BTreeMap::from([("verbal".to_string(), 5), ("numeric".to_string(), 5)]);
        let targets = BTreeMap::new();
        let ctx = SelectionContext {
            theta: 0.4,
            first_item: false,
            administered: &administered,
            domain_counts: &counts,
            domain_targets: &targets,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        group.bench_function(format!("bank={size}"), |b| {
            b.iter(|| selector.select_next(black_box(&bank), black_box(&ctx), &mut rng))
        });
    }

    group.finish();
}

fn bench_estimate(c: &mut Criterion) {
    let mut group = c.benchmark_group("estimate");
    let pattern: Vec<Observation> = (0..30)
        .map(|i| Observation {
            params: ItemParams::new(1.3, -1.5 + 0.1 * i as f64, 0.2),
            correct: i % 3 != 0,
        })
        .collect();

    let mle = AbilityEstimator::default();
    group.bench_function("mle_30_items", |b| {
        b.iter(|| mle.update(black_box(mle.prior()), black_box(&pattern), 1.702))
    });

    let eap = AbilityEstimator::new(EstimatorSettings {
        method: EstimationMethod::Eap,
        ..EstimatorSettings::default()
    });
    group.bench_function("eap_30_items", |b| {
        b.iter(|| eap.update(black_box(eap.prior()), black_box(&pattern), 1.702))
    });

    group.finish();
}

criterion_group!(benches, bench_select, bench_estimate);
criterion_main!(benches);

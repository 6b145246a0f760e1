//! Evaluates every option of a large generated ruleset against a selection
//! grown through mandatory closures.

#![allow(missing_docs)]

use configurator::{
    Catalog, RuleSpec, Ruleset, Rulesets, Session,
    domain::{Group, QuantifiedGroup},
};
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};

const OPTIONS: usize = 2_000;

fn id(i: usize) -> String {
    format!("opt-{:05}", i % OPTIONS)
}

fn session() -> Session {
    let catalog = Catalog::default().with_group("All", Group::flat((0..OPTIONS).map(id)));

    let ruleset: Ruleset = (0..OPTIONS)
        .map(|i| {
            let spec = RuleSpec {
                requires: vec![id(i + 1).into()],
                incompatible_with: vec![id(i + 500).into()],
                mandatory: if i % 50 == 0 {
                    vec![id(i + 2).into(), id(i + 4).into()]
                } else {
                    Vec::new()
                },
                requires_groups: vec![QuantifiedGroup::new(1, [id(i + 3), id(i + 5), id(i + 9)])],
                incompatible_groups: vec![QuantifiedGroup::with_default_min([
                    id(i + 21),
                    id(i + 23),
                ])],
            };
            (id(i).into(), spec)
        })
        .collect();

    let mut session = Session::new(
        catalog,
        Rulesets::from_sets([("large".to_string(), ruleset)], "large"),
    );
    for i in (0..OPTIONS).step_by(100) {
        session.toggle(&id(i));
    }
    session
}

fn evaluate_all(c: &mut Criterion) {
    let session = session();
    c.bench_function("evaluate all options", |b| {
        b.iter(|| session.statuses());
    });
}

fn toggle(c: &mut Criterion) {
    c.bench_function("toggle with closure", |b| {
        b.iter_batched(
            session,
            |mut session| session.toggle(&id(150)),
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, evaluate_all, toggle);
criterion_main!(benches);

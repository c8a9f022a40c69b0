use std::collections::HashMap;
use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use kinmodel::prelude::*;

fn uni_uni(name: &str, substrate: &str, product: &str, vmax: f64) -> Reaction {
    let shape = make_convenience_with_inhibition(&[-1.0, 1.0], &[]).unwrap();
    let mechanism = ConvenienceInhibited::new(
        name,
        shape,
        &[("substrate1", substrate), ("product1", product)],
        &[],
    )
    .unwrap();

    Reaction::with_parameters(
        mechanism,
        &HashMap::from([
            ("vmax_forward".to_string(), vmax),
            ("k_equilibrium".to_string(), 5.0),
            ("km_substrate1".to_string(), 0.5),
            ("km_product1".to_string(), 2.0),
        ]),
    )
    .unwrap()
}

fn pathway() -> KineticModel {
    let species = ["A", "B", "C", "D", "E", "F"];
    let reactions = species
        .windows(2)
        .enumerate()
        .map(|(i, pair)| uni_uni(&format!("R{}", i + 1), pair[0], pair[1], 10f64.powi(i as i32 - 2)))
        .collect();

    KineticModel::new(reactions, vec![]).unwrap()
}

fn benchmark_simulation(c: &mut Criterion) {
    let y0 = vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0];

    c.bench_function("build_rhs", |b| {
        b.iter(|| {
            let mut model = pathway();
            let _ = black_box(model.build_rhs(SimulationType::Qssa).is_ok());
        });
    });

    for solver in [SolverMethod::AdaptiveBdf, SolverMethod::Rk45] {
        let mut model = pathway();
        let options = SolverOptionsBuilder::default()
            .solver(solver)
            .rel_tol(1e-6)
            .abs_tol(1e-9)
            .build()
            .expect("Failed to build solver options");

        c.bench_function(&format!("pathway_{}", solver), |b| {
            b.iter(|| {
                let _ = black_box(model.solve(
                    black_box((0.0, 50.0)),
                    black_box(y0.clone()),
                    black_box(&options),
                ));
            });
        });
    }
}

criterion_group!(benches, benchmark_simulation);
criterion_main!(benches);

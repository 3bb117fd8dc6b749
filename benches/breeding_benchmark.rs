use criterion::{Criterion, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::time::Duration;
use sylva::params::ParameterDatabase;
use sylva::state::EvolutionState;

// Helper to create a minimal but realistic run: one subpopulation of
// register-machine trees with the standard crossover pipeline.
fn setup_state(size: usize) -> EvolutionState {
    let parameters = ParameterDatabase::parse(&format!(
        "seed = 42\n\
         generations = 10\n\
         pop.subpops = 1\n\
         pop.subpop.0.size = {size}\n\
         pop.subpop.0.species.pipe = crossover\n\
         pop.subpop.0.species.pipe.source.0 = tournament\n\
         pop.subpop.0.species.pipe.source.1 = same\n"
    ))
    .unwrap();
    let mut state = EvolutionState::new(parameters);
    state.start_fresh().unwrap();
    state
}

fn benchmark_generation_turn(c: &mut Criterion) {
    let mut group = c.benchmark_group("EvolutionState Performance");
    group.measurement_time(Duration::from_secs(20));

    group.bench_function("evaluate_and_breed_512", |b| {
        b.iter(|| {
            // A fresh state per iteration so every turn starts unevaluated.
            let mut state = setup_state(512);
            state.evolve().unwrap()
        })
    });

    group.bench_function("populate_512", |b| {
        let state = setup_state(512);
        let pop = state.population.as_ref().unwrap();
        b.iter(|| {
            let mut subpop = pop.subpops[0].empty_clone();
            let mut rng = StdRng::seed_from_u64(7);
            subpop.populate(&mut rng);
            subpop
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_generation_turn);
criterion_main!(benches);

//! Benchmark planning and Q-gradient computation for the differentiable planners.
use criterion::{
    criterion_group, criterion_main, measurement::Measurement, BenchmarkGroup, Criterion,
};
use mlirl::envs::{Chain, TabularMdp};
use mlirl::rewards::{LinearStateRf, OneHotFeatures};
use mlirl::planning::TransitionSampling;
use mlirl::{BuildPlanner, DifferentiableViConfig, Prng, QGradientPlanner, SparseSamplingConfig};
use rand::SeedableRng;

const NUM_STATES: usize = 20;

fn random_mdp() -> TabularMdp {
    let mut rng = Prng::seed_from_u64(0);
    TabularMdp::random_dirichlet(NUM_STATES, 4, 0.5, 0.9, &mut rng).unwrap()
}

fn reward_fn(num_states: usize) -> LinearStateRf<OneHotFeatures> {
    let parameters = (0..num_states).map(|i| (i % 3) as f64 - 1.0).collect();
    LinearStateRf::new(OneHotFeatures::new(num_states)).with_parameters(parameters)
}

/// Benchmark planning from scratch followed by a Q-gradient query.
fn benchmark_planner<T, B, M>(group: &mut BenchmarkGroup<T>, name: &str, builder: &B, domain: M)
where
    T: Measurement,
    M: mlirl::Mdp<State = usize>,
    B: BuildPlanner<M, LinearStateRf<OneHotFeatures>>,
{
    let mut planner = builder.build_planner(domain, reward_fn(NUM_STATES), 1.0, 0);
    group.bench_function(name, |b| {
        b.iter(|| {
            planner.reset_solver();
            planner.q_gradients(&0).unwrap()
        })
    });
}

fn bench_planners(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_and_q_gradients");
    let vi = DifferentiableViConfig::default();
    benchmark_planner(&mut group, "vi_tabular", &vi, random_mdp());
    benchmark_planner(&mut group, "vi_chain", &vi, Chain::new(NUM_STATES, 0.9, 0.2));

    let exact = SparseSamplingConfig {
        horizon: 4,
        ..SparseSamplingConfig::default()
    };
    benchmark_planner(&mut group, "sparse_exact_tabular", &exact, random_mdp());
    let sampled = SparseSamplingConfig {
        horizon: 4,
        sampling: TransitionSampling::Sampled(3),
        ..SparseSamplingConfig::default()
    };
    benchmark_planner(&mut group, "sparse_sampled_tabular", &sampled, random_mdp());
    let variable = SparseSamplingConfig {
        variable_sample_count: true,
        ..sampled
    };
    benchmark_planner(&mut group, "sparse_variable_tabular", &variable, random_mdp());
    group.finish();
}

criterion_group!(benches, bench_planners);
criterion_main!(benches);

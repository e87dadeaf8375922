use latentfield::prelude::*;
use nalgebra::DVector;

fn spread_points(n: usize, offset: f64) -> PointSet {
    let lonlat: Vec<[f64; 2]> = (0..n)
        .map(|i| {
            let t = offset + i as f64;
            [0.5 * t.sin() + 0.07 * t, 0.4 * t.cos() - 0.05 * t]
        })
        .collect();
    PointSet::spatial(&lonlat).unwrap()
}

fn flat_density(_theta: &Hyperparams, _latent: &DVector<f64>) -> LogDensity {
    LogDensity::Finite(0.0)
}

fn build_model(seed: u64) -> LatentFieldModel {
    let interior = spread_points(4, 0.0);
    let exterior = spread_points(6, 5.0);
    let initial = Hyperparams::Spatial(SpatialParams::new(1.0, 0.7, 1.5));
    LatentFieldModel::builder(interior, exterior, 4, initial)
        .seed(seed)
        .build()
        .unwrap()
}

#[test]
fn chain_accepts_and_rejects() {
    let mut sampler = build_model(1)
        .into_sampler(flat_density)
        .seed(2)
        .build()
        .unwrap();
    let stats = sampler.run(200);
    assert_eq!(stats.iterations, 200);
    assert!(
        stats.accepted > 0,
        "a flat density should accept some proposals"
    );
    assert!(
        stats.accepted < 200,
        "random-walk proposals should not all be admissible"
    );
}

#[test]
fn seeded_chains_are_reproducible() {
    let run = |seed: u64| {
        let trace = MemoryTrace::shared();
        let mut sampler = build_model(7)
            .into_sampler(flat_density)
            .seed(seed)
            .trace(trace.clone())
            .build()
            .unwrap();
        sampler.run(100);
        trace.series("theta")
    };
    assert_eq!(run(42), run(42), "same seed must reproduce the chain");
    assert_ne!(run(42), run(43), "different seeds must diverge");
}

#[test]
fn rejected_proposals_leave_state_untouched() {
    // The callback zeroes every move away from the initial amplitude, so
    // each iteration must revert; the accepted state stays bit-for-bit
    // equal to the initial one.
    let model = build_model(3);
    let initial_theta = model.hyperparams().to_vector();
    let initial_latent = model.latent().clone();
    let initial_pivots = model.factor().pivots().to_vec();

    let density = move |theta: &Hyperparams, _latent: &DVector<f64>| {
        let Hyperparams::Spatial(p) = theta else {
            return LogDensity::Zero;
        };
        if (p.amp - 1.0).abs() > 1e-12 {
            LogDensity::Zero
        } else {
            LogDensity::Finite(0.0)
        }
    };

    let mut sampler = model.into_sampler(density).seed(4).build().unwrap();
    let stats = sampler.run(50);
    assert_eq!(stats.accepted, 0, "every proposal should hit zero density");
    assert_eq!(sampler.state().hyper().to_vector(), initial_theta);
    assert_eq!(sampler.state().latent(), &initial_latent);
    assert_eq!(sampler.state().factor().pivots(), initial_pivots.as_slice());
}

#[test]
fn zero_density_at_initial_state_is_fatal() {
    let result = build_model(5)
        .into_sampler(|_: &Hyperparams, _: &DVector<f64>| LogDensity::Zero)
        .seed(6)
        .build();
    assert!(result.is_err());
}

#[test]
fn latent_stays_consistent_with_factor_across_acceptances() {
    let mut sampler = build_model(8)
        .into_sampler(flat_density)
        .seed(9)
        .build()
        .unwrap();
    for _ in 0..100 {
        sampler.step();
        let state = sampler.state();
        assert_eq!(state.latent().len(), state.factor().rank());
        assert_eq!(state.full_rank_points().len(), state.factor().rank());
        // Kriging weights stay derivable from the current pair.
        let recomputed = state.factor().krige_weights(state.latent()).unwrap();
        assert!((state.krige_weights() - &recomputed).norm() < 1e-10);
    }
}

#[test]
fn rank_deficient_proposals_are_rejected() {
    // Two nearly identical points: any proposed length-scale much larger
    // than their separation collapses the covariance to numerical rank one,
    // and the hard rank cap must reject every such proposal.
    let interior = PointSet::spatial(&[[0.0, 0.0]]).unwrap();
    let exterior = PointSet::spatial(&[[1e-9, 0.0]]).unwrap();
    let initial = Hyperparams::Spatial(SpatialParams::new(1.0, 1e-10, 0.5));
    let model = LatentFieldModel::builder(interior, exterior, 2, initial)
        .seed(10)
        .build()
        .unwrap();

    let mut sampler = model
        .into_sampler(flat_density)
        .seed(11)
        .scales(vec![0.05, 0.5, 0.05])
        .build()
        .unwrap();

    let mut saw_rank_deficient = false;
    for _ in 0..200 {
        match sampler.step() {
            StepOutcome::Rejected(RejectReason::RankDeficient { achieved, limit }) => {
                saw_rank_deficient = true;
                assert!(achieved < limit);
            }
            StepOutcome::Accepted | StepOutcome::Rejected(_) => {}
        }
        assert_eq!(
            sampler.state().factor().rank(),
            2,
            "a rank-deficient factor must never be committed"
        );
    }
    assert!(
        saw_rank_deficient,
        "large-scale proposals should have produced rank-deficient factorizations"
    );
}

#[test]
fn degenerate_rank_at_construction_is_fatal() {
    // Two exactly identical points cannot support rank 2 at all.
    let interior = PointSet::spatial(&[[0.2, 0.1]]).unwrap();
    let exterior = PointSet::spatial(&[[0.2, 0.1]]).unwrap();
    let initial = Hyperparams::Spatial(SpatialParams::new(1.0, 0.5, 1.5));
    let result = LatentFieldModel::builder(interior, exterior, 2, initial)
        .seed(12)
        .build();
    assert!(result.is_err());
}

#[test]
fn adaptation_reestimates_proposal_covariance() {
    let mut sampler = build_model(13)
        .into_sampler(flat_density)
        .seed(14)
        .delay(20)
        .interval(10)
        .build()
        .unwrap();
    let before = sampler.proposal_cholesky().clone();
    sampler.run(300);
    assert!(
        sampler.acceptance_rate() > 0.0,
        "chain should still be moving"
    );
    let after = sampler.proposal_cholesky();
    assert!(
        (&before - after).abs().max() > 1e-12,
        "proposal covariance should have been re-estimated from the history"
    );
}

#[test]
fn trace_records_accepted_values() {
    let trace = MemoryTrace::shared();
    let mut sampler = build_model(15)
        .into_sampler(flat_density)
        .seed(16)
        .trace(trace.clone())
        .build()
        .unwrap();
    let stats = sampler.run(100);
    assert_eq!(trace.len("theta"), stats.accepted);
    assert_eq!(trace.len("latent"), stats.accepted);
    if let Some(TraceValue::Vector(theta)) = trace.series("theta").first() {
        assert_eq!(theta.len(), 3);
    } else {
        panic!("theta series should hold vector samples");
    }
}

#[test]
fn prediction_tracing_evaluates_on_acceptance() {
    let trace = MemoryTrace::shared();
    let eval = PointSet::spatial(&[[0.0, 0.0], [0.5, 0.5]]).unwrap();
    let mut sampler = build_model(17)
        .into_sampler(flat_density)
        .seed(18)
        .trace(trace.clone())
        .trace_predictions(eval)
        .build()
        .unwrap();
    let stats = sampler.run(60);
    assert_eq!(trace.len("prediction"), stats.accepted);
}

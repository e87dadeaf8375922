use latentfield::prelude::*;
use latentfield::DEFAULT_TOLERANCE;
use nalgebra::DMatrix;

fn random_psd(n: usize, seed: u64) -> DMatrix<f64> {
    let mut rng = fastrand::Rng::with_seed(seed);
    let a = DMatrix::from_fn(n, n, |_, _| rng.f64() * 2.0 - 1.0);
    let mut k = &a * a.transpose();
    for i in 0..n {
        k[(i, i)] += 0.5;
    }
    k
}

#[test]
fn truncated_factor_reconstructs_full_rank_block() {
    // The leading square factor reproduces the covariance at the pivoted
    // full-rank points exactly, even when the factorization is truncated.
    let k = random_psd(6, 21);
    let factor = pivoted_cholesky(&k, 3, DEFAULT_TOLERANCE).unwrap();
    assert_eq!(factor.rank(), 3);

    let leading = factor.leading();
    let gram = leading.transpose() * &leading;
    let piv = factor.full_rank_pivots();
    for i in 0..3 {
        for j in 0..3 {
            let expected = k[(piv[i], piv[j])];
            assert!(
                (gram[(i, j)] - expected).abs() < 1e-9,
                "full-rank block mismatch at ({i}, {j}): {} vs {expected}",
                gram[(i, j)]
            );
        }
    }
}

#[test]
fn kernel_matrix_factorization_is_deterministic() {
    let pts = PointSet::spatial(&[
        [0.0, 0.0],
        [0.5, 0.3],
        [-0.4, 0.6],
        [1.1, -0.2],
        [-0.8, -0.5],
    ])
    .unwrap();
    let kernel = CovarianceKernel::new(Hyperparams::Spatial(SpatialParams::new(1.0, 0.7, 1.5)))
        .unwrap();
    let cov = kernel.evaluate_symmetric(&pts).unwrap();

    let a = pivoted_cholesky(&cov, 4, DEFAULT_TOLERANCE).unwrap();
    let b = pivoted_cholesky(&cov, 4, DEFAULT_TOLERANCE).unwrap();
    assert_eq!(a.pivots(), b.pivots(), "pivot choice must be deterministic");
    assert_eq!(a.factor(), b.factor());
}

#[test]
fn pivot_diagonals_never_increase() {
    let k = random_psd(10, 33);
    let factor = pivoted_cholesky(&k, 10, DEFAULT_TOLERANCE).unwrap();
    let u = factor.factor();
    for i in 1..factor.rank() {
        assert!(
            u[(i, i)] <= u[(i - 1, i - 1)] + 1e-12,
            "diagonal increased at step {i}"
        );
    }
}

#[test]
fn non_psd_matrix_fails_without_panicking() {
    let k = DMatrix::from_row_slice(3, 3, &[1.0, 0.0, 3.0, 0.0, 1.0, 0.0, 3.0, 0.0, 1.0]);
    match pivoted_cholesky(&k, 3, DEFAULT_TOLERANCE) {
        Err(e) => {
            let msg = e.to_string();
            assert!(msg.contains("not positive semi-definite"), "got: {msg}");
        }
        Ok(_) => panic!("indefinite matrix must not factorize"),
    }
}

#[test]
fn rank_one_matrix_truncates() {
    let k = DMatrix::from_element(4, 4, 2.0);
    let factor = pivoted_cholesky(&k, 3, DEFAULT_TOLERANCE).unwrap();
    assert_eq!(factor.rank(), 1);
    // Ties broke toward the lowest original index.
    assert_eq!(factor.full_rank_pivots(), &[0]);
}

#[test]
fn rank_limit_bounds_enforced() {
    let k = DMatrix::identity(3, 3);
    assert!(pivoted_cholesky(&k, 0, DEFAULT_TOLERANCE).is_err());
    assert!(pivoted_cholesky(&k, 4, DEFAULT_TOLERANCE).is_err());
    assert!(pivoted_cholesky(&k, 3, DEFAULT_TOLERANCE).is_ok());
}

#[test]
fn latent_prior_decreases_away_from_mode() {
    let k = random_psd(3, 44);
    let factor = pivoted_cholesky(&k, 3, DEFAULT_TOLERANCE).unwrap();
    let at_zero = factor
        .latent_log_density(&nalgebra::DVector::zeros(3))
        .value()
        .unwrap();
    let away = factor
        .latent_log_density(&nalgebra::DVector::from_element(3, 5.0))
        .value()
        .unwrap();
    assert!(at_zero > away, "density must peak at the origin");
}

//! Symmetric eigendecomposition and pseudo-inverse solves.
//!
//! The regression is solved through the normal equations of its centred,
//! unit-norm columns. That Gram matrix can be singular (collinear factors,
//! fewer rows than factors), so systems are solved with an
//! eigenvalue-truncated pseudo-inverse, which yields the minimum-norm
//! least-squares solution.

use crate::error::{ModelError, Result};
use ndarray::{Array1, Array2};

/// Eigenvalues below this fraction of the largest one are treated as zero.
pub const RCOND: f64 = 1e-12;

/// Result of eigenvalue decomposition
#[derive(Debug, Clone)]
pub struct EigenDecomposition {
    /// Eigenvalues (sorted in descending order)
    pub eigenvalues: Array1<f64>,
    /// Eigenvectors (columns are eigenvectors)
    pub eigenvectors: Array2<f64>,
}

/// Jacobi eigenvalue decomposition for symmetric matrices
///
/// # Arguments
/// * `matrix` - Symmetric matrix to decompose
/// * `max_iterations` - Maximum number of rotations
/// * `tolerance` - Convergence tolerance for off-diagonal elements, relative
///   to the largest diagonal magnitude
///
/// # Returns
/// * Eigenvalues and eigenvectors
pub fn jacobi_eigendecomp(
    matrix: &Array2<f64>,
    max_iterations: usize,
    tolerance: f64,
) -> Result<EigenDecomposition> {
    let n = matrix.nrows();
    if n != matrix.ncols() {
        return Err(ModelError::DimensionMismatch {
            expected: n,
            actual: matrix.ncols(),
        });
    }
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::Solver(
            "matrix contains non-finite values".to_string(),
        ));
    }

    let mut a = matrix.clone();
    let mut v = Array2::<f64>::eye(n);

    let scale = (0..n).map(|i| a[[i, i]].abs()).fold(1.0, f64::max);

    if n > 1 {
        for _iter in 0..max_iterations {
            let (p, q, max_val) = find_largest_off_diagonal(&a);

            if max_val.abs() < tolerance * scale {
                break;
            }

            let (cos_theta, sin_theta) = compute_rotation(a[[p, p]], a[[q, q]], a[[p, q]]);
            apply_jacobi_rotation(&mut a, &mut v, p, q, cos_theta, sin_theta);
        }
    }

    let eigenvalues: Array1<f64> = (0..n).map(|i| a[[i, i]]).collect();

    // Sort eigenvalues and eigenvectors in descending order
    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&i, &j| eigenvalues[j].total_cmp(&eigenvalues[i]));

    let sorted_eigenvalues = indices.iter().map(|&i| eigenvalues[i]).collect();
    let mut sorted_eigenvectors = Array2::<f64>::zeros((n, n));
    for (new_idx, &old_idx) in indices.iter().enumerate() {
        sorted_eigenvectors
            .column_mut(new_idx)
            .assign(&v.column(old_idx));
    }

    Ok(EigenDecomposition {
        eigenvalues: sorted_eigenvalues,
        eigenvectors: sorted_eigenvectors,
    })
}

/// Find the largest off-diagonal element in a symmetric matrix
fn find_largest_off_diagonal(matrix: &Array2<f64>) -> (usize, usize, f64) {
    let n = matrix.nrows();
    let mut max_val = 0.0;
    let mut p = 0;
    let mut q = 1;

    for i in 0..n {
        for j in (i + 1)..n {
            let val = matrix[[i, j]].abs();
            if val > max_val {
                max_val = val;
                p = i;
                q = j;
            }
        }
    }

    (p, q, matrix[[p, q]])
}

/// Rotation (cos, sin) that zeroes `a[p, q]`
fn compute_rotation(app: f64, aqq: f64, apq: f64) -> (f64, f64) {
    if apq.abs() < f64::MIN_POSITIVE {
        return (1.0, 0.0);
    }

    let tau = (aqq - app) / (2.0 * apq);
    let t = if tau >= 0.0 {
        1.0 / (tau + (1.0 + tau * tau).sqrt())
    } else {
        -1.0 / (-tau + (1.0 + tau * tau).sqrt())
    };

    let cos_theta = 1.0 / (1.0 + t * t).sqrt();
    (cos_theta, t * cos_theta)
}

/// Apply a Jacobi rotation to matrix A and eigenvector matrix V
fn apply_jacobi_rotation(
    a: &mut Array2<f64>,
    v: &mut Array2<f64>,
    p: usize,
    q: usize,
    cos_theta: f64,
    sin_theta: f64,
) {
    let n = a.nrows();

    let app = a[[p, p]];
    let aqq = a[[q, q]];
    let apq = a[[p, q]];

    a[[p, p]] = cos_theta * cos_theta * app - 2.0 * cos_theta * sin_theta * apq
        + sin_theta * sin_theta * aqq;
    a[[q, q]] = sin_theta * sin_theta * app
        + 2.0 * cos_theta * sin_theta * apq
        + cos_theta * cos_theta * aqq;
    a[[p, q]] = 0.0;
    a[[q, p]] = 0.0;

    for i in 0..n {
        if i != p && i != q {
            let aip = a[[i, p]];
            let aiq = a[[i, q]];

            a[[i, p]] = cos_theta * aip - sin_theta * aiq;
            a[[p, i]] = a[[i, p]];

            a[[i, q]] = sin_theta * aip + cos_theta * aiq;
            a[[q, i]] = a[[i, q]];
        }
    }

    for i in 0..n {
        let vip = v[[i, p]];
        let viq = v[[i, q]];

        v[[i, p]] = cos_theta * vip - sin_theta * viq;
        v[[i, q]] = sin_theta * vip + cos_theta * viq;
    }
}

/// Rotation budget for an `n x n` matrix.
const fn max_rotations(n: usize) -> usize {
    100 * (n * n + 1)
}

/// Solve `a x = b` for a symmetric positive semi-definite `a`.
///
/// Uses the pseudo-inverse `V diag(1/λ) Vᵀ`, dropping eigenvalues below
/// [`RCOND`] times the largest. For a singular `a` the result is the
/// minimum-norm solution; a zero matrix yields a zero vector.
pub fn solve_symmetric(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    if b.len() != n {
        return Err(ModelError::DimensionMismatch {
            expected: n,
            actual: b.len(),
        });
    }
    if n == 0 {
        return Ok(Array1::zeros(0));
    }

    let decomp = jacobi_eigendecomp(a, max_rotations(n), 1e-15)?;
    let largest = decomp.eigenvalues[0];
    if largest <= 0.0 {
        return Ok(Array1::zeros(n));
    }
    let cutoff = largest * RCOND;

    // x = Σ_k (v_kᵀ b / λ_k) v_k over retained eigenpairs
    let mut x = Array1::<f64>::zeros(n);
    for (k, &lambda) in decomp.eigenvalues.iter().enumerate() {
        if lambda <= cutoff {
            continue;
        }
        let v_k = decomp.eigenvectors.column(k);
        let weight = v_k.dot(b) / lambda;
        x.scaled_add(weight, &v_k);
    }

    Ok(x)
}

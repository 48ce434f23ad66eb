//! Dense symmetric linear-algebra helpers shared by the crate.

use nalgebra::{DMatrix, DVector, SymmetricEigen};

use crate::error::MeanFieldError;

/// Eigenvalues of the overlap matrix below this threshold indicate a
/// (near-)linearly dependent basis.
pub(crate) const OVERLAP_EPS: f64 = 1e-10;

#[inline(always)]
/// Create a symmetric, square matrix. Function is only run for upper triangle of the matrix
pub(crate) fn symmetric_matrix(n: usize, mut func: impl FnMut(usize, usize) -> f64) -> DMatrix<f64> {
    let m = DMatrix::from_fn(n, n, |i, j| if i <= j { func(i, j) } else { 0.0 });
    DMatrix::from_fn(n, n, |i, j| if i <= j { m[(i, j)] } else { m[(j, i)] })
}

pub(crate) fn eigs(matrix: DMatrix<f64>) -> (DMatrix<f64>, DVector<f64>) {
    let eigs = SymmetricEigen::new(matrix);
    (eigs.eigenvectors, eigs.eigenvalues)
}

/// Symmetric eigendecomposition with eigenvalues in ascending order.
pub(crate) fn sorted_eigs(matrix: DMatrix<f64>) -> (DMatrix<f64>, DVector<f64>) {
    let (eigenvectors, eigenvalues) = eigs(matrix);

    let mut val_vec_pairs = eigenvalues
        .into_iter()
        .zip(eigenvectors.column_iter())
        .collect::<Vec<_>>();

    val_vec_pairs.sort_unstable_by(|(a, _), (b, _)| a.total_cmp(b));

    let (values, vectors): (Vec<_>, Vec<_>) = val_vec_pairs.into_iter().unzip();

    (
        DMatrix::from_columns(&vectors),
        DVector::from_column_slice(&values),
    )
}

/// Raises a symmetric positive-definite matrix to the given power through
/// its eigendecomposition. Eigenvalues at or below [`OVERLAP_EPS`] are a
/// [`MeanFieldError::SingularOverlap`]: silently discarding them would hide
/// a linearly dependent basis from the caller.
fn symmetric_power(matrix: &DMatrix<f64>, exponent: f64) -> Result<DMatrix<f64>, MeanFieldError> {
    let (u, values) = eigs(matrix.clone());

    let mut powered = DVector::zeros(values.len());
    for (i, &value) in values.iter().enumerate() {
        if value <= OVERLAP_EPS {
            return Err(MeanFieldError::SingularOverlap {
                eigenvalue: value,
                epsilon: OVERLAP_EPS,
            });
        }
        powered[i] = value.powf(exponent);
    }

    Ok(&u * DMatrix::from_diagonal(&powered) * u.transpose())
}

/// The symmetric orthogonalizer `S^{-1/2}` of an overlap matrix.
pub(crate) fn symmetric_orthogonalizer(
    overlap: &DMatrix<f64>,
) -> Result<DMatrix<f64>, MeanFieldError> {
    symmetric_power(overlap, -0.5)
}

/// The symmetric square root `S^{1/2}` of an overlap matrix.
pub(crate) fn symmetric_sqrt(overlap: &DMatrix<f64>) -> Result<DMatrix<f64>, MeanFieldError> {
    symmetric_power(overlap, 0.5)
}

/// Pseudo-inverse of a symmetric matrix: eigenvalues whose magnitude is at
/// most `epsilon` are dropped instead of inverted.
pub(crate) fn symmetric_pinv(matrix: &DMatrix<f64>, epsilon: f64) -> DMatrix<f64> {
    let (u, values) = eigs(matrix.clone());
    let inverted = DVector::from_fn(values.len(), |i, _| {
        if values[i].abs() > epsilon {
            1.0 / values[i]
        } else {
            0.0
        }
    });
    &u * DMatrix::from_diagonal(&inverted) * u.transpose()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn sample_overlap() -> DMatrix<f64> {
        DMatrix::from_row_slice(2, 2, &[1.0, 0.6593, 0.6593, 1.0])
    }

    #[test]
    fn sorted_eigs_ascending() {
        let m = symmetric_matrix(4, |i, j| ((3 + i * j) as f64).sin());
        let (vectors, values) = sorted_eigs(m.clone());

        for i in 1..values.len() {
            assert!(values[i] >= values[i - 1]);
        }
        // eigenpairs reproduce the matrix
        let rebuilt = &vectors * DMatrix::from_diagonal(&values) * vectors.transpose();
        assert_relative_eq!((rebuilt - m).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn orthogonalizer_whitens_the_overlap() {
        let overlap = sample_overlap();
        let x = symmetric_orthogonalizer(&overlap).unwrap();
        let identity = x.transpose() * &overlap * &x;
        assert_relative_eq!(
            (identity - DMatrix::identity(2, 2)).norm(),
            0.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn sqrt_squares_back() {
        let overlap = sample_overlap();
        let half = symmetric_sqrt(&overlap).unwrap();
        assert_relative_eq!((&half * &half - overlap).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn singular_overlap_is_rejected() {
        let singular = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        assert!(matches!(
            symmetric_orthogonalizer(&singular),
            Err(MeanFieldError::SingularOverlap { .. })
        ));
    }

    #[test]
    fn pinv_of_full_rank_matrix_is_inverse() {
        let overlap = sample_overlap();
        let inv = symmetric_pinv(&overlap, 1e-12);
        assert_relative_eq!(
            (&overlap * inv - DMatrix::identity(2, 2)).norm(),
            0.0,
            epsilon = 1e-12
        );
    }
}

//! Projection of occupied orbitals onto a new basis set.
//!
//! Used to recycle a converged wavefunction as the initial guess after a
//! basis-set change. Only the occupied orbitals are carried over; energies
//! are reset and higher orbitals zeroed — enough to seed a new SCF run.

use nalgebra::DMatrix;

use crate::error::MeanFieldError;
use crate::linalg::symmetric_pinv;
use crate::orbitals::Orbitals;

/// Project the occupied orbitals of `old` onto a new basis with the
/// modified Gram-Schmidt algorithm.
///
/// `olp_new_old` is the mixed overlap block between the new and the old
/// basis functions (new rows, old columns) and `olp_new` the overlap of the
/// new basis with itself. Orthogonalization happens in the metric of the
/// new basis; a renormalization norm below `eps` means the projected
/// orbitals are redundant in the new basis and is fatal.
pub fn project_orbitals(
    olp_new_old: &DMatrix<f64>,
    olp_new: &DMatrix<f64>,
    old: &Orbitals,
    eps: f64,
) -> Result<Orbitals, MeanFieldError> {
    let nbasis_new = olp_new.nrows();
    let projector = symmetric_pinv(olp_new, eps) * olp_new_old;

    let occupied: Vec<usize> = (0..old.norb())
        .filter(|&i| old.occupations[i] > 0.0)
        .collect();
    if occupied.len() > nbasis_new {
        return Err(MeanFieldError::ElectronCount(format!(
            "{} occupied orbitals do not fit in a basis of {} functions",
            occupied.len(),
            nbasis_new
        )));
    }

    let mut new = Orbitals::new(nbasis_new, nbasis_new);
    for (inew, &iold) in occupied.iter().enumerate() {
        let projected = &projector * old.coeffs.column(iold);
        new.coeffs.set_column(inew, &projected);
        new.occupations[inew] = old.occupations[iold];
    }

    // modified Gram-Schmidt in the metric of the new basis
    let metric_dot = |u: &DMatrix<f64>, i: usize, j: usize| {
        let si = olp_new * u.column(j);
        u.column(i).dot(&si)
    };

    for i in 0..occupied.len() {
        for j in 0..i {
            let overlap_ij = metric_dot(&new.coeffs, j, i);
            let correction = new.coeffs.column(j) * overlap_ij;
            let reduced = new.coeffs.column(i) - correction;
            new.coeffs.set_column(i, &reduced);
        }

        let norm = metric_dot(&new.coeffs, i, i).sqrt();
        if !(norm > eps) {
            return Err(MeanFieldError::ProjectionFailure { norm, epsilon: eps });
        }
        let normalized = new.coeffs.column(i) / norm;
        new.coeffs.set_column(i, &normalized);
    }

    Ok(new)
}

//! The optimal-damping SCF solver.
//!
//! Plain SCF can oscillate or diverge. This solver performs a line search
//! between the current density matrices (state 0) and the matrices obtained
//! from one diagonalization step (state 1): the energy along the line is
//! interpolated by the unique cubic matching both endpoint energies and
//! endpoint derivatives, and the next state is the analytic minimizer of
//! that cubic. Energies decrease monotonically.

use nalgebra::DMatrix;

use crate::error::MeanFieldError;
use crate::hamiltonian::EffectiveHamiltonian;
use crate::occupation::OccupationModel;
use crate::orbitals::Orbitals;
use crate::scf::ScfConvergence;
use crate::utils::check_dm;

/// Tolerance on density-matrix eigenvalue bounds at entry.
const DM_EPS: f64 = 1e-4;

/// Optimal-damping SCF over density matrices.
#[derive(Debug, Clone)]
pub struct OdaScfSolver {
    pub threshold: f64,
    /// `None` iterates until convergence, however long that takes.
    pub maxiter: Option<usize>,
}

impl Default for OdaScfSolver {
    fn default() -> Self {
        Self {
            threshold: 1e-6,
            maxiter: Some(128),
        }
    }
}

impl OdaScfSolver {
    pub fn new(threshold: f64, maxiter: Option<usize>) -> Self {
        Self { threshold, maxiter }
    }

    /// Drive the density matrices to self-consistency in place.
    ///
    /// The input matrices must be valid states (natural occupations within
    /// `[0, 1]`). On return — converged or not — `dms` holds a valid state,
    /// so the call can be repeated with a small iteration budget to advance
    /// in slices.
    pub fn solve(
        &self,
        ham: &mut EffectiveHamiltonian,
        overlap: &DMatrix<f64>,
        occ_model: &OccupationModel,
        dms: &mut [DMatrix<f64>],
    ) -> Result<ScfConvergence, MeanFieldError> {
        if dms.len() != ham.ndm() {
            return Err(MeanFieldError::Unsupported(format!(
                "the solver got {} density matrix(es) for a {}-channel Hamiltonian",
                dms.len(),
                ham.ndm()
            )));
        }
        for dm in dms.iter() {
            check_dm(dm, overlap, DM_EPS, 1.0)?;
        }

        let n = overlap.nrows();
        let mut focks0 = vec![DMatrix::zeros(n, n); ham.ndm()];
        let mut focks1 = vec![DMatrix::zeros(n, n); ham.ndm()];
        let mut converged = false;
        let mut iterations = 0;
        let mut last_residual = f64::INFINITY;

        while self.maxiter.map_or(true, |maxiter| iterations < maxiter) {
            // state 0: the current density matrices
            ham.reset(dms)?;
            ham.clear(None);
            let energy0 = ham.compute_energy()?;
            for fock in focks0.iter_mut() {
                fock.fill(0.0);
            }
            ham.compute_fock(&mut focks0)?;

            // state 1: one plain diagonalization step away
            let mut orbs = focks0
                .iter()
                .map(|fock| Orbitals::from_fock(fock, overlap))
                .collect::<Result<Vec<_>, _>>()?;
            occ_model.assign(&mut orbs)?;
            let dm1s: Vec<DMatrix<f64>> = orbs.iter().map(Orbitals::to_dm).collect();

            ham.reset(&dm1s)?;
            ham.clear(None);
            let energy1 = ham.compute_energy()?;
            for fock in focks1.iter_mut() {
                fock.fill(0.0);
            }
            ham.compute_fock(&mut focks1)?;

            // one-sided energy derivatives at the endpoints
            let mut deriv0 = 0.0;
            let mut deriv1 = 0.0;
            for idm in 0..dms.len() {
                let step = &dm1s[idm] - &dms[idm];
                deriv0 += focks0[idm].dot(&step);
                deriv1 += focks1[idm].dot(&step);
            }
            deriv0 *= ham.deriv_scale();
            deriv1 *= ham.deriv_scale();

            let mixing = find_min_cubic(energy0, energy1, deriv0, deriv1);
            iterations += 1;

            last_residual = 0.0;
            for idm in 0..dms.len() {
                let dm2 = &dms[idm] * (1.0 - mixing) + &dm1s[idm] * mixing;
                last_residual = last_residual.max((&dm2 - &dms[idm]).norm());
                dms[idm] = dm2;
            }

            log::info!(
                "oda iteration {iterations:<4} - mixing {mixing:6.4} - step {last_residual:12.5e} - energy {energy0:+.10}"
            );

            if last_residual < self.threshold {
                converged = true;
                // a converged state must be stationary: a sizable gradient
                // here means the line search and the fixed point disagree
                if deriv0.abs() > self.threshold.sqrt() {
                    return Err(MeanFieldError::GradientAtConvergence { gradient: deriv0 });
                }
                break;
            }
        }

        // leave the Hamiltonian consistent with the state handed back
        ham.reset(dms)?;
        ham.clear(None);

        Ok(ScfConvergence {
            converged,
            iterations,
            residual: last_residual,
        })
    }
}

/// The minimizer in `[0, 1]` of the cubic `p` with `p(0) = f0`,
/// `p(1) = f1`, `p'(0) = g0`, `p'(1) = g1`.
///
/// When the cubic has no interior minimum in range, the lower-energy
/// endpoint is returned.
pub fn find_min_cubic(f0: f64, f1: f64, g0: f64, g1: f64) -> f64 {
    // p(x) = a x^3 + b x^2 + c x + d
    let d = f0;
    let c = g0;
    let a = g1 + c - 2.0 * (f1 - d);
    let b = f1 - a - c - d;

    let discriminant = b * b - 3.0 * a * c;
    if discriminant >= 0.0 {
        if b * b > (3.0 * a * c).abs() * 1e5 {
            // the cubic term is numerically negligible; minimize the
            // parabola instead
            if b > 0.0 {
                let x = -0.5 * c / b;
                if (0.0..=1.0).contains(&x) {
                    return x;
                }
            }
        } else {
            let root = discriminant.sqrt();
            for x in [(-b + root) / (3.0 * a), (-b - root) / (3.0 * a)] {
                // an in-range root with positive curvature is the minimum
                if (0.0..=1.0).contains(&x) && 6.0 * a * x + 2.0 * b > 0.0 {
                    return x;
                }
            }
        }
    }

    if f0 < f1 {
        0.0
    } else {
        1.0
    }
}

/// The cubic coefficients `(a, b, c, d)` fitted by [`find_min_cubic`];
/// shared with the interpolation tests.
#[cfg(test)]
pub(crate) fn cubic_coefficients(f0: f64, f1: f64, g0: f64, g1: f64) -> (f64, f64, f64, f64) {
    let d = f0;
    let c = g0;
    let a = g1 + c - 2.0 * (f1 - d);
    let b = f1 - a - c - d;
    (a, b, c, d)
}

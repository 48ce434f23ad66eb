//! The plain diagonalization-based SCF fixed point.

use nalgebra::DMatrix;

use crate::error::MeanFieldError;
use crate::hamiltonian::EffectiveHamiltonian;
use crate::occupation::OccupationModel;
use crate::orbitals::Orbitals;
use crate::scf::ScfConvergence;
use crate::utils::compute_commutator;

/// Iterates build-Fock / diagonalize / reoccupy until the commutator
/// residual `||S D F - F D S||` drops below the threshold.
#[derive(Debug, Clone)]
pub struct PlainScfSolver {
    pub threshold: f64,
    /// `None` iterates until convergence, however long that takes.
    pub maxiter: Option<usize>,
}

impl Default for PlainScfSolver {
    fn default() -> Self {
        Self {
            threshold: 1e-8,
            maxiter: Some(128),
        }
    }
}

impl PlainScfSolver {
    pub fn new(threshold: f64, maxiter: Option<usize>) -> Self {
        Self { threshold, maxiter }
    }

    /// The convergence error of the given expansions under `ham`.
    pub fn error(
        &self,
        ham: &mut EffectiveHamiltonian,
        overlap: &DMatrix<f64>,
        orbs: &[Orbitals],
    ) -> Result<f64, MeanFieldError> {
        let dms: Vec<DMatrix<f64>> = orbs.iter().map(Orbitals::to_dm).collect();
        ham.reset(&dms)?;
        ham.clear(None);

        let n = overlap.nrows();
        let mut focks = vec![DMatrix::zeros(n, n); ham.ndm()];
        ham.compute_fock(&mut focks)?;
        Ok(residual(&focks, &dms, overlap))
    }

    /// Drive the expansions to self-consistency in place.
    pub fn solve(
        &self,
        ham: &mut EffectiveHamiltonian,
        overlap: &DMatrix<f64>,
        occ_model: &OccupationModel,
        orbs: &mut [Orbitals],
    ) -> Result<ScfConvergence, MeanFieldError> {
        if orbs.len() != ham.ndm() {
            return Err(MeanFieldError::Unsupported(format!(
                "the solver got {} expansion(s) for a {}-channel Hamiltonian",
                orbs.len(),
                ham.ndm()
            )));
        }

        let n = overlap.nrows();
        let mut focks = vec![DMatrix::zeros(n, n); ham.ndm()];
        let mut converged = false;
        let mut iterations = 0;
        let mut last_residual = f64::INFINITY;

        loop {
            let dms: Vec<DMatrix<f64>> = orbs.iter().map(Orbitals::to_dm).collect();
            // the state changed (or is fresh): invalidate before building
            ham.reset(&dms)?;
            ham.clear(None);

            for fock in focks.iter_mut() {
                fock.fill(0.0);
            }
            ham.compute_fock(&mut focks)?;

            last_residual = residual(&focks, &dms, overlap);
            log::info!("scf iteration {iterations:<4} - residual {last_residual:12.5e}");

            if last_residual < self.threshold {
                converged = true;
                break;
            }
            if self.maxiter.is_some_and(|maxiter| iterations >= maxiter) {
                break;
            }

            for (orb, fock) in orbs.iter_mut().zip(&focks) {
                *orb = Orbitals::from_fock(fock, overlap)?;
            }
            occ_model.assign(orbs)?;
            iterations += 1;
        }

        Ok(ScfConvergence {
            converged,
            iterations,
            residual: last_residual,
        })
    }
}

fn residual(focks: &[DMatrix<f64>], dms: &[DMatrix<f64>], overlap: &DMatrix<f64>) -> f64 {
    focks
        .iter()
        .zip(dms)
        .map(|(fock, dm)| compute_commutator(dm, fock, overlap).norm())
        .fold(0.0, f64::max)
}

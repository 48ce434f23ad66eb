//! Small wavefunction utilities shared by the solvers and by callers.

use nalgebra::DMatrix;

use crate::error::MeanFieldError;
use crate::orbitals::Orbitals;

/// Check that the natural occupations of a density matrix lie in
/// `[0, occ_max]` within `eps`. A violation means the matrix does not
/// represent a valid ensemble state and is rejected as input.
pub fn check_dm(
    dm: &DMatrix<f64>,
    overlap: &DMatrix<f64>,
    eps: f64,
    occ_max: f64,
) -> Result<(), MeanFieldError> {
    let occupations = Orbitals::naturals(dm, overlap)?;
    let min = occupations.min();
    let max = occupations.max();
    if min < -eps || max > occ_max + eps {
        return Err(MeanFieldError::InvalidDensityMatrix { min, max, occ_max });
    }
    Ok(())
}

/// The level-shift operator `S D S` for a given density matrix.
pub fn level_shift(dm: &DMatrix<f64>, overlap: &DMatrix<f64>) -> DMatrix<f64> {
    overlap.transpose() * dm * overlap
}

/// The commutator `S D F - F D S`, whose norm vanishes at self-consistency.
pub fn compute_commutator(
    dm: &DMatrix<f64>,
    fock: &DMatrix<f64>,
    overlap: &DMatrix<f64>,
) -> DMatrix<f64> {
    overlap * dm * fock - fock * dm * overlap
}

/// Expectation values of the projected and squared spin, `(<S_z>, <S^2>)`.
///
/// The correction term accounts for the mismatch in overlap between the
/// occupied alpha and beta orbitals.
pub fn spin_expectation(
    orb_alpha: &Orbitals,
    orb_beta: &Orbitals,
    overlap: &DMatrix<f64>,
) -> (f64, f64) {
    let nalpha = orb_alpha.occupations.sum();
    let nbeta = orb_beta.occupations.sum();
    let sz = (nalpha - nbeta) / 2.0;

    let mut correction = 0.0;
    for ialpha in 0..orb_alpha.norb() {
        if orb_alpha.occupations[ialpha] == 0.0 {
            continue;
        }
        for ibeta in 0..orb_beta.norb() {
            if orb_beta.occupations[ibeta] == 0.0 {
                continue;
            }
            let ca = orb_alpha.coeffs.column(ialpha);
            let cb = orb_beta.coeffs.column(ibeta);
            let mixed = overlap * cb;
            correction += ca.dot(&mixed).powi(2);
        }
    }

    let ssq = sz * (sz + 1.0) + nbeta - correction;
    (sz, ssq)
}

/// The HOMO and LUMO energies over a set of expansions. The LUMO is `None`
/// when every orbital is occupied.
pub fn homo_lumo(orbs: &[&Orbitals]) -> (Option<f64>, Option<f64>) {
    let homo = orbs
        .iter()
        .filter_map(|orb| orb.homo_energy())
        .fold(None, |acc, e| Some(acc.map_or(e, |a: f64| a.max(e))));
    let lumo = orbs
        .iter()
        .filter_map(|orb| orb.lumo_energy())
        .fold(None, |acc, e| Some(acc.map_or(e, |a: f64| a.min(e))));
    (homo, lumo)
}

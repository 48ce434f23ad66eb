//! Initial guess for the SCF iteration.

use nalgebra::DMatrix;

use crate::error::MeanFieldError;
use crate::orbitals::Orbitals;

/// Seed the expansions by diagonalizing the core (one-electron) Hamiltonian
/// against the overlap. Occupations are left zeroed; assigning them is the
/// occupation model's job.
pub fn guess_core_hamiltonian(
    overlap: &DMatrix<f64>,
    core: &DMatrix<f64>,
    orbs: &mut [Orbitals],
) -> Result<(), MeanFieldError> {
    for orb in orbs.iter_mut() {
        *orb = Orbitals::from_fock(core, overlap)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use nalgebra::DMatrix;

    use super::*;

    #[test]
    fn guess_fills_all_channels_with_sorted_orbitals() {
        let overlap = DMatrix::from_row_slice(2, 2, &[1.0, 0.4, 0.4, 1.0]);
        let core = DMatrix::from_row_slice(2, 2, &[-1.5, -0.7, -0.7, -0.9]);

        let mut orbs = [Orbitals::new(2, 2), Orbitals::new(2, 2)];
        guess_core_hamiltonian(&overlap, &core, &mut orbs).unwrap();

        for orb in &orbs {
            assert!(orb.energies[0] <= orb.energies[1]);
            assert!(orb.check_normalization(&overlap, 1e-10));
            assert_eq!(orb.occupations.sum(), 0.0);
        }
        assert_eq!(orbs[0], orbs[1]);
    }
}

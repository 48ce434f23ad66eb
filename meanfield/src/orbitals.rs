//! Orbital expansions: coefficients, energies and occupations for one spin
//! channel.

use nalgebra::{DMatrix, DVector};

use crate::error::MeanFieldError;
use crate::linalg::{sorted_eigs, symmetric_orthogonalizer, symmetric_sqrt};

/// The expansion of one spin channel in the basis: a coefficient matrix
/// (one column per orbital), the orbital energies in ascending order and the
/// occupation numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct Orbitals {
    pub coeffs: DMatrix<f64>,
    pub energies: DVector<f64>,
    pub occupations: DVector<f64>,
}

impl Orbitals {
    /// An empty expansion with `norb` zeroed orbitals over `nbasis`
    /// functions.
    pub fn new(nbasis: usize, norb: usize) -> Self {
        Self {
            coeffs: DMatrix::zeros(nbasis, norb),
            energies: DVector::zeros(norb),
            occupations: DVector::zeros(norb),
        }
    }

    pub fn nbasis(&self) -> usize {
        self.coeffs.nrows()
    }

    pub fn norb(&self) -> usize {
        self.coeffs.ncols()
    }

    /// Solves the generalized symmetric eigenproblem `F C = S C E` and
    /// returns the expansion with energies in ascending order and zeroed
    /// occupations.
    ///
    /// The overlap is whitened with its symmetric orthogonalizer, so a
    /// near-singular overlap surfaces as [`MeanFieldError::SingularOverlap`].
    pub fn from_fock(fock: &DMatrix<f64>, overlap: &DMatrix<f64>) -> Result<Self, MeanFieldError> {
        let x = symmetric_orthogonalizer(overlap)?;
        let transformed = x.transpose() * fock * &x;
        let (primed, energies) = sorted_eigs(transformed);
        let coeffs = x * primed;

        let norb = coeffs.ncols();
        Ok(Self {
            coeffs,
            energies,
            occupations: DVector::zeros(norb),
        })
    }

    /// The density matrix of this channel, `D = C diag(occ) C^T`.
    pub fn to_dm(&self) -> DMatrix<f64> {
        &self.coeffs * DMatrix::from_diagonal(&self.occupations) * self.coeffs.transpose()
    }

    /// Natural occupations of a density matrix: the eigenvalues of
    /// `S^{1/2} D S^{1/2}`, ascending.
    pub fn naturals(
        dm: &DMatrix<f64>,
        overlap: &DMatrix<f64>,
    ) -> Result<DVector<f64>, MeanFieldError> {
        let half = symmetric_sqrt(overlap)?;
        let symmetrized = &half * dm * &half;
        let (_, occupations) = sorted_eigs(symmetrized);
        Ok(occupations)
    }

    /// The highest orbital energy with a non-zero occupation.
    pub fn homo_energy(&self) -> Option<f64> {
        self.energies
            .iter()
            .zip(self.occupations.iter())
            .filter(|(_, &occ)| occ > 0.0)
            .map(|(&e, _)| e)
            .fold(None, |acc, e| Some(acc.map_or(e, |a: f64| a.max(e))))
    }

    /// The lowest orbital energy with a zero occupation.
    pub fn lumo_energy(&self) -> Option<f64> {
        self.energies
            .iter()
            .zip(self.occupations.iter())
            .filter(|(_, &occ)| occ == 0.0)
            .map(|(&e, _)| e)
            .fold(None, |acc, e| Some(acc.map_or(e, |a: f64| a.min(e))))
    }

    /// Whether every orbital satisfies `<c|S|c> = 1` within `eps`.
    pub fn check_normalization(&self, overlap: &DMatrix<f64>, eps: f64) -> bool {
        self.coeffs.column_iter().all(|c| {
            let sc = overlap * c;
            (c.dot(&sc) - 1.0).abs() < eps
        })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};

    use super::*;

    fn two_level_problem() -> (DMatrix<f64>, DMatrix<f64>) {
        let fock = DMatrix::from_row_slice(2, 2, &[-1.0, -0.4, -0.4, 0.5]);
        let overlap = DMatrix::from_row_slice(2, 2, &[1.0, 0.25, 0.25, 1.0]);
        (fock, overlap)
    }

    #[test]
    fn from_fock_solves_the_generalized_problem() {
        let (fock, overlap) = two_level_problem();
        let orbs = Orbitals::from_fock(&fock, &overlap).unwrap();

        assert!(orbs.energies[0] <= orbs.energies[1]);
        // F c = e S c for each pair
        for i in 0..2 {
            let c = orbs.coeffs.column(i).clone_owned();
            let residual = &fock * &c - &overlap * &c * orbs.energies[i];
            assert_relative_eq!(residual.norm(), 0.0, epsilon = 1e-12);
        }
        assert!(orbs.check_normalization(&overlap, 1e-12));
    }

    #[test]
    fn density_matrix_traces_to_the_occupation() {
        let (fock, overlap) = two_level_problem();
        let mut orbs = Orbitals::from_fock(&fock, &overlap).unwrap();
        orbs.occupations = DVector::from_column_slice(&[1.0, 0.0]);

        let dm = orbs.to_dm();
        // Tr(D S) equals the number of electrons in the channel
        assert_relative_eq!((&dm * &overlap).trace(), 1.0, epsilon = 1e-12);

        let naturals = Orbitals::naturals(&dm, &overlap).unwrap();
        assert_relative_eq!(naturals.max(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(naturals.min(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn homo_lumo_split_by_occupation() {
        let mut orbs = Orbitals::new(3, 3);
        orbs.energies = DVector::from_column_slice(&[-0.9, -0.3, 0.4]);
        orbs.occupations = DVector::from_column_slice(&[1.0, 1.0, 0.0]);

        assert_eq!(orbs.homo_energy(), Some(-0.3));
        assert_eq!(orbs.lumo_energy(), Some(0.4));

        orbs.occupations = DVector::from_column_slice(&[1.0, 1.0, 1.0]);
        assert_eq!(orbs.lumo_energy(), None);
    }
}

//! Non-interacting response of a converged orbital expansion.

use nalgebra::DMatrix;

use crate::orbitals::Orbitals;

/// Orbital-energy differences closer than this are treated as degenerate
/// and excluded from the sum over states.
const DEGENERACY_EPS: f64 = 1e-12;

/// The non-interacting (sum-over-states) response matrix for a list of
/// one-electron operators.
///
/// Entry `(p, q)` is `sum_ij O^p_ij O^q_ij (occ_i - occ_j) / (e_i - e_j)`
/// with the operators transformed to the orbital basis; diagonal and
/// degenerate orbital pairs are skipped.
pub fn noninteracting_response(orb: &Orbitals, operators: &[DMatrix<f64>]) -> DMatrix<f64> {
    let coeffs = &orb.coeffs;
    let norb = orb.norb();
    let nop = operators.len();

    // transform the operators to the orbital basis
    let work: Vec<DMatrix<f64>> = operators
        .iter()
        .map(|op| coeffs.transpose() * op * coeffs)
        .collect();

    let mut prefacs = DMatrix::zeros(norb, norb);
    for i in 0..norb {
        for j in 0..norb {
            let denom = orb.energies[i] - orb.energies[j];
            if i != j && denom.abs() > DEGENERACY_EPS {
                prefacs[(i, j)] = (orb.occupations[i] - orb.occupations[j]) / denom;
            }
        }
    }

    // double loop over operator pairs; only the lower triangle is evaluated
    let mut result = DMatrix::zeros(nop, nop);
    for p in 0..nop {
        for q in 0..=p {
            let mut state_sum = 0.0;
            for i in 0..norb {
                for j in 0..norb {
                    state_sum += work[p][(i, j)] * work[q][(i, j)] * prefacs[(i, j)];
                }
            }
            result[(p, q)] = state_sum;
            result[(q, p)] = state_sum;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};

    use super::*;

    fn sample_orbitals() -> Orbitals {
        let mut orb = Orbitals::new(2, 2);
        orb.coeffs = DMatrix::identity(2, 2);
        orb.energies = DVector::from_column_slice(&[-1.0, 0.5]);
        orb.occupations = DVector::from_column_slice(&[1.0, 0.0]);
        orb
    }

    #[test]
    fn response_matrix_is_symmetric() {
        let orb = sample_orbitals();
        let op1 = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 1.0, 0.0]);
        let op2 = DMatrix::from_row_slice(2, 2, &[1.0, 0.3, 0.3, -1.0]);

        let response = noninteracting_response(&orb, &[op1, op2]);
        assert_eq!(response.nrows(), 2);
        assert_relative_eq!(response[(0, 1)], response[(1, 0)], epsilon = 1e-15);
    }

    #[test]
    fn two_level_response_matches_the_closed_form() {
        // one occupied, one virtual level split by 1.5: the response to an
        // off-diagonal coupling of strength t is 2 t^2 (o0 - o1) / (e0 - e1)
        let orb = sample_orbitals();
        let t = 0.7;
        let op = DMatrix::from_row_slice(2, 2, &[0.0, t, t, 0.0]);

        let response = noninteracting_response(&orb, &[op]);
        let expected = 2.0 * t * t * (1.0 - 0.0) / (-1.0 - 0.5);
        assert_relative_eq!(response[(0, 0)], expected, epsilon = 1e-14);
    }

    #[test]
    fn diagonal_operators_do_not_respond() {
        // an operator diagonal in the orbital basis cannot mix states
        let orb = sample_orbitals();
        let op = DMatrix::from_row_slice(2, 2, &[0.4, 0.0, 0.0, -0.2]);
        let response = noninteracting_response(&orb, &[op]);
        assert_relative_eq!(response[(0, 0)], 0.0, epsilon = 1e-15);
    }
}

//! The serialized bundle of integrals a calculation starts from.
//!
//! Basis-set construction and integral evaluation are external concerns;
//! this crate consumes their output as an immutable [`SystemData`] computed
//! once per basis/geometry.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::MeanFieldError;
use crate::tensor::ElectronRepulsion;

/// One-electron operators, the two-electron tensor and the electron counts
/// of a molecular system in a fixed basis.
#[derive(Clone, Serialize, Deserialize)]
pub struct SystemData {
    pub overlap: DMatrix<f64>,
    pub kinetic: DMatrix<f64>,
    pub nuclear_attraction: DMatrix<f64>,
    pub electron_repulsion: ElectronRepulsion,
    /// nuclear-nuclear repulsion energy
    pub nuclear_repulsion: f64,
    pub nalpha: f64,
    pub nbeta: f64,
}

impl SystemData {
    pub fn nbasis(&self) -> usize {
        self.overlap.nrows()
    }

    /// The one-electron (core) Hamiltonian, kinetic plus nuclear attraction.
    pub fn core_hamiltonian(&self) -> DMatrix<f64> {
        &self.kinetic + &self.nuclear_attraction
    }

    /// Check that all operators act on the same basis and the electron
    /// counts make sense.
    pub fn validate(&self) -> Result<(), MeanFieldError> {
        let n = self.nbasis();
        let square = |m: &DMatrix<f64>| m.nrows() == n && m.ncols() == n;
        if !square(&self.overlap) || !square(&self.kinetic) || !square(&self.nuclear_attraction) {
            return Err(MeanFieldError::Unsupported(
                "one-electron operators do not share a common basis size".into(),
            ));
        }
        if self.electron_repulsion.nbasis() != n {
            return Err(MeanFieldError::Unsupported(
                "the two-electron tensor does not match the one-electron basis size".into(),
            ));
        }
        if self.nalpha < 0.0 || self.nbeta < 0.0 || self.nalpha + self.nbeta == 0.0 {
            return Err(MeanFieldError::ElectronCount(format!(
                "nalpha = {}, nbeta = {}",
                self.nalpha, self.nbeta
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::h2_sto3g;

    #[test]
    fn fixture_validates() {
        h2_sto3g().validate().unwrap();
    }

    #[test]
    fn serde_round_trip_preserves_the_operators() {
        let system = h2_sto3g();
        let encoded = serde_json::to_string(&system).unwrap();
        let decoded: super::SystemData = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded.overlap, system.overlap);
        assert_eq!(decoded.kinetic, system.kinetic);
        assert_eq!(decoded.nuclear_repulsion, system.nuclear_repulsion);
        assert_eq!(
            decoded.electron_repulsion[(0, 1, 0, 1)],
            system.electron_repulsion[(0, 1, 0, 1)]
        );
    }
}

//! Mean-field electronic-structure engine: effective Hamiltonians composed
//! from pluggable energy terms, an operator cache with explicit
//! invalidation, and SCF solvers (plain fixed point and optimal damping).
//!
//! Integral evaluation, basis sets and quadrature grids are external
//! collaborators: the crate consumes one-electron operators, the
//! two-electron tensor and grid callbacks, and produces total energies,
//! per-term energy breakdowns, Fock operators and converged orbital
//! expansions.

pub mod builder;
pub mod cache;
pub mod error;
pub mod grid;
pub mod guess;
pub mod hamiltonian;
mod linalg;
pub mod observable;
pub mod occupation;
pub mod orbitals;
pub mod project;
pub mod response;
pub mod scf;
pub mod system;
pub mod tensor;
pub mod utils;

pub use builder::{hartree_fock_hamiltonian, HamiltonianBuilder};
pub use cache::{CacheTag, OperatorCache};
pub use error::MeanFieldError;
pub use hamiltonian::EffectiveHamiltonian;
pub use observable::{DirectTerm, ExchangeTerm, OneElectronTerm, SpinModel, Term};
pub use occupation::OccupationModel;
pub use orbitals::Orbitals;
pub use scf::{find_min_cubic, OdaScfSolver, PlainScfSolver, ScfConvergence};
pub use system::SystemData;
pub use tensor::ElectronRepulsion;

pub mod testing {
    //! Fixtures shared by the unit tests and benchmarks: a minimal
    //! two-electron reference system, a deterministic synthetic system, and
    //! tabulated grid/functional collaborators.

    use nalgebra::{DMatrix, DVector};

    use crate::grid::{GridFunctional, MolecularGrid};
    use crate::observable::SpinModel;
    use crate::system::SystemData;
    use crate::tensor::ElectronRepulsion;

    /// H2 at a bond length of 1.4 bohr in the STO-3G basis; the classic
    /// two-electron, two-basis-function restricted system with tabulated
    /// integrals.
    pub fn h2_sto3g() -> SystemData {
        let overlap = DMatrix::from_row_slice(2, 2, &[1.0, 0.6593, 0.6593, 1.0]);
        let kinetic = DMatrix::from_row_slice(2, 2, &[0.7600, 0.2365, 0.2365, 0.7600]);
        // attraction to both nuclei combined
        let nuclear_attraction =
            DMatrix::from_row_slice(2, 2, &[-1.8804, -1.1948, -1.1948, -1.8804]);

        let electron_repulsion = ElectronRepulsion::from_fn(2, |a, b, c, d| {
            if a == b && c == d {
                if a == c {
                    0.7746
                } else {
                    0.5697
                }
            } else if a != b && c != d {
                0.2970
            } else {
                0.4441
            }
        });

        SystemData {
            overlap,
            kinetic,
            nuclear_attraction,
            electron_repulsion,
            nuclear_repulsion: 1.0 / 1.4,
            nalpha: 1.0,
            nbeta: 1.0,
        }
    }

    /// The closed-form ground-state energy of [`h2_sto3g`]: by symmetry the
    /// occupied orbital is the normalized gerade combination, so the
    /// restricted energy can be evaluated without running any SCF.
    pub fn h2_sto3g_reference_energy(system: &SystemData) -> f64 {
        let s01 = system.overlap[(0, 1)];
        let core = system.core_hamiltonian();
        let c2 = 1.0 / (2.0 * (1.0 + s01));

        let h_mo = c2 * (2.0 * core[(0, 0)] + 2.0 * core[(0, 1)]);
        let mut eri_sum = 0.0;
        for a in 0..2 {
            for b in 0..2 {
                for c in 0..2 {
                    for d in 0..2 {
                        eri_sum += system.electron_repulsion[(a, b, c, d)];
                    }
                }
            }
        }
        let j_mo = c2 * c2 * eri_sum;

        2.0 * h_mo + j_mo + system.nuclear_repulsion
    }

    /// A deterministic, well-conditioned n-basis system for property tests
    /// where no physical reference value is needed.
    pub fn synthetic(n: usize) -> SystemData {
        let overlap = DMatrix::from_fn(n, n, |i, j| {
            if i == j {
                1.0
            } else {
                0.2 / (1.0 + i.abs_diff(j) as f64)
            }
        });
        let kinetic = DMatrix::from_fn(n, n, |i, j| {
            if i == j {
                0.6 + 0.1 * i as f64
            } else {
                0.1 / (1.0 + i.abs_diff(j).pow(2) as f64)
            }
        });
        let nuclear_attraction =
            DMatrix::from_fn(n, n, |i, j| -1.2 / (1.0 + 0.3 * (i + j) as f64));

        // separable positive-semidefinite tensor with exact 8-fold symmetry
        let p0 = DMatrix::from_fn(n, n, |i, j| 0.8 / (1.0 + (i + j) as f64));
        let p1 = DMatrix::from_fn(n, n, |i, j| if i == j { 0.5 } else { 0.05 });
        let electron_repulsion = ElectronRepulsion::from_fn(n, |a, b, c, d| {
            p0[(a, b)] * p0[(c, d)] + p1[(a, b)] * p1[(c, d)]
        });

        SystemData {
            overlap,
            kinetic,
            nuclear_attraction,
            electron_repulsion,
            nuclear_repulsion: 0.5,
            nalpha: 1.0,
            nbeta: 1.0,
        }
    }

    /// A quadrature grid backed by tabulated basis-function values: row `k`
    /// of `values` holds the basis functions at point `k`, `gradients[x]`
    /// the corresponding Cartesian derivatives.
    pub struct TabulatedGrid {
        pub weights: DVector<f64>,
        pub values: DMatrix<f64>,
        pub gradients: [DMatrix<f64>; 3],
    }

    impl TabulatedGrid {
        /// A deterministic sample grid over `nbasis` functions.
        pub fn sample(npoint: usize, nbasis: usize) -> Self {
            let values = DMatrix::from_fn(npoint, nbasis, |k, i| {
                (-0.1 * (k as f64 - 1.5 * i as f64).powi(2)).exp()
            });
            let gradients = [0, 1, 2].map(|x| {
                DMatrix::from_fn(npoint, nbasis, |k, i| {
                    0.3 * ((1 + x) as f64 * 0.4 + k as f64 * 0.2 - i as f64 * 0.5).sin()
                })
            });
            Self {
                weights: DVector::from_fn(npoint, |k, _| 0.4 + 0.1 * (k % 3) as f64),
                values,
                gradients,
            }
        }
    }

    impl MolecularGrid for TabulatedGrid {
        fn npoint(&self) -> usize {
            self.weights.len()
        }

        fn compute_density(&self, dm: &DMatrix<f64>) -> DVector<f64> {
            DVector::from_fn(self.npoint(), |k, _| {
                let row = self.values.row(k);
                (row * dm * row.transpose())[(0, 0)]
            })
        }

        fn compute_gradient(&self, dm: &DMatrix<f64>) -> DMatrix<f64> {
            DMatrix::from_fn(self.npoint(), 3, |k, x| {
                let row = self.values.row(k);
                let drow = self.gradients[x].row(k);
                2.0 * (drow * dm * row.transpose())[(0, 0)]
            })
        }

        fn integrate(&self, values: &DVector<f64>) -> f64 {
            self.weights.dot(values)
        }

        fn compute_density_fock(&self, pot: &DVector<f64>) -> DMatrix<f64> {
            let weighted = self.weights.component_mul(pot);
            self.values.transpose() * DMatrix::from_diagonal(&weighted) * &self.values
        }

        fn compute_gradient_fock(&self, pot: &DMatrix<f64>) -> DMatrix<f64> {
            let nbasis = self.values.ncols();
            let mut fock = DMatrix::zeros(nbasis, nbasis);
            for x in 0..3 {
                let weighted = self.weights.component_mul(&pot.column(x).clone_owned());
                let half =
                    self.gradients[x].transpose() * DMatrix::from_diagonal(&weighted) * &self.values;
                fock += &half + half.transpose();
            }
            fock
        }
    }

    /// The spin-degeneracy factor folded into grid energies.
    fn spin_degeneracy(spin: SpinModel) -> f64 {
        match spin {
            SpinModel::Restricted => 2.0,
            SpinModel::Unrestricted => 1.0,
        }
    }

    /// A local toy functional `e = c * rho^power` per spin channel.
    pub struct PowerFunctional {
        pub label: String,
        pub coefficient: f64,
        pub power: i32,
    }

    impl GridFunctional for PowerFunctional {
        fn label(&self) -> &str {
            &self.label
        }

        fn compute_energy(
            &self,
            spin: SpinModel,
            grid: &dyn MolecularGrid,
            rho: &[&DVector<f64>],
            _grad: &[&DMatrix<f64>],
        ) -> f64 {
            spin_degeneracy(spin)
                * self.coefficient
                * rho
                    .iter()
                    .map(|rho| grid.integrate(&rho.map(|r| r.powi(self.power))))
                    .sum::<f64>()
        }

        fn add_potential(
            &self,
            _spin: SpinModel,
            rho: &[&DVector<f64>],
            _grad: &[&DMatrix<f64>],
            dpot: &mut [DVector<f64>],
            _gpot: &mut [DMatrix<f64>],
        ) {
            for (out, rho) in dpot.iter_mut().zip(rho) {
                *out += rho.map(|r| self.coefficient * self.power as f64 * r.powi(self.power - 1));
            }
        }
    }

    /// A gradient-dependent toy functional `e = c * |grad rho|^2` per spin
    /// channel.
    pub struct GradientSquareFunctional {
        pub label: String,
        pub coefficient: f64,
    }

    impl GridFunctional for GradientSquareFunctional {
        fn label(&self) -> &str {
            &self.label
        }

        fn uses_gradient(&self) -> bool {
            true
        }

        fn compute_energy(
            &self,
            spin: SpinModel,
            grid: &dyn MolecularGrid,
            _rho: &[&DVector<f64>],
            grad: &[&DMatrix<f64>],
        ) -> f64 {
            spin_degeneracy(spin)
                * self.coefficient
                * grad
                    .iter()
                    .map(|grad| {
                        let squared =
                            DVector::from_fn(grad.nrows(), |k, _| grad.row(k).norm_squared());
                        grid.integrate(&squared)
                    })
                    .sum::<f64>()
        }

        fn add_potential(
            &self,
            _spin: SpinModel,
            _rho: &[&DVector<f64>],
            grad: &[&DMatrix<f64>],
            _dpot: &mut [DVector<f64>],
            gpot: &mut [DMatrix<f64>],
        ) {
            for (out, grad) in gpot.iter_mut().zip(grad) {
                *out += *grad * (2.0 * self.coefficient);
            }
        }
    }
}

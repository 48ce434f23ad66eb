//! Assembles effective Hamiltonians from user terms, with optional
//! completion of the standard terms and a validation policy.
//!
//! This is deliberately kept outside the Hamiltonian/solver core: the hot
//! path never guesses at missing terms, it only works with what the builder
//! produced.

use nalgebra::DMatrix;

use crate::error::MeanFieldError;
use crate::grid::{GridFunctional, GridGroup, MolecularGrid};
use crate::hamiltonian::EffectiveHamiltonian;
use crate::observable::{DirectTerm, ExchangeTerm, OneElectronTerm, SpinModel, Term};
use crate::tensor::ElectronRepulsion;

/// Labels of the auto-completed standard terms.
pub const KINETIC_LABEL: &str = "kin";
pub const NUCLEAR_LABEL: &str = "ne";
pub const HARTREE_LABEL: &str = "hartree";

/// Collects terms and policy flags, then produces a validated
/// [`EffectiveHamiltonian`].
pub struct HamiltonianBuilder<'a> {
    spin: SpinModel,
    terms: Vec<Term<'a>>,
    grid: Option<&'a dyn MolecularGrid>,
    functionals: Vec<Box<dyn GridFunctional>>,
    standard: Option<StandardOperators<'a>>,
    external: f64,
    strict: bool,
}

struct StandardOperators<'a> {
    kinetic: DMatrix<f64>,
    nuclear: DMatrix<f64>,
    eri: &'a ElectronRepulsion,
}

impl<'a> HamiltonianBuilder<'a> {
    pub fn new(spin: SpinModel) -> Self {
        Self {
            spin,
            terms: Vec::new(),
            grid: None,
            functionals: Vec::new(),
            standard: None,
            external: 0.0,
            strict: false,
        }
    }

    /// The fixed external (nuclear repulsion) energy.
    pub fn external(mut self, energy: f64) -> Self {
        self.external = energy;
        self
    }

    /// Append a user-supplied term.
    pub fn term(mut self, term: Term<'a>) -> Self {
        self.terms.push(term);
        self
    }

    /// The quadrature grid for functional terms.
    pub fn grid(mut self, grid: &'a dyn MolecularGrid) -> Self {
        self.grid = Some(grid);
        self
    }

    /// Append a grid functional; all functionals end up in one grid group.
    pub fn functional(mut self, functional: Box<dyn GridFunctional>) -> Self {
        self.functionals.push(functional);
        self
    }

    /// Enable auto-completion: a kinetic term, a nuclear-attraction term and
    /// a direct (Hartree) term are appended when the user terms do not
    /// already provide them.
    pub fn auto_complete(
        mut self,
        kinetic: &DMatrix<f64>,
        nuclear: &DMatrix<f64>,
        eri: &'a ElectronRepulsion,
    ) -> Self {
        self.standard = Some(StandardOperators {
            kinetic: kinetic.clone(),
            nuclear: nuclear.clone(),
            eri,
        });
        self
    }

    /// Strict validation: fail when the Hamiltonian would contain neither an
    /// exchange term nor a grid group. The permissive default allows
    /// Hartree-only Hamiltonians.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn build(self) -> Result<EffectiveHamiltonian<'a>, MeanFieldError> {
        let Self {
            spin,
            mut terms,
            grid,
            functionals,
            standard,
            external,
            strict,
        } = self;

        if !functionals.is_empty() {
            let grid = match grid {
                Some(grid) => grid,
                None => {
                    return Err(MeanFieldError::MissingGrid {
                        label: functionals[0].label().to_owned(),
                    })
                }
            };
            terms.push(Term::Grid(GridGroup::new(grid, functionals, "grid")?));
        }

        if let Some(StandardOperators {
            kinetic,
            nuclear,
            eri,
        }) = standard
        {
            if !terms.iter().any(|t| t.label() == KINETIC_LABEL) {
                terms.push(Term::OneElectron(OneElectronTerm::new(
                    kinetic,
                    KINETIC_LABEL,
                )));
            }
            if !terms.iter().any(|t| matches!(t, Term::Direct(_))) {
                terms.push(Term::Direct(DirectTerm::new(eri, HARTREE_LABEL)));
            }
            if !terms.iter().any(|t| t.label() == NUCLEAR_LABEL) {
                terms.push(Term::OneElectron(OneElectronTerm::new(
                    nuclear,
                    NUCLEAR_LABEL,
                )));
            }
        }

        if strict
            && !terms
                .iter()
                .any(|t| matches!(t, Term::Exchange(_) | Term::Grid(_)))
        {
            return Err(MeanFieldError::MissingExchange);
        }

        EffectiveHamiltonian::new(spin, terms, external)
    }
}

/// The standard Hartree-Fock Hamiltonian (kinetic, Hartree, full exchange,
/// nuclear attraction) with the given exchange fraction.
pub fn hartree_fock_hamiltonian<'a>(
    spin: SpinModel,
    kinetic: &DMatrix<f64>,
    nuclear: &DMatrix<f64>,
    eri: &'a ElectronRepulsion,
    external: f64,
    exchange_fraction: f64,
) -> Result<EffectiveHamiltonian<'a>, MeanFieldError> {
    HamiltonianBuilder::new(spin)
        .external(external)
        .term(Term::Exchange(ExchangeTerm::with_fraction(
            eri,
            exchange_fraction,
            "x_hf",
        )))
        .auto_complete(kinetic, nuclear, eri)
        .build()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    use super::*;
    use crate::testing::{h2_sto3g, PowerFunctional, TabulatedGrid};

    #[test]
    fn auto_complete_appends_the_standard_terms() {
        let system = h2_sto3g();
        let mut ham = HamiltonianBuilder::new(SpinModel::Restricted)
            .external(system.nuclear_repulsion)
            .term(Term::Exchange(ExchangeTerm::new(
                &system.electron_repulsion,
                "x_hf",
            )))
            .auto_complete(
                &system.kinetic,
                &system.nuclear_attraction,
                &system.electron_repulsion,
            )
            .build()
            .unwrap();

        let dm = DMatrix::from_row_slice(2, 2, &[0.6, 0.3, 0.3, 0.6]);
        ham.reset(&[dm]).unwrap();
        ham.compute_energy().unwrap();

        for label in [KINETIC_LABEL, NUCLEAR_LABEL, HARTREE_LABEL, "x_hf"] {
            assert!(ham.energy_term(label).is_some(), "missing term '{label}'");
        }
    }

    #[test]
    fn auto_complete_keeps_user_supplied_terms() {
        // a user-supplied direct term suppresses the auto-completed one
        let system = h2_sto3g();
        let mut ham = HamiltonianBuilder::new(SpinModel::Restricted)
            .term(Term::Direct(DirectTerm::new(
                &system.electron_repulsion,
                "coulomb",
            )))
            .auto_complete(
                &system.kinetic,
                &system.nuclear_attraction,
                &system.electron_repulsion,
            )
            .build()
            .unwrap();

        let dm = DMatrix::from_row_slice(2, 2, &[0.6, 0.3, 0.3, 0.6]);
        ham.reset(&[dm]).unwrap();
        ham.compute_energy().unwrap();

        assert!(ham.energy_term("coulomb").is_some());
        assert!(ham.energy_term(HARTREE_LABEL).is_none());
    }

    #[test]
    fn strict_policy_demands_exchange_or_grid() {
        let system = h2_sto3g();
        let result = HamiltonianBuilder::new(SpinModel::Restricted)
            .strict(true)
            .auto_complete(
                &system.kinetic,
                &system.nuclear_attraction,
                &system.electron_repulsion,
            )
            .build();
        assert!(matches!(result, Err(MeanFieldError::MissingExchange)));

        // a grid group satisfies the strict policy as well
        let grid = TabulatedGrid::sample(4, 2);
        let result = HamiltonianBuilder::new(SpinModel::Restricted)
            .strict(true)
            .grid(&grid)
            .functional(Box::new(PowerFunctional {
                label: "x_toy".into(),
                coefficient: -0.1,
                power: 2,
            }))
            .auto_complete(
                &system.kinetic,
                &system.nuclear_attraction,
                &system.electron_repulsion,
            )
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn functionals_without_a_grid_are_a_build_error() {
        let result = HamiltonianBuilder::new(SpinModel::Restricted)
            .functional(Box::new(PowerFunctional {
                label: "x_toy".into(),
                coefficient: -0.1,
                power: 2,
            }))
            .build();
        assert!(matches!(
            result,
            Err(MeanFieldError::MissingGrid { label }) if label == "x_toy"
        ));
    }

    #[test]
    fn hartree_fock_helper_reproduces_the_reference_energy_shape() {
        let system = h2_sto3g();
        let mut ham = hartree_fock_hamiltonian(
            SpinModel::Restricted,
            &system.kinetic,
            &system.nuclear_attraction,
            &system.electron_repulsion,
            system.nuclear_repulsion,
            1.0,
        )
        .unwrap();

        // half-exchange must sit exactly between none and full
        let dm = DMatrix::from_row_slice(2, 2, &[0.6, 0.3, 0.3, 0.6]);
        ham.reset(&[dm.clone()]).unwrap();
        let full = ham.compute_energy().unwrap();
        let x_full = ham.energy_term("x_hf").unwrap();

        let mut half = hartree_fock_hamiltonian(
            SpinModel::Restricted,
            &system.kinetic,
            &system.nuclear_attraction,
            &system.electron_repulsion,
            system.nuclear_repulsion,
            0.5,
        )
        .unwrap();
        half.reset(&[dm]).unwrap();
        let half_energy = half.compute_energy().unwrap();

        assert_relative_eq!(half_energy, full - 0.5 * x_full, epsilon = 1e-12);
    }
}

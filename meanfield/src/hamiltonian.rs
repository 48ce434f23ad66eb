//! The effective Hamiltonian: an ordered list of terms, a fixed external
//! scalar (nuclear-nuclear repulsion) and the operator cache they share.

use std::collections::HashSet;

use nalgebra::DMatrix;

use crate::cache::{CacheTag, OperatorCache};
use crate::error::MeanFieldError;
use crate::observable::{SpinModel, Term};

/// Composes the total energy and the Fock operator(s) from its terms.
///
/// One instance lives as long as the basis/geometry and the term list do.
/// The density-matrix state is exchanged through [`reset`](Self::reset); the
/// derived cache must be invalidated with [`clear`](Self::clear) immediately
/// after every state update and before the next energy or Fock build — that
/// call is the single seam through which all terms learn that the state
/// changed.
pub struct EffectiveHamiltonian<'a> {
    spin: SpinModel,
    terms: Vec<Term<'a>>,
    external: f64,
    cache: OperatorCache,
    dms: Vec<DMatrix<f64>>,
}

impl<'a> EffectiveHamiltonian<'a> {
    /// Build a Hamiltonian from its terms and the external (nuclear
    /// repulsion) energy. Configuration problems — an empty term list,
    /// colliding labels, an empty grid group — are reported here, never
    /// deferred to the first compute call.
    pub fn new(
        spin: SpinModel,
        terms: Vec<Term<'a>>,
        external: f64,
    ) -> Result<Self, MeanFieldError> {
        if terms.is_empty() {
            return Err(MeanFieldError::EmptyHamiltonian);
        }

        let mut labels = HashSet::new();
        for term in &terms {
            if !labels.insert(term.label().to_owned()) {
                return Err(MeanFieldError::DuplicateLabel {
                    label: term.label().to_owned(),
                });
            }
        }

        Ok(Self {
            spin,
            terms,
            external,
            cache: OperatorCache::new(),
            dms: Vec::new(),
        })
    }

    pub fn spin(&self) -> SpinModel {
        self.spin
    }

    /// The number of density matrices this Hamiltonian works on.
    pub fn ndm(&self) -> usize {
        self.spin.ndm()
    }

    /// The factor relating `<F, dD>` to the energy differential.
    pub fn deriv_scale(&self) -> f64 {
        self.spin.deriv_scale()
    }

    /// The fixed external energy contribution.
    pub fn external(&self) -> f64 {
        self.external
    }

    /// Read access to the cache, for energy reports and tests.
    pub fn cache(&self) -> &OperatorCache {
        &self.cache
    }

    /// Record the density-matrix state the terms will work from. Does not
    /// touch the cache; pairing every state change with a `clear` is the
    /// caller's obligation.
    pub fn reset(&mut self, dms: &[DMatrix<f64>]) -> Result<(), MeanFieldError> {
        self.check_channels(dms.len())?;
        self.dms = dms.to_vec();
        Ok(())
    }

    /// Register a perturbation of the density matrices for
    /// [`compute_dot_hessian`](Self::compute_dot_hessian). Replaces any
    /// previously registered perturbation and drops its intermediates.
    pub fn reset_delta(&mut self, deltas: &[DMatrix<f64>]) -> Result<(), MeanFieldError> {
        self.check_channels(deltas.len())?;
        self.cache.clear(Some(CacheTag::Delta));
        for (delta, channel) in deltas.iter().zip(self.spin.channels()) {
            self.cache
                .store_matrix(&format!("delta_dm_{channel}"), CacheTag::Delta, delta.clone());
        }
        Ok(())
    }

    /// Invalidate cached entries: everything density-dependent when `tag`
    /// is `None`, exactly one lifecycle class otherwise.
    pub fn clear(&mut self, tag: Option<CacheTag>) {
        self.cache.clear(tag);
    }

    /// The total energy, including the external contribution.
    ///
    /// Results are memoized: until the next `clear`, repeated calls are pure
    /// cache reads and bit-identical. Each term's value is stored under
    /// `energy_<label>`, the external scalar under `energy_nn` and the total
    /// under `energy`.
    pub fn compute_energy(&mut self) -> Result<f64, MeanFieldError> {
        if let Some(total) = self.cache.scalar("energy") {
            return Ok(total);
        }
        self.check_state()?;

        let mut total = 0.0;
        for term in &self.terms {
            let energy = term.energy(self.spin, &self.dms, &mut self.cache);
            self.cache
                .store_scalar(&format!("energy_{}", term.label()), CacheTag::Derived, energy);
            log::debug!("energy term {:<16} {energy:+.10}", term.label());
            total += energy;
        }

        self.cache
            .store_scalar("energy_nn", CacheTag::Derived, self.external);
        total += self.external;
        self.cache.store_scalar("energy", CacheTag::Derived, total);
        log::debug!("energy term {:<16} {:+.10}", "nn", self.external);
        log::debug!("total energy {total:+.10}");
        Ok(total)
    }

    /// The energy of a single term from the last build, if available.
    pub fn energy_term(&self, label: &str) -> Option<f64> {
        self.cache.scalar(&format!("energy_{label}"))
    }

    /// Accumulate all terms into the caller-supplied Fock operators. The
    /// buffers must be zeroed by the caller beforehand.
    pub fn compute_fock(&mut self, focks: &mut [DMatrix<f64>]) -> Result<(), MeanFieldError> {
        self.check_channels(focks.len())?;
        self.check_state()?;

        for term in &self.terms {
            term.add_fock(self.spin, &self.dms, &mut self.cache, focks);
        }
        Ok(())
    }

    /// Accumulate the directional derivative of the Fock operator along the
    /// perturbation registered with [`reset_delta`](Self::reset_delta) into
    /// the caller-supplied buffers.
    pub fn compute_dot_hessian(&mut self, dots: &mut [DMatrix<f64>]) -> Result<(), MeanFieldError> {
        self.check_channels(dots.len())?;

        let deltas: Vec<DMatrix<f64>> = self
            .spin
            .channels()
            .iter()
            .map(|channel| {
                self.cache
                    .matrix(&format!("delta_dm_{channel}"))
                    .cloned()
                    .ok_or_else(|| {
                        MeanFieldError::Unsupported(
                            "reset_delta must be called before compute_dot_hessian".into(),
                        )
                    })
            })
            .collect::<Result<_, _>>()?;

        for term in &self.terms {
            term.add_dot_hessian(self.spin, &deltas, &mut self.cache, dots)?;
        }
        Ok(())
    }

    fn check_channels(&self, got: usize) -> Result<(), MeanFieldError> {
        if got != self.spin.ndm() {
            return Err(MeanFieldError::Unsupported(format!(
                "{:?} Hamiltonian works on {} spin channel(s), got {got}",
                self.spin,
                self.spin.ndm(),
            )));
        }
        Ok(())
    }

    fn check_state(&self) -> Result<(), MeanFieldError> {
        if self.dms.len() != self.spin.ndm() {
            return Err(MeanFieldError::Unsupported(
                "reset must be called before computing energies or Fock operators".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    use super::*;
    use crate::builder::hartree_fock_hamiltonian;
    use crate::guess::guess_core_hamiltonian;
    use crate::linalg::symmetric_matrix;
    use crate::occupation::OccupationModel;
    use crate::orbitals::Orbitals;
    use crate::system::SystemData;
    use crate::testing::{h2_sto3g, synthetic};

    fn guessed_dm(system: &SystemData, nocc: f64) -> DMatrix<f64> {
        let mut orbs = [Orbitals::new(system.nbasis(), system.nbasis())];
        guess_core_hamiltonian(&system.overlap, &system.core_hamiltonian(), &mut orbs).unwrap();
        OccupationModel::aufbau(nocc, nocc)
            .unwrap()
            .assign(&mut orbs)
            .unwrap();
        orbs[0].to_dm()
    }

    #[test]
    fn zero_terms_is_a_construction_error() {
        assert!(matches!(
            EffectiveHamiltonian::new(SpinModel::Restricted, Vec::new(), 0.0),
            Err(MeanFieldError::EmptyHamiltonian)
        ));
    }

    #[test]
    fn duplicate_labels_are_a_construction_error() {
        use crate::observable::OneElectronTerm;

        let op = DMatrix::identity(2, 2);
        let terms = vec![
            Term::OneElectron(OneElectronTerm::new(op.clone(), "kin")),
            Term::OneElectron(OneElectronTerm::new(op, "kin")),
        ];
        assert!(matches!(
            EffectiveHamiltonian::new(SpinModel::Restricted, terms, 0.0),
            Err(MeanFieldError::DuplicateLabel { .. })
        ));
    }

    #[test]
    fn compute_before_reset_is_rejected() {
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
        assert!(matches!(
            ham.compute_energy(),
            Err(MeanFieldError::Unsupported(_))
        ));
    }

    #[test]
    fn repeated_energy_calls_are_bit_identical_cache_reads() {
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

        ham.reset(&[guessed_dm(&system, 1.0)]).unwrap();
        let first = ham.compute_energy().unwrap();
        let second = ham.compute_energy().unwrap();
        assert_eq!(first.to_bits(), second.to_bits());
    }

    #[test]
    fn energy_breakdown_sums_to_the_total() {
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

        ham.reset(&[guessed_dm(&system, 1.0)]).unwrap();
        let total = ham.compute_energy().unwrap();

        let breakdown: f64 = ["kin", "ne", "hartree", "x_hf", "nn"]
            .iter()
            .map(|label| ham.energy_term(label).unwrap())
            .sum();
        assert_relative_eq!(breakdown, total, epsilon = 1e-14);
        assert_eq!(ham.energy_term("nn"), Some(system.nuclear_repulsion));
    }

    #[test]
    fn clearing_forces_a_rebuild_after_a_state_change() {
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

        let dm0 = guessed_dm(&system, 1.0);
        ham.reset(&[dm0.clone()]).unwrap();
        let e0 = ham.compute_energy().unwrap();

        let dm1 = dm0.scale(0.5);
        ham.reset(&[dm1]).unwrap();
        ham.clear(None);
        let e1 = ham.compute_energy().unwrap();
        assert!((e0 - e1).abs() > 1e-10);
    }

    #[test]
    fn dot_hessian_extends_the_cache_and_clear_restores_it() {
        let system = synthetic(3);
        let mut ham = hartree_fock_hamiltonian(
            SpinModel::Restricted,
            &system.kinetic,
            &system.nuclear_attraction,
            &system.electron_repulsion,
            system.nuclear_repulsion,
            1.0,
        )
        .unwrap();

        let dm = guessed_dm(&system, 1.0);
        ham.reset(&[dm.clone()]).unwrap();
        ham.clear(None);
        let mut focks = vec![DMatrix::zeros(3, 3)];
        ham.compute_fock(&mut focks).unwrap();

        let mut keys0: Vec<String> = ham.cache().keys().map(str::to_owned).collect();
        keys0.sort();

        let delta = symmetric_matrix(3, |i, j| 1e-3 * (1.0 + (i * 3 + j) as f64));
        ham.reset_delta(&[delta]).unwrap();
        let mut dots = vec![DMatrix::zeros(3, 3)];
        ham.compute_dot_hessian(&mut dots).unwrap();

        let mut keys1: Vec<String> = ham.cache().keys().map(str::to_owned).collect();
        keys1.sort();
        assert!(keys1.len() > keys0.len());
        for key in &keys0 {
            assert!(keys1.contains(key));
        }

        ham.clear(Some(CacheTag::Delta));
        let mut keys2: Vec<String> = ham.cache().keys().map(str::to_owned).collect();
        keys2.sort();
        assert_eq!(keys0, keys2);
    }

    #[test]
    fn dot_hessian_is_the_exact_fock_differential_for_hartree_fock() {
        // the Hartree-Fock Fock operator is linear in the density matrix,
        // so F(D + delta) - F(D) must equal the dot-hessian exactly
        let system = synthetic(3);
        let mut ham = hartree_fock_hamiltonian(
            SpinModel::Restricted,
            &system.kinetic,
            &system.nuclear_attraction,
            &system.electron_repulsion,
            system.nuclear_repulsion,
            1.0,
        )
        .unwrap();

        let dm = guessed_dm(&system, 1.0);
        let delta = symmetric_matrix(3, |i, j| 0.01 * ((i + 2 * j) as f64).cos());

        ham.reset(&[dm.clone()]).unwrap();
        ham.clear(None);
        let mut fock0 = vec![DMatrix::zeros(3, 3)];
        ham.compute_fock(&mut fock0).unwrap();

        ham.reset(&[&dm + &delta]).unwrap();
        ham.clear(None);
        let mut fock1 = vec![DMatrix::zeros(3, 3)];
        ham.compute_fock(&mut fock1).unwrap();

        ham.reset_delta(&[delta]).unwrap();
        let mut dots = vec![DMatrix::zeros(3, 3)];
        ham.compute_dot_hessian(&mut dots).unwrap();

        let residual = (&fock1[0] - &fock0[0] - &dots[0]).norm();
        assert_relative_eq!(residual, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn dot_hessian_matches_random_perturbations() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let system = synthetic(3);
        let mut ham = hartree_fock_hamiltonian(
            SpinModel::Restricted,
            &system.kinetic,
            &system.nuclear_attraction,
            &system.electron_repulsion,
            system.nuclear_repulsion,
            1.0,
        )
        .unwrap();

        let dm = guessed_dm(&system, 1.0);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..5 {
            let delta = symmetric_matrix(3, |_, _| rng.gen_range(-1e-2..1e-2));

            ham.reset(&[dm.clone()]).unwrap();
            ham.clear(None);
            let mut fock0 = vec![DMatrix::zeros(3, 3)];
            ham.compute_fock(&mut fock0).unwrap();

            ham.reset(&[&dm + &delta]).unwrap();
            ham.clear(None);
            let mut fock1 = vec![DMatrix::zeros(3, 3)];
            ham.compute_fock(&mut fock1).unwrap();

            ham.reset_delta(&[delta]).unwrap();
            let mut dots = vec![DMatrix::zeros(3, 3)];
            ham.compute_dot_hessian(&mut dots).unwrap();

            let residual = (&fock1[0] - &fock0[0] - &dots[0]).norm();
            assert_relative_eq!(residual, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn dot_hessian_without_a_registered_delta_is_rejected() {
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
        ham.reset(&[guessed_dm(&system, 1.0)]).unwrap();

        let mut dots = vec![DMatrix::zeros(2, 2)];
        assert!(matches!(
            ham.compute_dot_hessian(&mut dots),
            Err(MeanFieldError::Unsupported(_))
        ));
    }
}

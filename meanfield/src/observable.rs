//! The closed family of energy/Fock contributions an effective Hamiltonian
//! is composed of.
//!
//! Every term namespaces its derived cache entries by its own label (and
//! spin channel) and recomputes them whenever they are absent; `clear` on
//! the Hamiltonian is what makes them absent after a density-matrix update.

use nalgebra::DMatrix;

use crate::cache::{CacheTag, OperatorCache};
use crate::error::MeanFieldError;
use crate::grid::GridGroup;
use crate::tensor::ElectronRepulsion;

/// Whether one density matrix is shared by both spins or each spin carries
/// its own. Solvers and terms branch on this once at entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpinModel {
    Restricted,
    Unrestricted,
}

impl SpinModel {
    /// The number of density matrices (spin channels) carried by the state.
    pub fn ndm(self) -> usize {
        match self {
            Self::Restricted => 1,
            Self::Unrestricted => 2,
        }
    }

    /// The factor relating `<F, dD>` to the energy differential; 2 for the
    /// restricted case where the beta channel is implicit.
    pub fn deriv_scale(self) -> f64 {
        match self {
            Self::Restricted => 2.0,
            Self::Unrestricted => 1.0,
        }
    }

    pub(crate) fn channels(self) -> &'static [&'static str] {
        match self {
            Self::Restricted => &["alpha"],
            Self::Unrestricted => &["alpha", "beta"],
        }
    }
}

/// The spin-summed density matrix, cached under `dm_full`.
pub(crate) fn load_dm_full<'c>(
    spin: SpinModel,
    dms: &[DMatrix<f64>],
    cache: &'c mut OperatorCache,
) -> &'c DMatrix<f64> {
    let (full, _) = cache.load_matrix_with("dm_full", CacheTag::Derived, || match spin {
        SpinModel::Restricted => dms[0].scale(2.0),
        SpinModel::Unrestricted => &dms[0] + &dms[1],
    });
    full
}

/// Same for the registered delta density matrices, under `delta_dm_full`.
fn load_delta_full<'c>(
    spin: SpinModel,
    deltas: &[DMatrix<f64>],
    cache: &'c mut OperatorCache,
) -> &'c DMatrix<f64> {
    let (full, _) = cache.load_matrix_with("delta_dm_full", CacheTag::Delta, || match spin {
        SpinModel::Restricted => deltas[0].scale(2.0),
        SpinModel::Unrestricted => &deltas[0] + &deltas[1],
    });
    full
}

/// One contribution to the total energy and the Fock operator(s).
pub enum Term<'a> {
    OneElectron(OneElectronTerm),
    Direct(DirectTerm<'a>),
    Exchange(ExchangeTerm<'a>),
    Grid(GridGroup<'a>),
}

impl<'a> Term<'a> {
    pub fn label(&self) -> &str {
        match self {
            Term::OneElectron(term) => &term.label,
            Term::Direct(term) => &term.label,
            Term::Exchange(term) => &term.label,
            Term::Grid(group) => group.label(),
        }
    }

    pub(crate) fn energy(
        &self,
        spin: SpinModel,
        dms: &[DMatrix<f64>],
        cache: &mut OperatorCache,
    ) -> f64 {
        match self {
            Term::OneElectron(term) => term.energy(spin, dms, cache),
            Term::Direct(term) => term.energy(spin, dms, cache),
            Term::Exchange(term) => term.energy(spin, dms, cache),
            Term::Grid(group) => group.energy(spin, dms, cache),
        }
    }

    pub(crate) fn add_fock(
        &self,
        spin: SpinModel,
        dms: &[DMatrix<f64>],
        cache: &mut OperatorCache,
        focks: &mut [DMatrix<f64>],
    ) {
        match self {
            Term::OneElectron(term) => term.add_fock(spin, focks),
            Term::Direct(term) => term.add_fock(spin, dms, cache, focks),
            Term::Exchange(term) => term.add_fock(spin, dms, cache, focks),
            Term::Grid(group) => group.add_fock(spin, dms, cache, focks),
        }
    }

    pub(crate) fn add_dot_hessian(
        &self,
        spin: SpinModel,
        deltas: &[DMatrix<f64>],
        cache: &mut OperatorCache,
        dots: &mut [DMatrix<f64>],
    ) -> Result<(), MeanFieldError> {
        match self {
            // the Fock contribution of a one-electron term is constant in
            // the density matrix
            Term::OneElectron(_) => Ok(()),
            Term::Direct(term) => {
                term.add_dot_hessian(spin, deltas, cache, dots);
                Ok(())
            }
            Term::Exchange(term) => {
                term.add_dot_hessian(spin, deltas, cache, dots);
                Ok(())
            }
            Term::Grid(group) => Err(MeanFieldError::Unsupported(format!(
                "dot-hessian of grid group '{}': functional kernels are not implemented",
                group.label()
            ))),
        }
    }
}

/// A term linear in the density matrix (kinetic energy, nuclear attraction,
/// external fields).
pub struct OneElectronTerm {
    op_alpha: DMatrix<f64>,
    /// when absent, the alpha operator acts on both spins
    op_beta: Option<DMatrix<f64>>,
    label: String,
}

impl OneElectronTerm {
    pub fn new(op: DMatrix<f64>, label: impl Into<String>) -> Self {
        Self {
            op_alpha: op,
            op_beta: None,
            label: label.into(),
        }
    }

    /// Distinct operators per spin channel (unrestricted only).
    pub fn with_beta(op_alpha: DMatrix<f64>, op_beta: DMatrix<f64>, label: impl Into<String>) -> Self {
        Self {
            op_alpha,
            op_beta: Some(op_beta),
            label: label.into(),
        }
    }

    fn energy(&self, spin: SpinModel, dms: &[DMatrix<f64>], cache: &mut OperatorCache) -> f64 {
        match (&self.op_beta, spin) {
            // shared operator: contract once with the spin-summed density;
            // exact, not an approximation
            (None, _) => {
                let full = load_dm_full(spin, dms, cache);
                self.op_alpha.dot(full)
            }
            (Some(op_beta), SpinModel::Unrestricted) => {
                self.op_alpha.dot(&dms[0]) + op_beta.dot(&dms[1])
            }
            // a restricted state has a single channel; the beta operator
            // would never act on anything
            (Some(_), SpinModel::Restricted) => self.op_alpha.dot(&dms[0]) * 2.0,
        }
    }

    fn add_fock(&self, spin: SpinModel, focks: &mut [DMatrix<f64>]) {
        focks[0] += &self.op_alpha;
        if spin == SpinModel::Unrestricted {
            focks[1] += self.op_beta.as_ref().unwrap_or(&self.op_alpha);
        }
    }
}

/// The direct (Coulomb) two-electron term. The contracted operator is
/// cached and only rebuilt after an invalidation.
pub struct DirectTerm<'a> {
    eri: &'a ElectronRepulsion,
    label: String,
}

impl<'a> DirectTerm<'a> {
    pub fn new(eri: &'a ElectronRepulsion, label: impl Into<String>) -> Self {
        Self {
            eri,
            label: label.into(),
        }
    }

    fn update_direct(&self, spin: SpinModel, dms: &[DMatrix<f64>], cache: &mut OperatorCache) {
        let key = format!("direct_{}", self.label);
        if cache.contains(&key) {
            return;
        }
        let direct = match spin {
            // the beta contribution is identical, fold the factor 2 into
            // the operator
            SpinModel::Restricted => self.eri.contract_direct(&dms[0]).scale(2.0),
            SpinModel::Unrestricted => {
                let full = load_dm_full(spin, dms, cache);
                self.eri.contract_direct(full)
            }
        };
        cache.store_matrix(&key, CacheTag::Derived, direct);
    }

    fn energy(&self, spin: SpinModel, dms: &[DMatrix<f64>], cache: &mut OperatorCache) -> f64 {
        self.update_direct(spin, dms, cache);
        match spin {
            SpinModel::Restricted => {
                let direct = cache
                    .matrix(&format!("direct_{}", self.label))
                    .expect("direct operator was just updated");
                direct.dot(&dms[0])
            }
            SpinModel::Unrestricted => {
                let full = load_dm_full(spin, dms, cache).clone_owned();
                let direct = cache
                    .matrix(&format!("direct_{}", self.label))
                    .expect("direct operator was just updated");
                0.5 * direct.dot(&full)
            }
        }
    }

    fn add_fock(
        &self,
        spin: SpinModel,
        dms: &[DMatrix<f64>],
        cache: &mut OperatorCache,
        focks: &mut [DMatrix<f64>],
    ) {
        self.update_direct(spin, dms, cache);
        let direct = cache
            .matrix(&format!("direct_{}", self.label))
            .expect("direct operator was just updated");
        for fock in focks.iter_mut() {
            *fock += direct;
        }
    }

    fn add_dot_hessian(
        &self,
        spin: SpinModel,
        deltas: &[DMatrix<f64>],
        cache: &mut OperatorCache,
        dots: &mut [DMatrix<f64>],
    ) {
        let key = format!("dot_{}", self.label);
        if !cache.contains(&key) {
            let dot = match spin {
                SpinModel::Restricted => self.eri.contract_direct(&deltas[0]).scale(2.0),
                SpinModel::Unrestricted => {
                    let full = load_delta_full(spin, deltas, cache);
                    self.eri.contract_direct(full)
                }
            };
            cache.store_matrix(&key, CacheTag::Delta, dot);
        }
        let dot = cache.matrix(&key).expect("dot operator was just stored");
        for out in dots.iter_mut() {
            *out += dot;
        }
    }
}

/// The exchange two-electron term. `fraction` scales the contribution for
/// hybrid models (1.0 is full exchange, 0.0 none).
pub struct ExchangeTerm<'a> {
    eri: &'a ElectronRepulsion,
    fraction: f64,
    label: String,
}

impl<'a> ExchangeTerm<'a> {
    pub fn new(eri: &'a ElectronRepulsion, label: impl Into<String>) -> Self {
        Self::with_fraction(eri, 1.0, label)
    }

    pub fn with_fraction(eri: &'a ElectronRepulsion, fraction: f64, label: impl Into<String>) -> Self {
        Self {
            eri,
            fraction,
            label: label.into(),
        }
    }

    fn exchange_key(&self, channel: &str) -> String {
        format!("exchange_{}_{}", self.label, channel)
    }

    fn update_exchange(&self, spin: SpinModel, dms: &[DMatrix<f64>], cache: &mut OperatorCache) {
        for (idm, channel) in spin.channels().iter().enumerate() {
            let key = self.exchange_key(channel);
            if !cache.contains(&key) {
                let exchange = self.eri.contract_exchange(&dms[idm]);
                cache.store_matrix(&key, CacheTag::Derived, exchange);
            }
        }
    }

    fn energy(&self, spin: SpinModel, dms: &[DMatrix<f64>], cache: &mut OperatorCache) -> f64 {
        self.update_exchange(spin, dms, cache);
        match spin {
            SpinModel::Restricted => {
                let exchange = cache
                    .matrix(&self.exchange_key("alpha"))
                    .expect("exchange operator was just updated");
                -self.fraction * exchange.dot(&dms[0])
            }
            SpinModel::Unrestricted => {
                let mut energy = 0.0;
                for (idm, channel) in spin.channels().iter().enumerate() {
                    let exchange = cache
                        .matrix(&self.exchange_key(channel))
                        .expect("exchange operator was just updated");
                    energy -= 0.5 * self.fraction * exchange.dot(&dms[idm]);
                }
                energy
            }
        }
    }

    fn add_fock(
        &self,
        spin: SpinModel,
        dms: &[DMatrix<f64>],
        cache: &mut OperatorCache,
        focks: &mut [DMatrix<f64>],
    ) {
        self.update_exchange(spin, dms, cache);
        for (idm, channel) in spin.channels().iter().enumerate() {
            let exchange = cache
                .matrix(&self.exchange_key(channel))
                .expect("exchange operator was just updated");
            focks[idm] -= exchange * self.fraction;
        }
    }

    fn add_dot_hessian(
        &self,
        spin: SpinModel,
        deltas: &[DMatrix<f64>],
        cache: &mut OperatorCache,
        dots: &mut [DMatrix<f64>],
    ) {
        for (idm, channel) in spin.channels().iter().enumerate() {
            let key = format!("dot_{}_{}", self.label, channel);
            if !cache.contains(&key) {
                let exchange = self.eri.contract_exchange(&deltas[idm]);
                cache.store_matrix(&key, CacheTag::Delta, exchange);
            }
            let exchange = cache.matrix(&key).expect("dot operator was just stored");
            dots[idm] -= exchange * self.fraction;
        }
    }
}

//! Quadrature-grid collaborators and the grid-group observable.
//!
//! The library evaluates no functional itself: a [`GridFunctional`] is an
//! external collaborator that turns densities (and gradients) on grid
//! points into an energy and potentials, and a [`MolecularGrid`] supplies
//! the grid-side machinery — densities from a density matrix, integration
//! weights and the potential-to-operator transforms.

use nalgebra::{DMatrix, DVector};

use crate::cache::{CacheTag, OperatorCache};
use crate::error::MeanFieldError;
use crate::observable::SpinModel;

/// A fixed quadrature grid plus the basis-dependent transforms between grid
/// arrays and basis-set operators.
pub trait MolecularGrid {
    fn npoint(&self) -> usize;

    /// The electron density on the grid points for one spin channel.
    fn compute_density(&self, dm: &DMatrix<f64>) -> DVector<f64>;

    /// The density gradient on the grid points, one row of (x, y, z) per
    /// point.
    fn compute_gradient(&self, dm: &DMatrix<f64>) -> DMatrix<f64>;

    /// The weighted sum of a grid array.
    fn integrate(&self, values: &DVector<f64>) -> f64;

    /// Transform a scalar potential on the grid into a basis-set operator.
    fn compute_density_fock(&self, pot: &DVector<f64>) -> DMatrix<f64>;

    /// Transform a gradient potential (one row per point) into a basis-set
    /// operator.
    fn compute_gradient_fock(&self, pot: &DMatrix<f64>) -> DMatrix<f64>;
}

/// A density functional evaluated on a grid, supplied by the caller.
///
/// `rho` and `grad` hold one entry per spin channel of the Hamiltonian.
/// `compute_energy` returns the total energy over all spins — a restricted
/// implementation must fold in the spin degeneracy itself. `add_potential`
/// accumulates the per-channel functional derivatives into the shared
/// potential buffers; it must add, never overwrite.
pub trait GridFunctional {
    fn label(&self) -> &str;

    fn uses_gradient(&self) -> bool {
        false
    }

    fn compute_energy(
        &self,
        spin: SpinModel,
        grid: &dyn MolecularGrid,
        rho: &[&DVector<f64>],
        grad: &[&DMatrix<f64>],
    ) -> f64;

    fn add_potential(
        &self,
        spin: SpinModel,
        rho: &[&DVector<f64>],
        grad: &[&DMatrix<f64>],
        dpot: &mut [DVector<f64>],
        gpot: &mut [DMatrix<f64>],
    );
}

/// All grid-based contributions of a Hamiltonian, sharing one grid.
///
/// The group implements the postponed accumulation policy: every functional
/// writes into the shared total-potential buffers, and the expensive
/// grid-to-operator transform runs exactly once per potential kind and spin
/// channel, no matter how many functionals contribute.
pub struct GridGroup<'a> {
    grid: &'a dyn MolecularGrid,
    functionals: Vec<Box<dyn GridFunctional>>,
    label: String,
}

impl<'a> GridGroup<'a> {
    pub fn new(
        grid: &'a dyn MolecularGrid,
        functionals: Vec<Box<dyn GridFunctional>>,
        label: impl Into<String>,
    ) -> Result<Self, MeanFieldError> {
        let label = label.into();
        if functionals.is_empty() {
            return Err(MeanFieldError::EmptyGridGroup { label });
        }
        Ok(Self {
            grid,
            functionals,
            label,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn uses_gradient(&self) -> bool {
        self.functionals.iter().any(|f| f.uses_gradient())
    }

    fn rho_key(&self, channel: &str) -> String {
        format!("rho_{}_{}", self.label, channel)
    }

    fn grad_key(&self, channel: &str) -> String {
        format!("grad_{}_{}", self.label, channel)
    }

    fn dpot_key(&self, channel: &str) -> String {
        format!("dpot_total_{}_{}", self.label, channel)
    }

    fn gpot_key(&self, channel: &str) -> String {
        format!("gpot_total_{}_{}", self.label, channel)
    }

    fn update_densities(&self, spin: SpinModel, dms: &[DMatrix<f64>], cache: &mut OperatorCache) {
        for (idm, channel) in spin.channels().iter().enumerate() {
            let key = self.rho_key(channel);
            if !cache.contains(&key) {
                cache.store_vector(&key, CacheTag::Derived, self.grid.compute_density(&dms[idm]));
            }
            if self.uses_gradient() {
                let key = self.grad_key(channel);
                if !cache.contains(&key) {
                    cache.store_matrix(
                        &key,
                        CacheTag::Derived,
                        self.grid.compute_gradient(&dms[idm]),
                    );
                }
            }
        }
    }

    /// Borrow the per-channel densities (and gradients) out of the cache.
    fn densities<'c>(
        &self,
        spin: SpinModel,
        cache: &'c OperatorCache,
    ) -> (Vec<&'c DVector<f64>>, Vec<&'c DMatrix<f64>>) {
        let rho = spin
            .channels()
            .iter()
            .map(|channel| {
                cache
                    .vector(&self.rho_key(channel))
                    .expect("grid densities were just updated")
            })
            .collect();
        let grad = if self.uses_gradient() {
            spin.channels()
                .iter()
                .map(|channel| {
                    cache
                        .matrix(&self.grad_key(channel))
                        .expect("grid gradients were just updated")
                })
                .collect()
        } else {
            Vec::new()
        };
        (rho, grad)
    }

    pub(crate) fn energy(
        &self,
        spin: SpinModel,
        dms: &[DMatrix<f64>],
        cache: &mut OperatorCache,
    ) -> f64 {
        self.update_densities(spin, dms, cache);

        let energies: Vec<(String, f64)> = {
            let (rho, grad) = self.densities(spin, cache);
            self.functionals
                .iter()
                .map(|f| {
                    let energy = f.compute_energy(spin, self.grid, &rho, &grad);
                    (f.label().to_owned(), energy)
                })
                .collect()
        };

        let mut total = 0.0;
        for (label, energy) in energies {
            cache.store_scalar(&format!("energy_{label}"), CacheTag::Derived, energy);
            total += energy;
        }
        total
    }

    fn update_potentials(&self, spin: SpinModel, cache: &mut OperatorCache) {
        if cache.contains(&self.dpot_key("alpha")) {
            return;
        }

        let nch = spin.ndm();
        let npoint = self.grid.npoint();
        let (dpots, gpots) = {
            let (rho, grad) = self.densities(spin, cache);
            let mut dpots = vec![DVector::zeros(npoint); nch];
            let mut gpots = if self.uses_gradient() {
                vec![DMatrix::zeros(npoint, 3); nch]
            } else {
                Vec::new()
            };
            for f in &self.functionals {
                f.add_potential(spin, &rho, &grad, &mut dpots, &mut gpots);
            }
            (dpots, gpots)
        };

        for (idm, channel) in spin.channels().iter().enumerate() {
            cache.store_vector(&self.dpot_key(channel), CacheTag::Derived, dpots[idm].clone());
        }
        if self.uses_gradient() {
            for (idm, channel) in spin.channels().iter().enumerate() {
                cache.store_matrix(&self.gpot_key(channel), CacheTag::Derived, gpots[idm].clone());
            }
        }
    }

    pub(crate) fn add_fock(
        &self,
        spin: SpinModel,
        dms: &[DMatrix<f64>],
        cache: &mut OperatorCache,
        focks: &mut [DMatrix<f64>],
    ) {
        self.update_densities(spin, dms, cache);
        self.update_potentials(spin, cache);

        for (idm, channel) in spin.channels().iter().enumerate() {
            let dpot = cache
                .vector(&self.dpot_key(channel))
                .expect("grid potentials were just updated");
            focks[idm] += self.grid.compute_density_fock(dpot);

            if self.uses_gradient() {
                let gpot = cache
                    .matrix(&self.gpot_key(channel))
                    .expect("grid potentials were just updated");
                focks[idm] += self.grid.compute_gradient_fock(gpot);
            }
        }
    }
}

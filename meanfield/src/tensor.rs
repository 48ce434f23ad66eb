//! The two-electron repulsion tensor and its contraction patterns.
//!
//! The tensor is an immutable input computed once per basis/geometry by an
//! external integral provider. The SCF core only ever contracts it with
//! density matrices; it is never mutated.

use std::ops::Index;

use itertools::iproduct;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// An integral index into the two-electron tensor, chemist convention
/// `(ab|cd)`.
///
/// The integrals are symmetric under `a<->b`, `c<->d` and `ab<->cd`, so the
/// index is stored in a canonical order that maps all eight equivalent
/// permutations to the same storage slot.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
struct IntegralIndex(usize, usize, usize, usize);

impl IntegralIndex {
    const fn new(index: (usize, usize, usize, usize)) -> Self {
        let (a, b, c, d) = Self::correct_order(index);
        Self(a, b, c, d)
    }

    /// Returns the indices with the canonical order, such that ab <= cd.
    #[inline(always)]
    const fn correct_order(
        (a, b, c, d): (usize, usize, usize, usize),
    ) -> (usize, usize, usize, usize) {
        let (a, b) = if a < b { (a, b) } else { (b, a) };
        let (c, d) = if c < d { (c, d) } else { (d, c) };

        let ab = a * (a + 1) / 2 + b;
        let cd = c * (c + 1) / 2 + d;

        if ab < cd {
            (a, b, c, d)
        } else {
            (c, d, a, b)
        }
    }

    fn linear(&self, size: usize) -> usize {
        let &Self(a, b, c, d) = self;
        d * size.pow(3) + c * size.pow(2) + b * size + a
    }
}

impl std::fmt::Display for IntegralIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let &Self(a, b, c, d) = self;
        write!(f, "({} {}|{} {})", a, b, c, d)
    }
}

/// The rank-4 electron-electron repulsion tensor over a basis of `nbasis`
/// functions, with 8-fold permutational storage.
#[derive(Clone, Serialize, Deserialize)]
pub struct ElectronRepulsion {
    data: Vec<f64>,
    /// side length
    nbasis: usize,
}

impl ElectronRepulsion {
    /// Tabulates the tensor from an integral callback. The callback is
    /// invoked once per unique integral and must respect the 8-fold
    /// permutational symmetry of `(ab|cd)`.
    pub fn from_fn(nbasis: usize, mut f: impl FnMut(usize, usize, usize, usize) -> f64) -> Self {
        let mut data = vec![0.0; nbasis.pow(4)];
        let mut seen = vec![false; nbasis.pow(4)];

        for (a, b) in iproduct!(0..nbasis, 0..nbasis) {
            for (c, d) in iproduct!(0..nbasis, 0..nbasis) {
                let linear = IntegralIndex::new((a, b, c, d)).linear(nbasis);
                if !seen[linear] {
                    seen[linear] = true;
                    data[linear] = f(a, b, c, d);
                }
            }
        }

        Self { data, nbasis }
    }

    pub fn nbasis(&self) -> usize {
        self.nbasis
    }

    /// The direct (Coulomb) contraction `J_ab = sum_cd (ab|cd) dm_cd`.
    pub fn contract_direct(&self, dm: &DMatrix<f64>) -> DMatrix<f64> {
        self.contract(dm, false)
    }

    /// The exchange contraction `K_ab = sum_cd (ac|bd) dm_cd`.
    pub fn contract_exchange(&self, dm: &DMatrix<f64>) -> DMatrix<f64> {
        self.contract(dm, true)
    }

    /// Both contraction patterns differ only in how the four tensor indices
    /// are wired to the output and summation indices. The result is
    /// symmetric for a symmetric density matrix, so only the upper triangle
    /// is computed.
    fn contract(&self, dm: &DMatrix<f64>, exchange: bool) -> DMatrix<f64> {
        let n = self.nbasis;
        debug_assert_eq!(dm.nrows(), n);
        debug_assert_eq!(dm.ncols(), n);

        let element = |a: usize, b: usize| {
            let mut sum = 0.0;
            for (c, d) in iproduct!(0..n, 0..n) {
                let value = if exchange {
                    self[(a, c, b, d)]
                } else {
                    self[(a, b, c, d)]
                };
                sum += value * dm[(c, d)];
            }
            sum
        };

        let pairs: Vec<(usize, usize)> = iproduct!(0..n, 0..n).filter(|&(a, b)| a <= b).collect();

        #[cfg(feature = "rayon")]
        let values: Vec<f64> = {
            use rayon::prelude::*;
            pairs.par_iter().map(|&(a, b)| element(a, b)).collect()
        };

        #[cfg(not(feature = "rayon"))]
        let values: Vec<f64> = pairs.iter().map(|&(a, b)| element(a, b)).collect();

        let mut out = DMatrix::zeros(n, n);
        for (&(a, b), value) in pairs.iter().zip(values) {
            out[(a, b)] = value;
            out[(b, a)] = value;
        }
        out
    }
}

impl Index<(usize, usize, usize, usize)> for ElectronRepulsion {
    type Output = f64;

    fn index(&self, index: (usize, usize, usize, usize)) -> &Self::Output {
        let index = IntegralIndex::new(index);
        let linear = index.linear(self.nbasis);
        &self.data[linear]
    }
}

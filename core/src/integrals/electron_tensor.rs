use std::ops::Index;

use nalgebra::DMatrix;

use crate::{basis::BasisFunction, linalg::symmetric_matrix};

use super::Integrator;

/// Integrals whose Cauchy-Schwarz bound is below this are not computed.
const SCREENING_THRESHOLD: f64 = 1e-14;

/// An integral index used in the two-electron integrals of a basis set.
///
/// The index represents the four indices (i, j, k, l) used to calculate a two-electron integral
/// (ij|kl) in chemists' notation. The integral is invariant under i <-> j, k <-> l and
/// (ij) <-> (kl), so the index is stored in canonical order i >= j, k >= l, ij >= kl.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct IntegralIndex(usize, usize, usize, usize);

impl IntegralIndex {
    /// Creates a new integral index with the given indices.
    pub(crate) const fn new(index: (usize, usize, usize, usize)) -> Self {
        let (i, j, k, l) = Self::correct_order(index);
        Self(i, j, k, l)
    }

    #[inline(always)]
    const fn correct_order(
        (i, j, k, l): (usize, usize, usize, usize),
    ) -> (usize, usize, usize, usize) {
        let (i, j) = if i >= j { (i, j) } else { (j, i) };
        let (k, l) = if k >= l { (k, l) } else { (l, k) };

        if pair(i, j) >= pair(k, l) {
            (i, j, k, l)
        } else {
            (k, l, i, j)
        }
    }

    /// Position in the packed storage.
    #[inline(always)]
    pub(crate) fn linear(&self) -> usize {
        let &Self(i, j, k, l) = self;
        pair(pair(i, j), pair(k, l))
    }
}

/// Packed index of (i, j) with i >= j.
#[inline(always)]
const fn pair(i: usize, j: usize) -> usize {
    i * (i + 1) / 2 + j
}

impl std::fmt::Display for IntegralIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let &Self(i, j, k, l) = self;
        write!(f, "({} {}|{} {})", i, j, k, l)
    }
}

/// An electron tensor representing electron-electron repulsion integrals between
/// four contracted Gaussian functions in a given basis set. Only symmetry-unique
/// integrals are stored.
pub struct ElectronTensor {
    data: Vec<f64>,
    /// side length
    size: usize,
}

impl ElectronTensor {
    /// Computes the electron repulsion integrals of every unique quadruple of basis
    /// functions, in parallel when the `rayon` feature is enabled. Quadruples whose
    /// Cauchy-Schwarz estimate is negligible are skipped.
    pub fn from_basis(
        basis: &[BasisFunction],
        integrator: &impl Integrator<Function = BasisFunction>,
    ) -> Self {
        let n_basis = basis.len();
        let n_pairs = pair(n_basis, 0);
        let mut data = vec![0.0; pair(n_pairs, 0)];

        // compute diagonal first - we need these entries for screening
        let mut diagonal = vec![0.0; n_pairs];
        for i in 0..n_basis {
            for j in 0..=i {
                let index = IntegralIndex(i, j, i, j);
                let integral =
                    integrator.electron_repulsion((&basis[i], &basis[j], &basis[i], &basis[j]));
                diagonal[pair(i, j)] = integral;
                data[index.linear()] = integral;
            }
        }

        let mut to_compute = Vec::with_capacity(data.len());
        for i in 0..n_basis {
            for j in 0..=i {
                for k in 0..=i {
                    let l_max = if k == i { j } else { k };
                    for l in 0..=l_max {
                        if (k, l) == (i, j) {
                            continue;
                        }
                        let estimate = (diagonal[pair(i, j)] * diagonal[pair(k, l)]).sqrt();
                        if estimate >= SCREENING_THRESHOLD {
                            to_compute.push(IntegralIndex(i, j, k, l));
                        }
                    }
                }
            }
        }

        log::debug!(
            "computing {} of {} unique electron repulsion integrals",
            to_compute.len() + n_pairs,
            data.len()
        );

        #[cfg(feature = "rayon")]
        {
            use rayon::iter::{ParallelBridge, ParallelIterator};

            to_compute
                .chunks(512)
                .par_bridge()
                .map(|indices| {
                    let mut output = Vec::with_capacity(indices.len());
                    for index @ &IntegralIndex(x, y, z, w) in indices {
                        let integral = integrator
                            .electron_repulsion((&basis[x], &basis[y], &basis[z], &basis[w]));

                        log::trace!("ERI {index} = {integral:<1.3}");
                        output.push((index.linear(), integral))
                    }
                    output
                })
                .collect::<Vec<_>>() // iterators are lazy - we collect to evaluate all elements
                .into_iter()
                .flatten()
                .for_each(|(index, integral)| data[index] = integral);
        }

        #[cfg(not(feature = "rayon"))]
        to_compute
            .into_iter()
            .for_each(|index @ IntegralIndex(x, y, z, w)| {
                let integral =
                    integrator.electron_repulsion((&basis[x], &basis[y], &basis[z], &basis[w]));

                log::trace!("ERI {index} = {integral:<1.8}");
                data[index.linear()] = integral;
            });

        Self {
            data,
            size: n_basis,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Coulomb matrix J_ij = Σ_kl D_kl (ij|kl).
    pub fn coulomb(&self, density: &DMatrix<f64>) -> DMatrix<f64> {
        let n = self.size;
        symmetric_matrix(n, |i, j| {
            let mut sum = 0.0;
            for k in 0..n {
                for l in 0..n {
                    sum += density[(k, l)] * self[(i, j, k, l)];
                }
            }
            sum
        })
    }

    /// Exchange matrix K_ij = Σ_kl D_kl (ik|jl).
    pub fn exchange(&self, density: &DMatrix<f64>) -> DMatrix<f64> {
        let n = self.size;
        symmetric_matrix(n, |i, j| {
            let mut sum = 0.0;
            for k in 0..n {
                for l in 0..n {
                    sum += density[(k, l)] * self[(i, k, j, l)];
                }
            }
            sum
        })
    }
}

impl Index<(usize, usize, usize, usize)> for ElectronTensor {
    type Output = f64;

    fn index(&self, index: (usize, usize, usize, usize)) -> &Self::Output {
        &self.data[IntegralIndex::new(index).linear()]
    }
}

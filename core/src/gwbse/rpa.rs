//! Three-centre integrals in the MO basis and the RPA dielectric matrix.
use std::ops::RangeInclusive;

use nalgebra::{DMatrix, DVector};

use crate::{
    error::{Result, XtpError},
    integrals::ThreeCenter,
};

/// A sampling frequency of the dielectric function, Hartree. Mixed complex
/// frequencies have no representation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Frequency {
    Real(f64),
    Imaginary(f64),
}

impl Frequency {
    /// Classifies a (real, imaginary) pair.
    pub fn from_pair([real, imaginary]: [f64; 2]) -> Result<Self> {
        match (real, imaginary) {
            (real, imaginary) if real != 0.0 && imaginary != 0.0 => Err(XtpError::Unsupported(
                format!("mixed screening frequency, real part {real}, imaginary part {imaginary}"),
            )),
            (0.0, imaginary) => Ok(Self::Imaginary(imaginary)),
            (real, _) => Ok(Self::Real(real)),
        }
    }

    /// Weight of the pair contribution with transition energy `delta`.
    fn energy_factor(&self, delta: f64) -> f64 {
        match *self {
            Self::Imaginary(omega) => 4.0 * delta / (delta * delta + omega * omega),
            Self::Real(omega) => 2.0 * (1.0 / (delta - omega) + 1.0 / (delta + omega)),
        }
    }
}

/// (P|mn) of all levels below `levels`, symmetrized with the Coulomb metric so
/// that (mn|kl) = Σ_P B[m][P, n] B[k][P, l].
pub(crate) struct MoThreeCenter {
    levels: Vec<DMatrix<f64>>,
}

impl MoThreeCenter {
    pub(crate) fn new(
        three_center: &ThreeCenter,
        mo_coefficients: &DMatrix<f64>,
        metric_inv_sqrt: &DMatrix<f64>,
        levels: usize,
    ) -> Result<Self> {
        let aux = three_center.auxiliary_size();
        if metric_inv_sqrt.nrows() != aux {
            return Err(XtpError::DimensionMismatch {
                context: "Coulomb metric vs three-centre integrals",
                expected: aux,
                found: metric_inv_sqrt.nrows(),
            });
        }
        let coefficients = mo_coefficients.columns(0, levels);

        let mut raw = vec![DMatrix::zeros(aux, levels); levels];
        for (p, matrix) in three_center.matrices().iter().enumerate() {
            if matrix.nrows() != coefficients.nrows() {
                return Err(XtpError::DimensionMismatch {
                    context: "three-centre integrals vs MO coefficients",
                    expected: coefficients.nrows(),
                    found: matrix.nrows(),
                });
            }
            let transformed = coefficients.transpose() * matrix * &coefficients;
            for (m, level) in raw.iter_mut().enumerate() {
                level.row_mut(p).copy_from(&transformed.row(m));
            }
        }

        let levels = raw
            .into_iter()
            .map(|level| metric_inv_sqrt * level)
            .collect::<Vec<_>>();
        log::debug!("MO three-centre integrals for {} levels", levels.len());
        Ok(Self { levels })
    }

    #[cfg(test)]
    pub(crate) fn from_levels(levels: Vec<DMatrix<f64>>) -> Self {
        Self { levels }
    }

    /// B[m] as an (auxiliary × levels) matrix.
    pub(crate) fn level(&self, m: usize) -> &DMatrix<f64> {
        &self.levels[m]
    }

    pub(crate) fn levels(&self) -> &[DMatrix<f64>] {
        &self.levels
    }

    /// Every level multiplied from the left by `transform`.
    pub(crate) fn transformed(&self, transform: &DMatrix<f64>) -> Vec<DMatrix<f64>> {
        self.levels.iter().map(|level| transform * level).collect()
    }

    /// Bare Coulomb integral (mn|kl).
    pub(crate) fn coulomb(&self, (m, n): (usize, usize), (k, l): (usize, usize)) -> f64 {
        self.levels[m].column(n).dot(&self.levels[k].column(l))
    }
}

/// ε(ω) in the representation in which the auxiliary overlap is `overlap`:
/// ε = S + Σ_vc f(Δ_vc, ω) M_vc M_vcᵀ with M = L B.
///
/// The occupied levels are summed independently and reduced at the end.
pub(crate) fn epsilon(
    transformed: &[DMatrix<f64>],
    overlap: &DMatrix<f64>,
    energies: &DVector<f64>,
    occupied: RangeInclusive<usize>,
    virtuals: RangeInclusive<usize>,
    frequency: Frequency,
) -> DMatrix<f64> {
    let n_virtual = virtuals.end() + 1 - virtuals.start();
    let first_virtual = *virtuals.start();

    let contribution = |v: usize| {
        let block = transformed[v].columns(first_virtual, n_virtual);
        let factors = DVector::from_fn(n_virtual, |c, _| {
            frequency.energy_factor(energies[first_virtual + c] - energies[v])
        });
        let mut scaled = block.clone_owned();
        for (mut column, factor) in scaled.column_iter_mut().zip(factors.iter()) {
            column *= *factor;
        }
        scaled * block.transpose()
    };

    #[cfg(feature = "rayon")]
    let sum = {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
        let size = overlap.nrows();
        occupied
            .into_par_iter()
            .fold(|| DMatrix::zeros(size, size), |acc, v| acc + contribution(v))
            .reduce(|| DMatrix::zeros(size, size), |a, b| a + b)
    };

    #[cfg(not(feature = "rayon"))]
    let sum = occupied.fold(DMatrix::zeros(overlap.nrows(), overlap.nrows()), |acc, v| {
        acc + contribution(v)
    });

    overlap + sum
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};

    use super::{epsilon, Frequency, MoThreeCenter};

    #[test]
    fn mixed_frequencies_are_rejected() {
        assert_eq!(Frequency::from_pair([0.0, 0.5]).unwrap(), Frequency::Imaginary(0.5));
        assert_eq!(Frequency::from_pair([0.0, 0.0]).unwrap(), Frequency::Imaginary(0.0));
        assert_eq!(Frequency::from_pair([0.3, 0.0]).unwrap(), Frequency::Real(0.3));
        assert!(Frequency::from_pair([0.3, 0.5]).is_err());
    }

    #[test]
    fn static_epsilon_of_a_single_transition() {
        // one auxiliary function, levels 0 (occupied) and 1 (virtual)
        let b = vec![
            DMatrix::from_row_slice(1, 2, &[0.0, 0.2]),
            DMatrix::from_row_slice(1, 2, &[0.2, 0.0]),
        ];
        let mo = MoThreeCenter::from_levels(b);
        let energies = DVector::from_vec(vec![-0.5, 0.5]);
        let overlap = DMatrix::identity(1, 1);

        let at = |frequency| epsilon(mo.levels(), &overlap, &energies, 0..=0, 1..=1, frequency);

        // 1 + 4 / Δ * 0.04
        let static_epsilon = at(Frequency::Imaginary(0.0));
        assert_relative_eq!(static_epsilon[(0, 0)], 1.16, epsilon = 1e-12);

        let dynamic = at(Frequency::Imaginary(1.0));
        assert_relative_eq!(dynamic[(0, 0)], 1.0 + 4.0 * 0.04 / 2.0, epsilon = 1e-12);
        assert_relative_eq!(mo.coulomb((0, 1), (1, 0)), 0.04, epsilon = 1e-12);
    }
}

//! Plasmon-pole fit of the inverse dielectric function.
use nalgebra::{DMatrix, DVector};

use crate::{
    error::{Result, XtpError},
    linalg::{sorted_eigs, symmetrize},
};

/// Modes with a smaller screening weight are dropped.
const WEIGHT_THRESHOLD: f64 = 1e-5;
/// Hartree, pole frequency assigned to dropped modes.
const DROPPED_FREQUENCY: f64 = 0.5;
/// Modes whose fit denominator is smaller than this have no finite pole.
const SINGULAR_DENOMINATOR: f64 = 1e-12;

/// One pole per eigenmode of the static dielectric matrix:
/// ε⁻¹(iω)_i − 1 = −w_i Ω_i² / (Ω_i² + ω²).
#[derive(Debug, Clone)]
pub(crate) struct PlasmonPoleModel {
    weights: DVector<f64>,
    frequencies: DVector<f64>,
    /// Modes as rows, acting on the representation the dielectric matrices are given in.
    modes: DMatrix<f64>,
}

impl PlasmonPoleModel {
    /// Fits the model to ε(0) and ε(iω), both given in a representation whose
    /// metric has the inverse Cholesky factor `metric_l_inv`.
    pub(crate) fn fit(
        epsilon_static: &DMatrix<f64>,
        epsilon_imaginary: &DMatrix<f64>,
        metric_l_inv: &DMatrix<f64>,
        imaginary_frequency: f64,
    ) -> Result<Self> {
        if imaginary_frequency == 0.0 {
            return Err(XtpError::Unsupported(
                "the plasmon-pole fit needs a non-zero imaginary frequency".to_string(),
            ));
        }
        let orthonormal = metric_l_inv * epsilon_static * metric_l_inv.transpose();
        let (eigenvalues, eigenvectors) =
            sorted_eigs(symmetrize(orthonormal), "static dielectric matrix")?;
        let phi = metric_l_inv.transpose() * eigenvectors;

        let projected = phi.transpose() * epsilon_imaginary * &phi;
        let inverse = projected.try_inverse().ok_or_else(|| {
            XtpError::Numerical("dielectric matrix at imaginary frequency is singular".to_string())
        })?;

        let size = eigenvalues.len();
        let mut weights = DVector::zeros(size);
        let mut frequencies = DVector::zeros(size);
        let mut dropped = 0;
        for i in 0..size {
            let weight = 1.0 - 1.0 / eigenvalues[i];
            if weight < WEIGHT_THRESHOLD {
                dropped += 1;
                frequencies[i] = DROPPED_FREQUENCY;
                continue;
            }
            let nominator = inverse[(i, i)] - 1.0;
            let denominator = nominator + weight;
            if denominator.abs() < SINGULAR_DENOMINATOR {
                log::warn!("plasmon-pole mode {i} does not change with frequency, dropping it");
                dropped += 1;
                frequencies[i] = DROPPED_FREQUENCY;
                continue;
            }
            let fraction = -nominator / denominator * imaginary_frequency.powi(2);
            weights[i] = weight;
            frequencies[i] = fraction.abs().sqrt();
        }
        if dropped > 0 {
            log::debug!("plasmon-pole model drops {dropped} of {size} modes");
        }

        Ok(Self {
            weights,
            frequencies,
            modes: phi.transpose(),
        })
    }

    pub(crate) fn weights(&self) -> &DVector<f64> {
        &self.weights
    }

    pub(crate) fn frequencies(&self) -> &DVector<f64> {
        &self.frequencies
    }

    /// Per-level three-centre matrices expressed in the plasmon modes.
    pub(crate) fn project(&self, levels: &[DMatrix<f64>]) -> Vec<DMatrix<f64>> {
        levels.iter().map(|level| &self.modes * level).collect()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};

    use super::PlasmonPoleModel;

    #[test]
    fn weak_modes_are_clamped() {
        let epsilon_static = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0 + 1e-7, 3.0]));
        let epsilon_imaginary = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0 + 5e-8, 2.0]));
        let ppm =
            PlasmonPoleModel::fit(&epsilon_static, &epsilon_imaginary, &DMatrix::identity(2, 2), 0.5)
                .unwrap();

        assert_eq!(ppm.weights()[0], 0.0);
        assert_eq!(ppm.frequencies()[0], 0.5);

        assert_relative_eq!(ppm.weights()[1], 2.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(ppm.frequencies()[1], 0.75f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn frequency_independent_modes_are_dropped() {
        // ε(iω) = ε(0) along the first mode puts its pole at infinity
        let epsilon_static = DMatrix::from_diagonal(&DVector::from_vec(vec![2.0, 4.0]));
        let epsilon_imaginary = DMatrix::from_diagonal(&DVector::from_vec(vec![2.0, 2.0]));
        let ppm =
            PlasmonPoleModel::fit(&epsilon_static, &epsilon_imaginary, &DMatrix::identity(2, 2), 0.5)
                .unwrap();

        assert!(ppm.weights().iter().chain(ppm.frequencies().iter()).all(|x| x.is_finite()));
        assert_eq!(ppm.weights()[0], 0.0);
        assert_eq!(ppm.frequencies()[0], 0.5);

        assert_relative_eq!(ppm.weights()[1], 0.75, epsilon = 1e-12);
        assert_relative_eq!(ppm.frequencies()[1], 0.5 * 2.0f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn model_reproduces_the_dynamic_point() {
        let epsilon_static = DMatrix::from_row_slice(2, 2, &[2.0, 0.3, 0.3, 1.5]);
        let epsilon_imaginary = DMatrix::from_row_slice(2, 2, &[1.6, 0.2, 0.2, 1.3]);
        let ppm =
            PlasmonPoleModel::fit(&epsilon_static, &epsilon_imaginary, &DMatrix::identity(2, 2), 0.5)
                .unwrap();

        // Along each mode the fitted pole reproduces the diagonal of the inverse.
        let projected = &ppm.modes * &epsilon_imaginary * ppm.modes.transpose();
        let inverse = projected.try_inverse().unwrap();
        for i in 0..2 {
            let (w, omega) = (ppm.weights()[i], ppm.frequencies()[i]);
            assert!(w > 0.0);
            assert_relative_eq!(
                inverse[(i, i)] - 1.0,
                -w * omega * omega / (omega * omega + 0.25),
                epsilon = 1e-10
            );
        }
        assert!(PlasmonPoleModel::fit(&epsilon_static, &epsilon_imaginary, &DMatrix::identity(2, 2), 0.0).is_err());
    }
}

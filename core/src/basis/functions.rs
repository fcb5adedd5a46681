use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Function of the form K*x^i*y^j*z^k*exp(-alpha*x^2)
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Gaussian {
    pub exponent: f64,
    /// The coefficient of this gaussian and optionally the normalization constant
    pub coefficient: f64,
    /// (i, j, k) exponents of polynomial terms
    pub angular: (i32, i32, i32),
}

impl Gaussian {
    pub fn norm(exponent: f64, angular: (i32, i32, i32)) -> f64 {
        let (i, j, k) = angular;

        (std::f64::consts::FRAC_2_PI * exponent)
            .powi(3)
            .sqrt()
            .sqrt()
            * f64::sqrt(
                (8.0 * exponent).powi(i + j + k)
                    / ((i + 1..=2 * i).product::<i32>()
                        * (j + 1..=2 * j).product::<i32>()
                        * (k + 1..=2 * k).product::<i32>()) as f64,
            )
    }

    #[inline(always)]
    fn evaluate(&self, r: Vector3<f64>) -> f64 {
        let (i, j, k) = self.angular;
        self.coefficient
            * r.x.powi(i)
            * r.y.powi(j)
            * r.z.powi(k)
            * (-self.exponent * r.norm_squared()).exp()
    }
}

/// Linear combination of many [`Gaussian`]s
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContractedGaussian(pub SmallVec<[Gaussian; 6]>);

impl ContractedGaussian {
    /// Contracts primitives that share the cartesian angular part `angular`.
    /// `coefficients` refer to normalized primitives; the contraction itself is
    /// normalized as well.
    pub fn normalized(exponents: &[f64], coefficients: &[f64], angular: (i32, i32, i32)) -> Self {
        let (i, j, k) = angular;
        let l = (i + j + k) as f64;

        let mut self_overlap = 0.0;
        for (&a, &ca) in exponents.iter().zip(coefficients) {
            for (&b, &cb) in exponents.iter().zip(coefficients) {
                self_overlap += ca * cb * (2.0 * (a * b).sqrt() / (a + b)).powf(l + 1.5);
            }
        }
        let contraction_norm = self_overlap.sqrt().recip();

        Self(
            exponents
                .iter()
                .zip(coefficients)
                .map(|(&exponent, &coefficient)| Gaussian {
                    exponent,
                    coefficient: coefficient * contraction_norm * Gaussian::norm(exponent, angular),
                    angular,
                })
                .collect(),
        )
    }

    /// Linear combination of contracted functions, e.g. a real spherical harmonic
    /// assembled from its cartesian components.
    pub fn combine<'a>(terms: impl IntoIterator<Item = (f64, &'a ContractedGaussian)>) -> Self {
        let mut primitives = SmallVec::new();
        for (weight, ContractedGaussian(gaussians)) in terms {
            primitives.extend(gaussians.iter().map(|gaussian| Gaussian {
                coefficient: weight * gaussian.coefficient,
                ..*gaussian
            }));
        }
        Self(primitives)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BasisFunction {
    /// The type of basis function this basis function has
    pub contracted_gaussian: ContractedGaussian,
    /// The position of this basis function, in natural units
    pub position: Vector3<f64>,
}

impl BasisFunction {
    /// Evaluate this basis function at a given position
    pub(crate) fn evaluate(&self, at: Vector3<f64>) -> f64 {
        let r = at - self.position;
        let ContractedGaussian(primitives) = &self.contracted_gaussian;
        primitives.iter().map(|primitive| primitive.evaluate(r)).sum()
    }

    /// Smallest exponent of all primitives, used for screening on grids.
    pub(crate) fn min_exponent(&self) -> f64 {
        let ContractedGaussian(primitives) = &self.contracted_gaussian;
        primitives
            .iter()
            .map(|primitive| primitive.exponent)
            .fold(f64::INFINITY, f64::min)
    }
}

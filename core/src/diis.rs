//! Direct inversion in the iterative subspace.
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, XtpError},
    linalg,
};

/// Extrapolation coefficients below this are skipped.
const NEGLIGIBLE_COEFFICIENT: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiisOptions {
    /// Maximum number of stored Fock/error pairs.
    pub history: usize,
    /// Extrapolate once the error metric falls below this.
    pub diis_start: f64,
    /// Above this error the density is damped with the SCF mixing parameter.
    pub adiis_start: f64,
    pub use_diis: bool,
}

impl Default for DiisOptions {
    fn default() -> Self {
        Self {
            history: 10,
            diis_start: 0.002,
            adiis_start: 2.0,
            use_diis: true,
        }
    }
}

impl DiisOptions {
    pub fn validate(&self) -> Result<()> {
        if self.history < 2 {
            return Err(XtpError::Config(format!(
                "DIIS history must hold at least two entries, got {}",
                self.history
            )));
        }
        if self.diis_start <= 0.0 || self.adiis_start <= 0.0 {
            return Err(XtpError::Config(
                "DIIS thresholds must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

struct Sample {
    fock: DMatrix<f64>,
    max_error: f64,
    error: DMatrix<f64>,
}

/// Result of one [`Diis::evolve`] step.
#[derive(Debug, Clone)]
pub struct DiisStep {
    /// Largest absolute element of the orthogonalized commutator.
    pub max_error: f64,
    pub mo_energies: DVector<f64>,
    /// One column per level.
    pub mo_coefficients: DMatrix<f64>,
    pub extrapolated: bool,
}

pub struct Diis {
    options: DiisOptions,
    overlap: DMatrix<f64>,
    overlap_inv_sqrt: DMatrix<f64>,
    samples: Vec<Sample>,
    /// B_ij = tr(e_i e_jᵀ), row i holds the entries j <= i.
    products: Vec<Vec<f64>>,
}

impl Diis {
    pub fn new(options: DiisOptions, overlap: DMatrix<f64>) -> Result<Self> {
        options.validate()?;
        let overlap_inv_sqrt = linalg::inverse_sqrt(&overlap, "AO overlap")?;
        Ok(Self {
            options,
            overlap,
            overlap_inv_sqrt,
            samples: Vec::new(),
            products: Vec::new(),
        })
    }

    pub fn history_len(&self) -> usize {
        self.samples.len()
    }

    /// Errors of the stored samples, oldest first.
    pub fn recorded_errors(&self) -> Vec<f64> {
        self.samples.iter().map(|sample| sample.max_error).collect()
    }

    /// Stores the current Fock matrix, extrapolates a better one if the error is
    /// small enough and diagonalizes it.
    pub fn evolve(
        &mut self,
        density: &DMatrix<f64>,
        fock: &DMatrix<f64>,
        iteration: usize,
    ) -> Result<DiisStep> {
        let commutator =
            fock * density * &self.overlap - &self.overlap * density * fock;
        let error = &self.overlap_inv_sqrt * commutator * &self.overlap_inv_sqrt;
        let max_error = error.amax();

        self.push(Sample {
            fock: fock.clone(),
            max_error,
            error,
        });

        let use_extrapolation =
            self.options.use_diis && max_error < self.options.diis_start && iteration > 2;

        if use_extrapolation {
            match self.coefficients() {
                Some(coefficients) => {
                    let mut guess = DMatrix::zeros(fock.nrows(), fock.ncols());
                    for (sample, &c) in self.samples.iter().zip(coefficients.iter()) {
                        if c.abs() < NEGLIGIBLE_COEFFICIENT {
                            continue;
                        }
                        guess += c * &sample.fock;
                    }
                    let (mo_energies, mo_coefficients) = self.solve_fock_matrix(&guess)?;
                    return Ok(DiisStep {
                        max_error,
                        mo_energies,
                        mo_coefficients,
                        extrapolated: true,
                    });
                }
                None => {
                    log::warn!("solving DIIS failed, diagonalizing the current Fock matrix");
                }
            }
        }

        let (mo_energies, mo_coefficients) = self.solve_fock_matrix(fock)?;
        Ok(DiisStep {
            max_error,
            mo_energies,
            mo_coefficients,
            extrapolated: false,
        })
    }

    /// Generalized eigenproblem H C = S C e. A failure aborts the SCF step.
    pub fn solve_fock_matrix(&self, h: &DMatrix<f64>) -> Result<(DVector<f64>, DMatrix<f64>)> {
        linalg::generalized_eigs(h, &self.overlap).map_err(|error| {
            XtpError::Numerical(format!("generalized eigenvalue problem did not work: {error}"))
        })
    }

    fn push(&mut self, sample: Sample) {
        let mut row = Vec::with_capacity(self.samples.len() + 1);
        for old in &self.samples {
            row.push(sample.error.dot(&old.error));
        }
        row.push(sample.error.norm_squared());

        self.samples.push(sample);
        self.products.push(row);

        if self.samples.len() > self.options.history {
            let worst = self
                .samples
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.max_error.total_cmp(&b.max_error))
                .map(|(index, _)| index)
                .unwrap_or(0);
            self.evict(worst);
        }
    }

    fn evict(&mut self, index: usize) {
        self.samples.remove(index);
        self.products.remove(index);
        for row in self.products.iter_mut().skip(index) {
            row.remove(index);
        }
    }

    fn product(&self, i: usize, j: usize) -> f64 {
        if j <= i {
            self.products[i][j]
        } else {
            self.products[j][i]
        }
    }

    /// Solves the bordered system for the extrapolation coefficients.
    fn coefficients(&self) -> Option<DVector<f64>> {
        let n = self.samples.len();

        let matrix = DMatrix::from_fn(n + 1, n + 1, |i, j| match (i, j) {
            (i, j) if i == n && j == n => 0.0,
            (i, j) if i == n || j == n => -1.0,
            (i, j) => self.product(i, j),
        });

        let b = DVector::from_fn(n + 1, |i, _| if i == n { -1.0 } else { 0.0 });

        let solution = matrix.lu().solve(&b)?;
        if solution.iter().any(|x| !x.is_finite()) {
            return None;
        }
        Some(solution.rows(0, n).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::{Diis, DiisOptions};

    fn random_symmetric(rng: &mut StdRng, n: usize) -> DMatrix<f64> {
        let m = DMatrix::from_fn(n, n, |_, _| rng.gen_range(-1.0..1.0));
        (&m + m.transpose()) * 0.5
    }

    #[test]
    fn history_is_bounded_and_evicts_worst() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 4;
        let options = DiisOptions {
            history: 3,
            ..Default::default()
        };
        let mut diis = Diis::new(options, DMatrix::identity(n, n)).unwrap();

        for iteration in 0..12 {
            let fock = random_symmetric(&mut rng, n);
            let density = random_symmetric(&mut rng, n);
            let before = diis.recorded_errors();

            let step = diis.evolve(&density, &fock, iteration).unwrap();
            assert!(diis.history_len() <= 3);

            if before.len() == 3 {
                let mut candidates = before.clone();
                candidates.push(step.max_error);
                let worst = candidates.iter().copied().fold(f64::MIN, f64::max);
                assert!(!diis.recorded_errors().contains(&worst));
            }
        }
    }

    #[test]
    fn commuting_fock_and_density_have_zero_error() {
        let n = 3;
        let fock = DMatrix::from_diagonal(&DVector::from_vec(vec![-1.0, 0.5, 2.0]));
        let density = DMatrix::from_diagonal(&DVector::from_vec(vec![2.0, 0.0, 0.0]));
        let mut diis = Diis::new(DiisOptions::default(), DMatrix::identity(n, n)).unwrap();

        let step = diis.evolve(&density, &fock, 0).unwrap();
        assert_relative_eq!(step.max_error, 0.0);
        assert_relative_eq!(step.mo_energies[0], -1.0, epsilon = 1e-12);
        assert!(!step.extrapolated);
    }

    #[test]
    fn extrapolation_recovers_the_stationary_fock() {
        // F0 ± δX have opposite errors, so the half-half mix removes the coupling
        let n = 2;
        let delta = 5e-4;
        let stationary = DMatrix::from_row_slice(2, 2, &[-1.0, 0.0, 0.0, 1.0]);
        let coupling = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 1.0, 0.0]);
        let density = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 0.0]);
        let mut diis = Diis::new(DiisOptions::default(), DMatrix::identity(n, n)).unwrap();

        let first = diis.evolve(&density, &(&stationary + &coupling * delta), 3).unwrap();
        assert_relative_eq!(first.max_error, 2.0 * delta, epsilon = 1e-15);
        assert!(first.extrapolated);

        let step = diis.evolve(&density, &(&stationary - &coupling * delta), 4).unwrap();
        assert!(step.extrapolated);
        assert_relative_eq!(step.mo_energies[0], -1.0, epsilon = 1e-12);
        assert_relative_eq!(step.mo_energies[1], 1.0, epsilon = 1e-12);
        assert_relative_eq!(step.mo_coefficients[(0, 0)].abs(), 1.0, epsilon = 1e-12);

        // without extrapolation the coupled eigenvalues are ±sqrt(1 + δ²)
        let mut plain = Diis::new(
            DiisOptions {
                use_diis: false,
                ..Default::default()
            },
            DMatrix::identity(n, n),
        )
        .unwrap();
        let step = plain.evolve(&density, &(&stationary - &coupling * delta), 4).unwrap();
        assert!(!step.extrapolated);
        assert_relative_eq!(step.mo_energies[0], -(1.0 + delta * delta).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn singular_subspace_falls_back_to_the_current_fock() {
        // commuting samples have zero error, leaving two identical rows in the bordered matrix
        let n = 3;
        let fock = DMatrix::from_diagonal(&DVector::from_vec(vec![-1.0, 0.5, 2.0]));
        let density = DMatrix::from_diagonal(&DVector::from_vec(vec![2.0, 0.0, 0.0]));
        let mut diis = Diis::new(DiisOptions::default(), DMatrix::identity(n, n)).unwrap();

        for iteration in 0..5 {
            let step = diis.evolve(&density, &fock, iteration).unwrap();
            assert!(!step.extrapolated);
            assert_relative_eq!(step.mo_energies, DVector::from_vec(vec![-1.0, 0.5, 2.0]), epsilon = 1e-12);
        }
        assert_eq!(diis.history_len(), 5);
    }

    #[test]
    fn singular_overlap_is_rejected() {
        let overlap = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        assert!(Diis::new(DiisOptions::default(), overlap).is_err());
    }
}

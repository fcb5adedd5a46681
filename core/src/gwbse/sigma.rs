//! GW self-energy in the plasmon-pole approximation and the quasiparticle equations.
use std::{f64::consts::PI, ops::RangeInclusive};

use nalgebra::{DMatrix, DVector};

use super::{ppm::PlasmonPoleModel, rpa::MoThreeCenter};

/// Hartree; denominators smaller than this are damped.
const STABILISATION_WINDOW: f64 = 0.25;

/// Exchange part −(1 − a) Σ_occ (mn|nk), with a the fraction of exact exchange
/// already contained in the mean-field levels.
pub(crate) fn exchange(
    mo: &MoThreeCenter,
    (m, k): (usize, usize),
    homo: usize,
    sca_hfx: f64,
) -> f64 {
    let bm = mo.level(m);
    let bk = mo.level(k);
    let sum: f64 = (0..=homo).map(|n| bm.column(n).dot(&bk.column(n))).sum();
    -(1.0 - sca_hfx) * sum
}

/// Correlation part Σc(E) built from the plasmon modes.
pub(crate) struct Correlation<'a> {
    ppm: &'a PlasmonPoleModel,
    /// Per level, (modes × levels).
    modes: &'a [DMatrix<f64>],
    homo: usize,
    band: RangeInclusive<usize>,
}

impl<'a> Correlation<'a> {
    pub(crate) fn new(
        ppm: &'a PlasmonPoleModel,
        modes: &'a [DMatrix<f64>],
        homo: usize,
        band: RangeInclusive<usize>,
    ) -> Self {
        Self {
            ppm,
            modes,
            homo,
            band,
        }
    }

    /// Σc_mk(E), summed over the band levels n with energies `energies`.
    pub(crate) fn evaluate(
        &self,
        (m, k): (usize, usize),
        energy: f64,
        energies: &DVector<f64>,
    ) -> f64 {
        let weights = self.ppm.weights();
        let frequencies = self.ppm.frequencies();
        let (mm, mk) = (&self.modes[m], &self.modes[k]);

        let mut sigma = 0.0;
        for n in self.band.clone() {
            let occupation = if n <= self.homo { 1.0 } else { -1.0 };
            for i in 0..weights.len() {
                if weights[i] == 0.0 {
                    continue;
                }
                let denominator = energy - energies[n] + occupation * frequencies[i];
                let factor = 0.5 * weights[i] * frequencies[i] * stabilisation(denominator)
                    / denominator;
                sigma += factor * mm[(i, n)] * mk[(i, n)];
            }
        }
        sigma
    }
}

/// Smoothly removes poles within the stabilisation window.
fn stabilisation(denominator: f64) -> f64 {
    let distance = denominator.abs();
    if distance < STABILISATION_WINDOW {
        0.5 * (1.0 - (4.0 * PI * distance).cos())
    } else {
        1.0
    }
}

/// Result of the perturbative quasiparticle equations.
pub(crate) struct Quasiparticles {
    /// All band levels, the QP window replaced by the solutions.
    pub energies: DVector<f64>,
    /// Columns dft, Σx, Σc, Vxc, QP for each level of the QP window.
    pub table: DMatrix<f64>,
    pub converged: bool,
}

pub(crate) struct QpProblem<'a> {
    pub correlation: &'a Correlation<'a>,
    pub window: RangeInclusive<usize>,
    pub dft_energies: &'a DVector<f64>,
    pub sigma_x: &'a DVector<f64>,
    pub vxc: &'a DVector<f64>,
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl QpProblem<'_> {
    /// Fixed-point solution of E = ε + Σx + Σc(E) − Vxc on the QP window,
    /// starting from `start`.
    pub(crate) fn solve(&self, start: &DVector<f64>) -> Quasiparticles {
        let first = *self.window.start();
        let mut energies = start.clone();
        let mut sigma_c = DVector::zeros(self.sigma_x.len());
        let mut converged = false;

        for iteration in 0..self.max_iterations {
            let mut updated = energies.clone();
            for (q, m) in self.window.clone().enumerate() {
                sigma_c[q] = self.correlation.evaluate((m, m), energies[m], &energies);
                updated[m] = self.dft_energies[m] + self.sigma_x[q] + sigma_c[q] - self.vxc[q];
            }
            let change = self
                .window
                .clone()
                .map(|m| (updated[m] - energies[m]).abs())
                .fold(0.0, f64::max);
            energies = updated;
            log::trace!("QP iteration {iteration}: max change {change:e}");
            if change < self.tolerance {
                converged = true;
                break;
            }
        }
        if !converged {
            log::warn!(
                "quasiparticle energies not converged within {} iterations",
                self.max_iterations
            );
        }

        let size = self.sigma_x.len();
        let table = DMatrix::from_fn(size, 5, |q, column| match column {
            0 => self.dft_energies[first + q],
            1 => self.sigma_x[q],
            2 => sigma_c[q],
            3 => self.vxc[q],
            _ => energies[first + q],
        });
        Quasiparticles {
            energies,
            table,
            converged,
        }
    }
}

/// Quasiparticle Hamiltonian on the QP window; off-diagonal Σc is averaged
/// over the energies of both levels.
pub(crate) fn qp_hamiltonian(
    correlation: &Correlation,
    window: RangeInclusive<usize>,
    dft_energies: &DVector<f64>,
    sigma_x: &DMatrix<f64>,
    vxc: &DMatrix<f64>,
    energies: &DVector<f64>,
) -> DMatrix<f64> {
    let first = *window.start();
    let size = sigma_x.nrows();
    crate::linalg::symmetric_matrix(size, |q, p| {
        let (m, k) = (first + q, first + p);
        let sigma_c = if q == p {
            correlation.evaluate((m, m), energies[m], energies)
        } else {
            0.5 * (correlation.evaluate((m, k), energies[m], energies)
                + correlation.evaluate((m, k), energies[k], energies))
        };
        let diagonal = if q == p { dft_energies[m] } else { 0.0 };
        diagonal + sigma_x[(q, p)] + sigma_c - vxc[(q, p)]
    })
}

//! Local density approximation: Slater exchange and VWN5 correlation for a
//! spin-unpolarized density.
use std::f64::consts::PI;

use nalgebra::{DMatrix, DVector};

use crate::grid::IntegrationGrid;

/// Densities below this do not contribute.
const DENSITY_CUTOFF: f64 = 1e-10;

// VWN5 paramagnetic fit, Hartree
const VWN_A: f64 = 0.0310907;
const VWN_X0: f64 = -0.10498;
const VWN_B: f64 = 3.72744;
const VWN_C: f64 = 12.9352;

/// Energy density per electron ε_x and potential v_x.
pub(crate) fn slater_exchange(rho: f64) -> (f64, f64) {
    let cube_root = (3.0 / PI * rho).cbrt();
    (-0.75 * cube_root, -cube_root)
}

/// Energy density per electron ε_c and potential v_c.
pub(crate) fn vwn5_correlation(rho: f64) -> (f64, f64) {
    let rs = (3.0 / (4.0 * PI * rho)).cbrt();
    let x = rs.sqrt();

    let big_x = |x: f64| x * x + VWN_B * x + VWN_C;
    let q = (4.0 * VWN_C - VWN_B * VWN_B).sqrt();
    let xx = big_x(x);
    let xx0 = big_x(VWN_X0);
    let atan = (q / (2.0 * x + VWN_B)).atan();
    let prefactor = VWN_B * VWN_X0 / xx0;

    let epsilon = VWN_A
        * ((x * x / xx).ln() + 2.0 * VWN_B / q * atan
            - prefactor
                * (((x - VWN_X0).powi(2) / xx).ln() + 2.0 * (VWN_B + 2.0 * VWN_X0) / q * atan));

    let d_epsilon = VWN_A
        * (2.0 / x - (2.0 * x + VWN_B) / xx - VWN_B / xx
            - prefactor
                * (2.0 / (x - VWN_X0) - (2.0 * x + VWN_B) / xx - (VWN_B + 2.0 * VWN_X0) / xx));

    (epsilon, epsilon - x / 6.0 * d_epsilon)
}

/// Exchange-correlation energy and AO potential matrix of `density` on `grid`.
pub(crate) fn lda(
    grid: &IntegrationGrid,
    ao_values: &DMatrix<f64>,
    density: &DMatrix<f64>,
) -> (f64, DMatrix<f64>) {
    let rho = grid.density(ao_values, density);

    let mut energy_density = DVector::zeros(rho.len());
    let mut potential = DVector::zeros(rho.len());
    for (p, &value) in rho.iter().enumerate() {
        if value < DENSITY_CUTOFF {
            continue;
        }
        let (ex, vx) = slater_exchange(value);
        let (ec, vc) = vwn5_correlation(value);
        energy_density[p] = value * (ex + ec);
        potential[p] = vx + vc;
    }

    let energy = grid.integrate(&energy_density);
    (energy, grid.integrate_potential(ao_values, &potential))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::{slater_exchange, vwn5_correlation};

    fn numerical_potential(f: impl Fn(f64) -> (f64, f64), rho: f64) -> f64 {
        let h = 1e-6 * rho;
        ((rho + h) * f(rho + h).0 - (rho - h) * f(rho - h).0) / (2.0 * h)
    }

    #[test]
    fn potentials_are_density_derivatives() {
        for rho in [1e-3, 0.05, 0.7, 12.0] {
            assert_relative_eq!(
                slater_exchange(rho).1,
                numerical_potential(slater_exchange, rho),
                max_relative = 1e-6
            );
            assert_relative_eq!(
                vwn5_correlation(rho).1,
                numerical_potential(vwn5_correlation, rho),
                max_relative = 1e-5
            );
        }
    }

    #[test]
    fn correlation_energy_of_the_uniform_gas() {
        // rs = 1: ε_c ≈ -0.0600 Ha in VWN5
        let rho = 3.0 / (4.0 * std::f64::consts::PI);
        let (epsilon, _) = vwn5_correlation(rho);
        assert_relative_eq!(epsilon, -0.0600, epsilon = 5e-4);
    }
}

//! Atom-centred numerical integration grids with Becke partitioning.
mod quadrature;

use std::{f64::consts::PI, fmt};

use nalgebra::{DMatrix, DVector, Vector3};
use serde::{Deserialize, Serialize};

use crate::{atom::Atom, basis::BasisFunction, units};

pub(crate) use quadrature::gauss_legendre;

/// Grid points with a negligible weight are dropped.
const WEIGHT_CUTOFF: f64 = 1e-15;

/// Basis functions are treated as zero beyond exp(-40).
const SCREENING_EXPONENT: f64 = 40.0;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridQuality {
    Coarse,
    #[default]
    Medium,
    Fine,
    Xfine,
}

impl GridQuality {
    fn radial_points(&self) -> usize {
        match self {
            Self::Coarse => 35,
            Self::Medium => 50,
            Self::Fine => 75,
            Self::Xfine => 100,
        }
    }

    /// Gauss-Legendre points in cos θ; φ uses twice as many.
    fn theta_points(&self) -> usize {
        match self {
            Self::Coarse => 11,
            Self::Medium => 15,
            Self::Fine => 19,
            Self::Xfine => 25,
        }
    }
}

impl fmt::Display for GridQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Coarse => "coarse",
            Self::Medium => "medium",
            Self::Fine => "fine",
            Self::Xfine => "xfine",
        })
    }
}

/// Quadrature points (Bohr) and weights over all space.
#[derive(Debug, Clone, Default)]
pub struct IntegrationGrid {
    points: Vec<Vector3<f64>>,
    weights: Vec<f64>,
}

impl IntegrationGrid {
    /// Molecular grid: one atomic grid per atom, combined with Becke's fuzzy cells.
    pub fn build(atoms: &[Atom], quality: GridQuality) -> Self {
        let (cos_theta, theta_weights) = gauss_legendre(quality.theta_points());
        let n_phi = 2 * quality.theta_points();

        let mut directions = Vec::with_capacity(cos_theta.len() * n_phi);
        for (&z, &w) in cos_theta.iter().zip(&theta_weights) {
            let sin_theta = (1.0 - z * z).sqrt();
            for k in 0..n_phi {
                let phi = 2.0 * PI * k as f64 / n_phi as f64;
                directions.push((
                    Vector3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), z),
                    w * 2.0 * PI / n_phi as f64,
                ));
            }
        }

        let mut points = Vec::new();
        let mut weights = Vec::new();
        for (index, atom) in atoms.iter().enumerate() {
            let scale = radial_scale(atom);
            let (radii, radial_weights) = quadrature::becke_radial(quality.radial_points(), scale);

            for (&r, &radial_weight) in radii.iter().zip(&radial_weights) {
                for (direction, angular_weight) in &directions {
                    let point = atom.position + r * direction;
                    let weight =
                        radial_weight * angular_weight * becke_partition(atoms, index, &point);
                    if weight > WEIGHT_CUTOFF {
                        points.push(point);
                        weights.push(weight);
                    }
                }
            }
        }

        log::debug!("built {quality} grid with {} points for {} atoms", points.len(), atoms.len());
        Self { points, weights }
    }

    /// Grid from explicit points and weights, e.g. an external potential grid.
    pub fn from_points(points: Vec<Vector3<f64>>, weights: Vec<f64>) -> Self {
        Self { points, weights }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Vector3<f64>] {
        &self.points
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Values of every basis function at every point (points × functions).
    pub fn ao_values(&self, basis: &[BasisFunction]) -> DMatrix<f64> {
        let cutoffs = basis
            .iter()
            .map(|function| SCREENING_EXPONENT / function.min_exponent())
            .collect::<Vec<_>>();

        DMatrix::from_fn(self.points.len(), basis.len(), |p, m| {
            let point = self.points[p];
            if (point - basis[m].position).norm_squared() > cutoffs[m] {
                0.0
            } else {
                basis[m].evaluate(point)
            }
        })
    }

    /// Electron density ρ(r) = Σ_mn D_mn φ_m φ_n at every point.
    pub fn density(&self, ao_values: &DMatrix<f64>, density: &DMatrix<f64>) -> DVector<f64> {
        let transformed = ao_values * density;
        DVector::from_fn(self.points.len(), |p, _| {
            transformed.row(p).dot(&ao_values.row(p))
        })
    }

    /// AO matrix V_mn = Σ_p w_p v_p φ_m(p) φ_n(p) of a local potential.
    pub fn integrate_potential(&self, ao_values: &DMatrix<f64>, potential: &DVector<f64>) -> DMatrix<f64> {
        let mut weighted = ao_values.clone();
        for (p, mut row) in weighted.row_iter_mut().enumerate() {
            row *= self.weights[p] * potential[p];
        }
        let matrix = ao_values.transpose() * weighted;
        (&matrix + matrix.transpose()) * 0.5
    }

    /// Σ_p w_p f_p.
    pub fn integrate(&self, values: &DVector<f64>) -> f64 {
        self.weights.iter().zip(values.iter()).map(|(w, f)| w * f).sum()
    }
}

/// Becke's radial scaling: half the van der Waals radius (Bohr), but at least one Bohr.
fn radial_scale(atom: &Atom) -> f64 {
    (0.5 * atom.element_type().vdw_radius() * units::ANG2BOHR).max(1.0)
}

/// Becke's fuzzy cell weight of atom `owner` at `point`.
fn becke_partition(atoms: &[Atom], owner: usize, point: &Vector3<f64>) -> f64 {
    if atoms.len() == 1 {
        return 1.0;
    }

    let cell = |a: usize| -> f64 {
        let ra = (point - atoms[a].position()).norm();
        let mut product = 1.0;
        for (b, atom_b) in atoms.iter().enumerate() {
            if a == b {
                continue;
            }
            let rb = (point - atom_b.position()).norm();
            let rab = (atoms[a].position() - atom_b.position()).norm();
            let mut mu = (ra - rb) / rab;
            for _ in 0..3 {
                mu = 1.5 * mu - 0.5 * mu.powi(3);
            }
            product *= 0.5 * (1.0 - mu);
            if product == 0.0 {
                break;
            }
        }
        product
    };

    let total: f64 = (0..atoms.len()).map(cell).sum();
    if total == 0.0 {
        0.0
    } else {
        cell(owner) / total
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};

    use super::{GridQuality, IntegrationGrid};
    use crate::basis::{tests::{h2_atoms, hydrogen_6_31g}, AoBasis};

    #[test]
    fn integrates_overlap_of_basis() {
        let atoms = h2_atoms();
        let basis = AoBasis::fill(&hydrogen_6_31g(), &atoms, None)
            .unwrap()
            .basis_functions()
            .unwrap();
        let grid = IntegrationGrid::build(&atoms, GridQuality::Medium);
        let values = grid.ao_values(&basis);
        let ones = DVector::from_element(grid.len(), 1.0);
        let overlap = grid.integrate_potential(&values, &ones);
        for i in 0..basis.len() {
            assert_relative_eq!(overlap[(i, i)], 1.0, epsilon = 1e-5);
        }

        // a density of one normalized function holds one electron
        let mut density = DMatrix::zeros(basis.len(), basis.len());
        density[(0, 0)] = 1.0;
        let rho = grid.density(&values, &density);
        assert_relative_eq!(grid.integrate(&rho), 1.0, epsilon = 1e-5);
    }
}

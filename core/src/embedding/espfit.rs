//! Atomic point charges from a density matrix.
use std::f64::consts::PI;

use nalgebra::{DMatrix, DVector, Vector3};
use serde::{Deserialize, Serialize};

use crate::{
    basis::{AoBasis, BasisFunction},
    error::{Result, XtpError},
    integrals::{overlap_matrix, point_charge_matrix, DefaultIntegrator, PointCharge},
    orbitals::QmAtom,
    units,
};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeMethod {
    /// Least-squares fit to the electrostatic potential on shells around the atoms.
    #[default]
    Chelpg,
    Mulliken,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EspFitOptions {
    pub method: ChargeMethod,
    /// Shell radii in units of the van der Waals radius.
    pub shells: Vec<f64>,
    /// Fit points per Å² of shell surface.
    pub point_density: f64,
}

impl Default for EspFitOptions {
    fn default() -> Self {
        Self {
            method: ChargeMethod::default(),
            shells: vec![1.4, 1.6, 1.8, 2.0],
            point_density: 1.0,
        }
    }
}

/// Outcome of a charge fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitSummary {
    /// Net charge the fit was constrained to, e.
    pub total_charge: f64,
    /// RMS deviation of the fitted from the exact potential, Hartree/e.
    pub rms_error: Option<f64>,
    pub points: usize,
}

pub struct EspFit {
    options: EspFitOptions,
    integrator: DefaultIntegrator,
}

impl EspFit {
    pub fn new(options: EspFitOptions) -> Result<Self> {
        if options.method == ChargeMethod::Chelpg
            && (options.shells.is_empty() || options.shells.iter().any(|&scale| scale <= 0.0))
        {
            return Err(XtpError::Config(format!(
                "invalid ESP fit shells {:?}",
                options.shells
            )));
        }
        if options.point_density <= 0.0 {
            return Err(XtpError::Config("ESP point density must be positive".to_string()));
        }
        Ok(Self {
            options,
            integrator: DefaultIntegrator::default(),
        })
    }

    /// Replaces the partial charges of `atoms` by charges representing
    /// `density` (expanded in `basis`) together with the nuclei.
    pub fn fit_to_density(
        &self,
        atoms: &mut [QmAtom],
        density: &DMatrix<f64>,
        basis: &AoBasis,
    ) -> Result<FitSummary> {
        if density.shape() != (basis.size(), basis.size()) {
            return Err(XtpError::DimensionMismatch {
                context: "density matrix vs AO basis of the charge fit",
                expected: basis.size(),
                found: density.nrows(),
            });
        }
        let functions = basis.basis_functions()?;
        let overlap = overlap_matrix(&functions, &self.integrator);
        let electrons = density.dot(&overlap);
        let nuclear: f64 = atoms.iter().map(|atom| atom.nuclear_charge).sum();
        let total_charge = (nuclear - electrons).round();
        log::debug!(
            "charge fit: {electrons:.6} electrons, constrained net charge {total_charge}"
        );

        let summary = match self.options.method {
            ChargeMethod::Mulliken => {
                let populations = density * &overlap;
                for atom in atoms.iter_mut() {
                    atom.partial_charge = atom.nuclear_charge;
                }
                for (function, owner) in basis.function_atoms().into_iter().enumerate() {
                    atoms[owner].partial_charge -= populations[(function, function)];
                }
                FitSummary {
                    total_charge,
                    rms_error: None,
                    points: 0,
                }
            }
            ChargeMethod::Chelpg => self.chelpg(atoms, density, &functions, total_charge)?,
        };

        for atom in atoms.iter() {
            log::debug!("{} {:3} q = {:+.5}", atom.element, atom.index, atom.partial_charge);
        }
        Ok(summary)
    }

    fn chelpg(
        &self,
        atoms: &mut [QmAtom],
        density: &DMatrix<f64>,
        functions: &[BasisFunction],
        total_charge: f64,
    ) -> Result<FitSummary> {
        let points = self.fit_points(atoms);
        if points.len() < atoms.len() {
            return Err(XtpError::Numerical(format!(
                "{} ESP points cannot determine {} charges",
                points.len(),
                atoms.len()
            )));
        }

        let potential = |point: &Vector3<f64>| {
            let nuclear: f64 = atoms
                .iter()
                .map(|atom| atom.nuclear_charge / (point - atom.position).norm())
                .sum();
            let probe = [PointCharge::new(*point, 1.0)];
            nuclear + density.dot(&point_charge_matrix(functions, &probe, &self.integrator))
        };

        #[cfg(feature = "rayon")]
        let target = {
            use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
            points.par_iter().map(potential).collect::<Vec<_>>()
        };

        #[cfg(not(feature = "rayon"))]
        let target = points.iter().map(potential).collect::<Vec<_>>();

        let target = DVector::from_vec(target);
        let design = DMatrix::from_fn(points.len(), atoms.len(), |p, a| {
            1.0 / (points[p] - atoms[a].position).norm()
        });

        // normal equations with a Lagrange multiplier for the net charge
        let n = atoms.len();
        let mut system = DMatrix::zeros(n + 1, n + 1);
        system.view_mut((0, 0), (n, n)).copy_from(&(design.transpose() * &design));
        system.view_mut((0, n), (n, 1)).fill(1.0);
        system.view_mut((n, 0), (1, n)).fill(1.0);
        let mut rhs = DVector::zeros(n + 1);
        rhs.rows_mut(0, n).copy_from(&(design.transpose() * &target));
        rhs[n] = total_charge;

        let solution = system.lu().solve(&rhs).ok_or_else(|| {
            XtpError::Numerical("singular ESP fit equations".to_string())
        })?;
        let charges = solution.rows(0, n);
        for (atom, &charge) in atoms.iter_mut().zip(charges.iter()) {
            atom.partial_charge = charge;
        }

        let residual = &design * charges - &target;
        let rms_error = (residual.norm_squared() / points.len() as f64).sqrt();
        log::info!(
            "CHELPG fit to {} points, RMS error {rms_error:.3e} Ha/e",
            points.len()
        );
        Ok(FitSummary {
            total_charge,
            rms_error: Some(rms_error),
            points: points.len(),
        })
    }

    /// Points on scaled van der Waals shells that lie outside the same shell of every other atom.
    fn fit_points(&self, atoms: &[QmAtom]) -> Vec<Vector3<f64>> {
        let mut points = Vec::new();
        for &scale in &self.options.shells {
            let radii = atoms
                .iter()
                .map(|atom| scale * atom.element.vdw_radius() * units::ANG2BOHR)
                .collect::<Vec<_>>();
            for (atom, &radius) in atoms.iter().zip(&radii) {
                let area = 4.0 * PI * (radius * units::BOHR2ANG).powi(2);
                let count = ((self.options.point_density * area).ceil() as usize).max(12);
                points.extend(
                    sphere_points(count)
                        .map(|direction| atom.position + direction * radius)
                        .filter(|point| {
                            atoms.iter().zip(&radii).all(|(other, &other_radius)| {
                                (point - other.position).norm() >= other_radius * (1.0 - 1e-10)
                            })
                        }),
                );
            }
        }
        points
    }
}

/// `count` nearly uniform unit vectors on a Fibonacci spiral.
fn sphere_points(count: usize) -> impl Iterator<Item = Vector3<f64>> {
    let golden = PI * (3.0 - 5f64.sqrt());
    (0..count).map(move |i| {
        let z = 1.0 - 2.0 * (i as f64 + 0.5) / count as f64;
        let rho = (1.0 - z * z).sqrt();
        let phi = golden * i as f64;
        Vector3::new(rho * phi.cos(), rho * phi.sin(), z)
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    use super::{sphere_points, ChargeMethod, EspFit, EspFitOptions};
    use crate::{
        basis::{tests::{h2_atoms, hydrogen_6_31g}, AoBasis},
        dft::{DftEngine, DftOptions},
        orbitals::{Orbitals, QmAtom},
    };

    fn qm_atoms() -> Vec<QmAtom> {
        h2_atoms()
            .iter()
            .enumerate()
            .map(|(index, atom)| QmAtom::from_atom(index, atom))
            .collect()
    }

    #[test]
    fn sphere_points_are_unit_vectors() {
        let points = sphere_points(50).collect::<Vec<_>>();
        assert_eq!(points.len(), 50);
        let centroid = points.iter().sum::<nalgebra::Vector3<f64>>() / 50.0;
        assert!(centroid.norm() < 0.05);
        for point in points {
            assert_relative_eq!(point.norm(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn bare_nuclei_fit_to_their_charges() {
        let basis = AoBasis::fill(&hydrogen_6_31g(), &h2_atoms(), None).unwrap();
        let density = DMatrix::zeros(basis.size(), basis.size());

        let mut atoms = qm_atoms();
        let fit = EspFit::new(EspFitOptions::default()).unwrap();
        let summary = fit.fit_to_density(&mut atoms, &density, &basis).unwrap();
        assert_eq!(summary.total_charge, 2.0);
        assert!(summary.rms_error.unwrap() < 1e-8);
        for atom in &atoms {
            assert_relative_eq!(atom.partial_charge, 1.0, epsilon = 1e-6);
        }

        let mulliken = EspFit::new(EspFitOptions {
            method: ChargeMethod::Mulliken,
            ..Default::default()
        })
        .unwrap();
        mulliken.fit_to_density(&mut atoms, &density, &basis).unwrap();
        assert!(atoms.iter().all(|atom| atom.partial_charge == 1.0));
    }

    #[test]
    fn neutral_symmetric_molecule_has_no_charges() {
        let mut dft = DftEngine::new(DftOptions::default(), hydrogen_6_31g()).unwrap();
        dft.prepare(&h2_atoms()).unwrap();
        let mut orbitals = Orbitals::new();
        dft.evaluate(&mut orbitals).unwrap();
        let density = orbitals.density_matrix_ground_state().unwrap();

        for method in [ChargeMethod::Chelpg, ChargeMethod::Mulliken] {
            let mut atoms = qm_atoms();
            let fit = EspFit::new(EspFitOptions {
                method,
                ..Default::default()
            })
            .unwrap();
            let summary = fit.fit_to_density(&mut atoms, &density, dft.basis().unwrap()).unwrap();
            assert_eq!(summary.total_charge, 0.0);
            assert_relative_eq!(atoms[0].partial_charge + atoms[1].partial_charge, 0.0, epsilon = 1e-8);
            assert_relative_eq!(atoms[0].partial_charge, 0.0, epsilon = 1e-2);
        }
    }
}

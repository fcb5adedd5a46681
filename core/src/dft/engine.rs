use nalgebra::{DMatrix, Vector3};

use crate::{
    atom::Atom,
    basis::{AoBasis, BasisFunction, BasisSet},
    diis::Diis,
    error::{Result, XtpError},
    grid::IntegrationGrid,
    integrals::{
        kinetic_matrix, nuclear_matrix, overlap_matrix, point_charge_matrix, DefaultIntegrator,
        ElectronTensor, PointCharge,
    },
    linalg,
    molecule::Molecule,
    orbitals::{Orbitals, QmAtom},
    units,
};

use super::{xc, DftOptions, InitialGuess};

/// Outcome of [`DftEngine::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DftSummary {
    pub converged: bool,
    pub iterations: usize,
    /// Hartree.
    pub total_energy: f64,
    pub diis_error: f64,
}

/// External potential on the nuclei and on the external grid, in Hartree per
/// unit charge.
#[derive(Debug, Clone, Default)]
struct ExternalPotential {
    nuclear: Vec<f64>,
    electron: Vec<f64>,
}

/// Everything that only depends on the geometry.
struct Setup {
    atoms: Vec<Atom>,
    basis: AoBasis,
    functions: Vec<BasisFunction>,
    overlap: DMatrix<f64>,
    core_hamiltonian: DMatrix<f64>,
    nuclear_repulsion: f64,
    electrons: usize,
    eri: ElectronTensor,
    xc_grid: Option<(IntegrationGrid, DMatrix<f64>)>,
    small_xc_grid: Option<(IntegrationGrid, DMatrix<f64>)>,
    external_grid: Option<(IntegrationGrid, DMatrix<f64>)>,
}

pub struct DftEngine {
    options: DftOptions,
    basis_set: BasisSet,
    integrator: DefaultIntegrator,
    setup: Option<Setup>,
    point_charges: Vec<PointCharge>,
    external: Option<ExternalPotential>,
}

impl DftEngine {
    pub fn new(options: DftOptions, basis_set: BasisSet) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            basis_set,
            integrator: DefaultIntegrator::default(),
            setup: None,
            point_charges: Vec::new(),
            external: None,
        })
    }

    pub fn options(&self) -> &DftOptions {
        &self.options
    }

    fn setup(&self) -> Result<&Setup> {
        self.setup
            .as_ref()
            .ok_or_else(|| XtpError::MissingData("DFT engine has not been prepared".to_string()))
    }

    /// Builds the basis, the integrals and the grids of `atoms` (Bohr).
    pub fn prepare(&mut self, atoms: &[Atom]) -> Result<()> {
        let molecule = Molecule::new(atoms.to_vec());
        let electrons = molecule.n_electrons();
        if electrons % 2 != 0 {
            return Err(XtpError::Unsupported(format!(
                "open shell systems ({electrons} electrons)"
            )));
        }

        let basis = AoBasis::fill(&self.basis_set, atoms, None)?;
        let functions = basis.basis_functions()?;
        log::info!(
            "DFT basis {} with {} functions for {} atoms and {electrons} electrons",
            basis.name(),
            basis.size(),
            atoms.len()
        );

        let overlap = overlap_matrix(&functions, &self.integrator);
        let kinetic = kinetic_matrix(&functions, &self.integrator);
        let nuclear = nuclear_matrix(&functions, atoms, &self.integrator);
        let eri = ElectronTensor::from_basis(&functions, &self.integrator);

        let grid_with_values = |quality| {
            let grid = IntegrationGrid::build(atoms, quality);
            let values = grid.ao_values(&functions);
            (grid, values)
        };
        let (xc_grid, small_xc_grid) = if self.options.functional.uses_grid() {
            let small = self
                .options
                .use_small_grid
                .then(|| grid_with_values(self.options.small_grid));
            (Some(grid_with_values(self.options.grid)), small)
        } else {
            (None, None)
        };

        self.setup = Some(Setup {
            atoms: atoms.to_vec(),
            nuclear_repulsion: molecule.nuclear_repulsion(),
            electrons,
            core_hamiltonian: kinetic + nuclear,
            overlap,
            basis,
            functions,
            eri,
            xc_grid,
            small_xc_grid,
            external_grid: None,
        });
        self.external = None;
        Ok(())
    }

    pub fn basis(&self) -> Result<&AoBasis> {
        Ok(&self.setup()?.basis)
    }

    pub fn overlap(&self) -> Result<&DMatrix<f64>> {
        Ok(&self.setup()?.overlap)
    }

    /// Points (Bohr) at which an external potential for the electrons is expected.
    pub fn external_grid_points(&mut self) -> Result<&[Vector3<f64>]> {
        let quality = self.options.external_grid;
        let setup = self
            .setup
            .as_mut()
            .ok_or_else(|| XtpError::MissingData("DFT engine has not been prepared".to_string()))?;
        if setup.external_grid.is_none() {
            let grid = IntegrationGrid::build(&setup.atoms, quality);
            let values = grid.ao_values(&setup.functions);
            setup.external_grid = Some((grid, values));
        }
        Ok(setup
            .external_grid
            .as_ref()
            .map(|(grid, _)| grid.points())
            .unwrap_or_default())
    }

    /// Classical point charges (Bohr, e) acting on electrons and nuclei.
    pub fn set_point_charges(&mut self, charges: Vec<PointCharge>) {
        self.point_charges = charges;
    }

    /// External potential (Hartree per unit charge) at the nuclei and at the
    /// points of [`DftEngine::external_grid_points`].
    pub fn set_external_potential(&mut self, nuclear: Vec<f64>, electron: Vec<f64>) -> Result<()> {
        let setup = self.setup()?;
        if nuclear.len() != setup.atoms.len() {
            return Err(XtpError::DimensionMismatch {
                context: "external potential at the nuclei",
                expected: setup.atoms.len(),
                found: nuclear.len(),
            });
        }
        let grid_points = setup.external_grid.as_ref().map_or(0, |(grid, _)| grid.len());
        if electron.len() != grid_points {
            return Err(XtpError::DimensionMismatch {
                context: "external potential on the electron grid",
                expected: grid_points,
                found: electron.len(),
            });
        }
        self.external = Some(ExternalPotential { nuclear, electron });
        Ok(())
    }

    /// Core Hamiltonian plus all external fields, and their interaction with the nuclei.
    fn external_terms(&self, setup: &Setup) -> (DMatrix<f64>, f64) {
        let mut hamiltonian = setup.core_hamiltonian.clone();
        let mut nuclear_energy = 0.0;

        if !self.point_charges.is_empty() {
            hamiltonian += point_charge_matrix(&setup.functions, &self.point_charges, &self.integrator);
            for atom in &setup.atoms {
                for charge in &self.point_charges {
                    nuclear_energy += atom.nuclear_charge() as f64 * charge.charge
                        / (charge.position - atom.position()).norm();
                }
            }
        }

        if let (Some(external), Some((grid, values))) = (&self.external, &setup.external_grid) {
            // an electron carries charge -1
            let potential = -nalgebra::DVector::from_column_slice(&external.electron);
            hamiltonian += grid.integrate_potential(values, &potential);
            nuclear_energy += setup
                .atoms
                .iter()
                .zip(&external.nuclear)
                .map(|(atom, v)| atom.nuclear_charge() as f64 * v)
                .sum::<f64>();
        }

        (hamiltonian, nuclear_energy)
    }

    fn guess(&self, setup: &Setup, hamiltonian: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let guess_hamiltonian = match self.options.guess {
            InitialGuess::Core => hamiltonian.clone(),
            InitialGuess::Huckel => linalg::symmetric_matrix(hamiltonian.nrows(), |i, j| {
                0.875 * setup.overlap[(i, j)] * (hamiltonian[(i, i)] + hamiltonian[(j, j)])
            }),
        };
        let (_, coefficients) = linalg::generalized_eigs(&guess_hamiltonian, &setup.overlap)?;
        Ok(density_from(&coefficients, setup.electrons / 2))
    }

    /// Runs the SCF and stores the result in `orbitals`. Non-convergence is
    /// reported through [`DftSummary::converged`].
    pub fn evaluate(&self, orbitals: &mut Orbitals) -> Result<DftSummary> {
        let setup = self.setup()?;
        let occupied = setup.electrons / 2;
        let n_basis = setup.basis.size();
        if occupied > n_basis {
            return Err(XtpError::Config(format!(
                "{occupied} occupied levels do not fit into {n_basis} basis functions"
            )));
        }

        let sca_hfx = self.options.functional.sca_hfx();
        let (hamiltonian, external_nuclear) = self.external_terms(setup);
        let nuclear_repulsion = setup.nuclear_repulsion + external_nuclear;

        let mut diis = Diis::new(self.options.diis.clone(), setup.overlap.clone())?;
        let mut density = self.guess(setup, &hamiltonian)?;
        let mut coefficients: Option<DMatrix<f64>> = None;
        let mut energies = nalgebra::DVector::zeros(n_basis);
        let mut previous_energy = 0.0;
        let mut summary = DftSummary {
            converged: false,
            iterations: 0,
            total_energy: 0.0,
            diis_error: f64::INFINITY,
        };

        let small_grid_iterations = if setup.small_xc_grid.is_some() {
            self.options.max_iterations
        } else {
            0
        };
        let mut on_small_grid = setup.small_xc_grid.is_some();
        // first iteration on the current grid
        let mut grid_start = 0;

        for iteration in 0..self.options.max_iterations + small_grid_iterations {
            let grid = if on_small_grid {
                setup.small_xc_grid.as_ref()
            } else {
                setup.xc_grid.as_ref()
            };

            let coulomb = setup.eri.coulomb(&density);
            let mut fock = &hamiltonian + &coulomb;
            let mut energy = (&density * (&hamiltonian + 0.5 * &coulomb)).trace();
            if sca_hfx > 0.0 {
                let exchange = setup.eri.exchange(&density);
                fock -= 0.5 * sca_hfx * &exchange;
                energy -= 0.25 * sca_hfx * (&density * &exchange).trace();
            }
            if let Some((grid, values)) = grid {
                let (exc, vxc) = xc::lda(grid, values, &density);
                fock += vxc;
                energy += exc;
            }
            energy += nuclear_repulsion;

            if self.options.level_shift > 0.0 {
                if let Some(coefficients) = &coefficients {
                    let virtuals = coefficients.columns(occupied, n_basis - occupied);
                    let projector = &setup.overlap * virtuals * virtuals.transpose() * &setup.overlap;
                    fock += self.options.level_shift * projector;
                }
            }

            let step = diis.evolve(&density, &fock, iteration - grid_start)?;
            let new_density = density_from(&step.mo_coefficients, occupied);

            density = if step.max_error > self.options.diis.adiis_start && self.options.mixing > 0.0 {
                self.options.mixing * &density + (1.0 - self.options.mixing) * new_density
            } else {
                new_density
            };

            let delta = (energy - previous_energy).abs();
            previous_energy = energy;
            log::info!(
                "SCF iteration {iteration:<4} total energy {energy:.10} Ha, dE {delta:.3e}, DIIS error {:.3e}{}",
                step.max_error,
                if step.extrapolated { " (extrapolated)" } else { "" }
            );

            energies = step.mo_energies;
            coefficients = Some(step.mo_coefficients);
            summary = DftSummary {
                converged: false,
                iterations: iteration + 1,
                total_energy: energy,
                diis_error: step.max_error,
            };

            if delta < self.options.energy_convergence && step.max_error < self.options.error_convergence {
                if on_small_grid {
                    log::info!("converged on the small grid, switching to the full grid");
                    on_small_grid = false;
                    // the history holds full grid Fock matrices only
                    diis = Diis::new(self.options.diis.clone(), setup.overlap.clone())?;
                    grid_start = iteration + 1;
                    continue;
                }
                summary.converged = true;
                break;
            }
        }

        if summary.converged {
            log::info!(
                "SCF converged after {} iterations, total energy {:.10} Ha",
                summary.iterations,
                summary.total_energy
            );
        } else {
            log::warn!(
                "SCF not converged after {} iterations, keeping the last density",
                summary.iterations
            );
        }

        let coefficients = coefficients.unwrap_or_else(|| DMatrix::zeros(n_basis, n_basis));
        if self.options.level_shift > 0.0 {
            for level in occupied..energies.len() {
                energies[level] -= self.options.level_shift;
            }
        }

        orbitals.basis_set_size = n_basis;
        orbitals.number_of_electrons = setup.electrons;
        orbitals.set_number_of_levels(occupied, n_basis - occupied);
        orbitals.mo_energies = energies;
        orbitals.mo_coefficients = coefficients;
        orbitals.qm_energy = summary.total_energy * units::HRT2EV;
        orbitals.qm_package = "xtp".to_string();
        orbitals.dft_basis = setup.basis.name().to_string();
        orbitals.sca_hfx = sca_hfx;
        orbitals.vxc = match &setup.xc_grid {
            Some((grid, values)) => xc::lda(grid, values, &orbitals.density_matrix_ground_state()?).1,
            None => DMatrix::zeros(n_basis, n_basis),
        };
        orbitals.atoms = setup
            .atoms
            .iter()
            .enumerate()
            .map(|(index, atom)| QmAtom::from_atom(index, atom))
            .collect();

        Ok(summary)
    }
}

fn density_from(coefficients: &DMatrix<f64>, occupied: usize) -> DMatrix<f64> {
    let occupied = coefficients.columns(0, occupied);
    2.0 * &occupied * occupied.transpose()
}

//! GW quasiparticle corrections and Bethe-Salpeter excitations on top of a
//! converged mean-field calculation.
mod bse;
mod ppm;
mod rpa;
mod sigma;

use std::ops::RangeInclusive;

use nalgebra::{DMatrix, DVector, Vector3};
use serde::{Deserialize, Serialize};

pub use rpa::Frequency;

use crate::{
    basis::{AoBasis, BasisFunction, BasisSet},
    error::{Result, XtpError},
    integrals::{coulomb_metric, dipole_matrices, overlap_matrix, DefaultIntegrator, ThreeCenter},
    linalg,
    orbitals::{BseType, Orbitals, Spin},
    units,
};

use self::{
    bse::{BseProblem, Excitations},
    ppm::PlasmonPoleModel,
    rpa::MoThreeCenter,
    sigma::{Correlation, QpProblem},
};

/// Spin channels the BSE is solved for.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpinChannels {
    Singlet,
    Triplet,
    #[default]
    All,
}

impl SpinChannels {
    pub fn includes(&self, spin: Spin) -> bool {
        matches!(
            (self, spin),
            (Self::All, _) | (Self::Singlet, Spin::Singlet) | (Self::Triplet, Spin::Triplet)
        )
    }
}

/// Level windows are 0-based MO indices; unset bounds are derived from the
/// HOMO of the mean-field calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GwbseOptions {
    pub rpa_min: Option<usize>,
    pub rpa_max: Option<usize>,
    pub qp_min: Option<usize>,
    pub qp_max: Option<usize>,
    pub bse_vmin: Option<usize>,
    pub bse_vmax: Option<usize>,
    pub bse_cmin: Option<usize>,
    pub bse_cmax: Option<usize>,
    /// Hartree, scissor shift applied to all unoccupied mean-field levels.
    pub shift: f64,
    /// (real, imaginary) pairs in Hartree: the static point and one imaginary
    /// frequency for the plasmon-pole fit.
    pub screening_frequencies: Vec<[f64; 2]>,
    pub qp_tolerance: f64,
    pub qp_max_iterations: usize,
    /// Number of eigenvalue self-consistent GW cycles; 1 is single shot.
    pub gw_iterations: usize,
    pub bse_type: BseType,
    pub spin: SpinChannels,
    pub excitations: usize,
    /// Number of atoms in fragment A for the charge-transfer analysis.
    pub fragment: Option<usize>,
}

impl Default for GwbseOptions {
    fn default() -> Self {
        Self {
            rpa_min: None,
            rpa_max: None,
            qp_min: None,
            qp_max: None,
            bse_vmin: None,
            bse_vmax: None,
            bse_cmin: None,
            bse_cmax: None,
            shift: 0.0,
            screening_frequencies: vec![[0.0, 0.0], [0.0, 0.5]],
            qp_tolerance: 1e-5,
            qp_max_iterations: 40,
            gw_iterations: 1,
            bse_type: BseType::default(),
            spin: SpinChannels::default(),
            excitations: 10,
            fragment: None,
        }
    }
}

impl GwbseOptions {
    /// Static frequency and the imaginary fit frequency of the plasmon-pole model.
    fn frequencies(&self) -> Result<(Frequency, f64)> {
        let [first, second] = self.screening_frequencies.as_slice() else {
            return Err(XtpError::Config(format!(
                "the plasmon-pole model needs exactly two screening frequencies, got {}",
                self.screening_frequencies.len()
            )));
        };
        let first = Frequency::from_pair(*first)?;
        let second = Frequency::from_pair(*second)?;
        match (first, second) {
            (Frequency::Imaginary(zero), Frequency::Imaginary(omega)) if zero == 0.0 && omega != 0.0 => {
                Ok((first, omega))
            }
            _ => Err(XtpError::Unsupported(format!(
                "plasmon-pole screening at {first:?} and {second:?}; expected zero and one imaginary frequency"
            ))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.frequencies()?;
        if self.qp_tolerance <= 0.0 || self.qp_max_iterations == 0 {
            return Err(XtpError::Config(
                "quasiparticle iterations need a positive tolerance and iteration count".to_string(),
            ));
        }
        if self.gw_iterations == 0 {
            return Err(XtpError::Config("at least one GW cycle is required".to_string()));
        }
        if self.excitations == 0 {
            return Err(XtpError::Config("no BSE excitations requested".to_string()));
        }
        if self.bse_type == BseType::Full && !self.spin.includes(Spin::Singlet) {
            log::warn!("full BSE only affects singlets, triplets stay in the Tamm-Dancoff approximation");
        }
        Ok(())
    }

    fn ranges(&self, orbitals: &Orbitals) -> Result<Ranges> {
        let levels = orbitals.number_of_levels();
        if orbitals.occupied_levels == 0 || orbitals.occupied_levels >= levels {
            return Err(XtpError::MissingData(format!(
                "GW needs occupied and unoccupied levels, found {} of {levels} occupied",
                orbitals.occupied_levels
            )));
        }
        let homo = orbitals.occupied_levels - 1;

        let rpa_min = self.rpa_min.unwrap_or(0);
        let rpa_max = self.rpa_max.unwrap_or(levels - 1);
        let qp_min = self.qp_min.unwrap_or(rpa_min);
        let qp_max = self.qp_max.unwrap_or((2 * homo + 1).min(rpa_max));
        let vmin = self.bse_vmin.unwrap_or(qp_min);
        let vmax = self.bse_vmax.unwrap_or(homo);
        let cmin = self.bse_cmin.unwrap_or(homo + 1);
        let cmax = self.bse_cmax.unwrap_or(qp_max);

        let ordered = |bounds: &[usize]| bounds.windows(2).all(|pair| pair[0] <= pair[1]);
        if !ordered(&[rpa_min, homo]) || !ordered(&[homo + 1, rpa_max, levels - 1]) {
            return Err(XtpError::Config(format!(
                "RPA window [{rpa_min}, {rpa_max}] must contain HOMO {homo} and LUMO within {levels} levels"
            )));
        }
        if !ordered(&[rpa_min, qp_min, qp_max, rpa_max]) {
            return Err(XtpError::Config(format!(
                "QP window [{qp_min}, {qp_max}] must lie inside the RPA window [{rpa_min}, {rpa_max}]"
            )));
        }
        if !ordered(&[rpa_min, vmin, vmax, homo]) || !ordered(&[homo + 1, cmin, cmax, rpa_max]) {
            return Err(XtpError::Config(format!(
                "BSE window [{vmin}, {vmax}] x [{cmin}, {cmax}] must split at HOMO {homo} inside the RPA window"
            )));
        }

        Ok(Ranges {
            homo,
            rpa: rpa_min..=rpa_max,
            qp: qp_min..=qp_max,
            valence: vmin..=vmax,
            conduction: cmin..=cmax,
        })
    }
}

#[derive(Debug, Clone)]
struct Ranges {
    homo: usize,
    rpa: RangeInclusive<usize>,
    qp: RangeInclusive<usize>,
    valence: RangeInclusive<usize>,
    conduction: RangeInclusive<usize>,
}

impl Ranges {
    fn occupied(&self) -> RangeInclusive<usize> {
        *self.rpa.start()..=self.homo
    }

    fn virtuals(&self) -> RangeInclusive<usize> {
        self.homo + 1..=*self.rpa.end()
    }

    fn qp_total(&self) -> usize {
        self.qp.end() + 1 - self.qp.start()
    }
}

/// Outcome of [`GwbseEngine::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GwbseSummary {
    pub qp_converged: bool,
    pub singlets: usize,
    pub triplets: usize,
}

pub struct GwbseEngine {
    options: GwbseOptions,
    auxiliary: BasisSet,
    integrator: DefaultIntegrator,
}

impl GwbseEngine {
    pub fn new(options: GwbseOptions, auxiliary: BasisSet) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            auxiliary,
            integrator: DefaultIntegrator::default(),
        })
    }

    pub fn options(&self) -> &GwbseOptions {
        &self.options
    }

    /// Runs GW and BSE for the mean-field solution in `orbitals`, expanded in
    /// `dft_basis`, and stores all results in `orbitals`.
    pub fn evaluate(&self, orbitals: &mut Orbitals, dft_basis: &AoBasis) -> Result<GwbseSummary> {
        if !orbitals.has_mo_coefficients() {
            return Err(XtpError::MissingData(
                "GW-BSE needs MO coefficients of a mean-field calculation".to_string(),
            ));
        }
        if orbitals.mo_coefficients.nrows() != dft_basis.size() {
            return Err(XtpError::DimensionMismatch {
                context: "MO coefficients vs DFT basis",
                expected: dft_basis.size(),
                found: orbitals.mo_coefficients.nrows(),
            });
        }
        let (static_frequency, imaginary_frequency) = self.options.frequencies()?;
        let ranges = self.options.ranges(orbitals)?;
        let levels = ranges.rpa.end() + 1;

        let atoms = orbitals.atoms.iter().map(|atom| atom.to_atom()).collect::<Vec<_>>();
        let auxiliary = AoBasis::fill(&self.auxiliary, &atoms, None)?;
        let aux_functions = auxiliary.basis_functions()?;
        let functions = dft_basis.basis_functions()?;
        log::info!(
            "GW-BSE with auxiliary basis {} ({} functions), RPA {:?}, QP {:?}, BSE {:?} x {:?}",
            auxiliary.name(),
            auxiliary.size(),
            ranges.rpa,
            ranges.qp,
            ranges.valence,
            ranges.conduction
        );

        let metric = coulomb_metric(&aux_functions, &self.integrator);
        let metric_inv_sqrt = linalg::inverse_sqrt(&metric, "auxiliary Coulomb metric")?;
        let aux_overlap = overlap_matrix(&aux_functions, &self.integrator);
        let aux_l = linalg::cholesky_factor(&aux_overlap, "auxiliary overlap")?;
        let aux_l_inv = aux_l.clone().try_inverse().ok_or_else(|| {
            XtpError::Numerical("Cholesky factor of the auxiliary overlap is singular".to_string())
        })?;

        let three_center = ThreeCenter::from_basis(&aux_functions, &functions, &self.integrator);
        let mo = MoThreeCenter::new(&three_center, &orbitals.mo_coefficients, &metric_inv_sqrt, levels)?;
        let transformed = mo.transformed(&aux_l);

        let dft_energies = orbitals.mo_energies.rows(0, levels).into_owned();
        let vxc = self.vxc_matrix(orbitals, &ranges)?;
        let first_qp = *ranges.qp.start();
        let sigma_x = linalg::symmetric_matrix(ranges.qp_total(), |q, p| {
            sigma::exchange(&mo, (first_qp + q, first_qp + p), ranges.homo, orbitals.sca_hfx)
        });

        let mut energies = DVector::from_fn(levels, |n, _| {
            dft_energies[n] + if n > ranges.homo { self.options.shift } else { 0.0 }
        });
        let mut cycle = 0;
        let (ppm, modes, quasiparticles) = loop {
            let epsilon_at = |frequency| {
                rpa::epsilon(
                    &transformed,
                    &aux_overlap,
                    &energies,
                    ranges.occupied(),
                    ranges.virtuals(),
                    frequency,
                )
            };
            let ppm = PlasmonPoleModel::fit(
                &epsilon_at(static_frequency),
                &epsilon_at(Frequency::Imaginary(imaginary_frequency)),
                &aux_l_inv,
                imaginary_frequency,
            )?;
            let modes = ppm.project(&transformed);
            let quasiparticles = {
                let correlation = Correlation::new(&ppm, &modes, ranges.homo, ranges.rpa.clone());
                let (sigma_x, vxc) = (sigma_x.diagonal(), vxc.diagonal());
                let problem = QpProblem {
                    correlation: &correlation,
                    window: ranges.qp.clone(),
                    dft_energies: &dft_energies,
                    sigma_x: &sigma_x,
                    vxc: &vxc,
                    tolerance: self.options.qp_tolerance,
                    max_iterations: self.options.qp_max_iterations,
                };
                problem.solve(&energies)
            };
            cycle += 1;
            if cycle >= self.options.gw_iterations {
                break (ppm, modes, quasiparticles);
            }
            log::info!(
                "GW cycle {cycle}: QP gap {:.6} eV",
                (quasiparticles.energies[ranges.homo + 1] - quasiparticles.energies[ranges.homo])
                    * units::HRT2EV
            );
            energies = quasiparticles.energies;
        };
        log_quasiparticles(&quasiparticles.table, first_qp, ranges.homo);

        let correlation = Correlation::new(&ppm, &modes, ranges.homo, ranges.rpa.clone());
        let hamiltonian = sigma::qp_hamiltonian(
            &correlation,
            ranges.qp.clone(),
            &dft_energies,
            &sigma_x,
            &vxc,
            &quasiparticles.energies,
        );
        let (qp_diag_energies, qp_diag_coefficients) = linalg::sorted_eigs(hamiltonian, "QP Hamiltonian")?;

        orbitals.rpa_min = *ranges.rpa.start();
        orbitals.rpa_max = *ranges.rpa.end();
        orbitals.qp_min = *ranges.qp.start();
        orbitals.qp_max = *ranges.qp.end();
        orbitals.set_bse_range(
            *ranges.valence.start(),
            *ranges.valence.end(),
            *ranges.conduction.start(),
            *ranges.conduction.end(),
        )?;
        orbitals.bse_type = self.options.bse_type;
        orbitals.aux_basis = auxiliary.name().to_string();
        orbitals.qp_pert_energies = quasiparticles.table;
        orbitals.qp_diag_energies = qp_diag_energies;
        orbitals.qp_diag_coefficients = qp_diag_coefficients;

        let problem = BseProblem {
            valence: ranges.valence.clone(),
            conduction: ranges.conduction.clone(),
            energies: &quasiparticles.energies,
            mo: &mo,
            ppm: &ppm,
            modes: &modes,
        };
        let count = self.options.excitations.min(problem.size());
        let overlap = overlap_matrix(&functions, &self.integrator);
        let frag = self.fragment_functions(dft_basis);

        let mut summary = GwbseSummary {
            qp_converged: quasiparticles.converged,
            singlets: 0,
            triplets: 0,
        };
        if self.options.spin.includes(Spin::Singlet) {
            let singlets = match self.options.bse_type {
                BseType::Resonant => problem.solve_resonant(Spin::Singlet, count)?,
                BseType::Full => problem.solve_full_singlet(count)?,
            };
            summary.singlets = singlets.energies.len();
            store_excitations(orbitals, Spin::Singlet, singlets);
            orbitals.transition_dipoles = self.transition_dipoles(orbitals, &functions)?;
            orbitals.singlet_fragment_dq = fragment_charges(orbitals, Spin::Singlet, &overlap, frag)?;
        }
        if self.options.spin.includes(Spin::Triplet) {
            let triplets = problem.solve_resonant(Spin::Triplet, count)?;
            summary.triplets = triplets.energies.len();
            store_excitations(orbitals, Spin::Triplet, triplets);
            orbitals.triplet_fragment_dq = fragment_charges(orbitals, Spin::Triplet, &overlap, frag)?;
        }
        log_excitations(orbitals);
        Ok(summary)
    }

    /// ⟨m|Vxc|k⟩ on the QP window.
    fn vxc_matrix(&self, orbitals: &Orbitals, ranges: &Ranges) -> Result<DMatrix<f64>> {
        let size = orbitals.mo_coefficients.nrows();
        if orbitals.vxc.shape() != (size, size) {
            return Err(XtpError::MissingData(
                "exchange-correlation matrix of the mean-field calculation".to_string(),
            ));
        }
        let window = orbitals
            .mo_coefficients
            .columns(*ranges.qp.start(), ranges.qp_total());
        Ok(window.transpose() * &orbitals.vxc * window)
    }

    /// Number of DFT basis functions on the atoms of fragment A.
    fn fragment_functions(&self, dft_basis: &AoBasis) -> usize {
        match self.options.fragment {
            Some(fragment) => dft_basis
                .function_atoms()
                .iter()
                .filter(|&&atom| atom < fragment)
                .count(),
            None => dft_basis.size(),
        }
    }

    /// Transition dipoles of all singlets relative to the centre of nuclear charge.
    fn transition_dipoles(
        &self,
        orbitals: &Orbitals,
        functions: &[BasisFunction],
    ) -> Result<Vec<Vector3<f64>>> {
        let total_charge: f64 = orbitals.atoms.iter().map(|atom| atom.nuclear_charge).sum();
        let origin = orbitals
            .atoms
            .iter()
            .fold(Vector3::zeros(), |acc, atom| acc + atom.position * atom.nuclear_charge)
            / total_charge.max(f64::EPSILON);
        log::debug!("transition dipoles about {origin:?}");

        let dipole = dipole_matrices(functions, origin, &self.integrator);
        (0..orbitals.bse_singlet_energies.len())
            .map(|state| {
                let density = orbitals.transition_density_matrix(Spin::Singlet, state)?;
                Ok(-Vector3::new(
                    density.dot(&dipole[0]),
                    density.dot(&dipole[1]),
                    density.dot(&dipole[2]),
                ))
            })
            .collect()
    }
}

fn store_excitations(orbitals: &mut Orbitals, spin: Spin, excitations: Excitations) {
    match spin {
        Spin::Singlet => {
            orbitals.bse_singlet_energies = excitations.energies;
            orbitals.bse_singlet_coefficients = excitations.resonant;
            orbitals.bse_singlet_coefficients_ar =
                excitations.anti_resonant.unwrap_or_else(|| DMatrix::zeros(0, 0));
            orbitals.eh_s = excitations.interaction;
        }
        Spin::Triplet => {
            orbitals.bse_triplet_energies = excitations.energies;
            orbitals.bse_triplet_coefficients = excitations.resonant;
            orbitals.eh_t = excitations.interaction;
        }
    }
}

/// Löwdin hole minus electron population of both fragments, per state.
fn fragment_charges(
    orbitals: &Orbitals,
    spin: Spin,
    overlap: &DMatrix<f64>,
    frag: usize,
) -> Result<Vec<[f64; 2]>> {
    (0..orbitals.bse_energies(spin).len())
        .map(|state| {
            let [hole, electron] = orbitals.density_matrix_excited_state(spin, state)?;
            let hole = Orbitals::loewdin_population(&hole, overlap, frag)?;
            let electron = Orbitals::loewdin_population(&electron, overlap, frag)?;
            Ok([hole[0] - electron[0], hole[1] - electron[1]])
        })
        .collect()
}

fn log_quasiparticles(table: &DMatrix<f64>, first: usize, homo: usize) {
    for (q, row) in table.row_iter().enumerate() {
        let level = first + q;
        let label = if level <= homo { "HOLE" } else { "LEVEL" };
        log::info!(
            "{label} {level:4} DFT {:+.4} Sx {:+.4} Sc {:+.4} Vxc {:+.4} QP {:+.4} eV",
            row[0] * units::HRT2EV,
            row[1] * units::HRT2EV,
            row[2] * units::HRT2EV,
            row[3] * units::HRT2EV,
            row[4] * units::HRT2EV
        );
    }
}

fn log_excitations(orbitals: &Orbitals) {
    let strengths = orbitals.oscillator_strengths();
    for (state, omega) in orbitals.bse_singlet_energies.iter().enumerate() {
        log::info!(
            "S = {:3} Omega = {:.4} eV f = {:.4}",
            state + 1,
            omega * units::HRT2EV,
            strengths.get(state).copied().unwrap_or_default()
        );
    }
    for (state, omega) in orbitals.bse_triplet_energies.iter().enumerate() {
        log::info!("T = {:3} Omega = {:.4} eV", state + 1, omega * units::HRT2EV);
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::DVector;

    use super::{GwbseEngine, GwbseOptions, SpinChannels};
    use crate::{
        basis::tests::{auxiliary_basis, h2_atoms, hydrogen_6_31g},
        dft::{DftEngine, DftOptions},
        error::XtpError,
        orbitals::{BseType, Orbitals, Spin},
    };

    fn hydrogen_molecule(options: GwbseOptions) -> (Orbitals, super::GwbseSummary) {
        let mut dft = DftEngine::new(DftOptions::default(), hydrogen_6_31g()).unwrap();
        dft.prepare(&h2_atoms()).unwrap();
        let mut orbitals = Orbitals::new();
        assert!(dft.evaluate(&mut orbitals).unwrap().converged);

        let gwbse = GwbseEngine::new(options, auxiliary_basis()).unwrap();
        let summary = gwbse.evaluate(&mut orbitals, dft.basis().unwrap()).unwrap();
        (orbitals, summary)
    }

    #[test]
    fn mixed_screening_frequencies_are_unsupported() {
        let options = GwbseOptions {
            screening_frequencies: vec![[0.0, 0.0], [0.3, 0.5]],
            ..Default::default()
        };
        assert!(matches!(
            GwbseEngine::new(options, auxiliary_basis()),
            Err(XtpError::Unsupported(_))
        ));

        let options = GwbseOptions {
            screening_frequencies: vec![[0.0, 0.0], [0.5, 0.0]],
            ..Default::default()
        };
        assert!(matches!(
            GwbseEngine::new(options, auxiliary_basis()),
            Err(XtpError::Unsupported(_))
        ));
        let options = GwbseOptions {
            screening_frequencies: vec![[0.0, 0.0]],
            ..Default::default()
        };
        assert!(matches!(
            GwbseEngine::new(options, auxiliary_basis()),
            Err(XtpError::Config(_))
        ));
    }

    #[test]
    fn window_defaults_follow_the_homo() {
        let mut orbitals = Orbitals::new();
        orbitals.set_number_of_levels(3, 7);
        orbitals.mo_energies = DVector::from_fn(10, |i, _| -0.5 + 0.1 * i as f64);
        let ranges = GwbseOptions::default().ranges(&orbitals).unwrap();
        assert_eq!(ranges.rpa, 0..=9);
        assert_eq!(ranges.qp, 0..=5);
        assert_eq!(ranges.valence, 0..=2);
        assert_eq!(ranges.conduction, 3..=5);

        let options = GwbseOptions {
            qp_max: Some(12),
            ..Default::default()
        };
        assert!(options.ranges(&orbitals).is_err());
        let options = GwbseOptions {
            bse_cmin: Some(2),
            ..Default::default()
        };
        assert!(options.ranges(&orbitals).is_err());
    }

    #[test]
    fn hydrogen_molecule_quasiparticles() {
        let options = GwbseOptions {
            qp_max: Some(3),
            ..Default::default()
        };
        let (orbitals, summary) = hydrogen_molecule(options);
        assert!(summary.qp_converged);

        let table = &orbitals.qp_pert_energies;
        assert_eq!(table.shape(), (4, 5));
        for row in table.row_iter() {
            assert_relative_eq!(row[4], row[0] + row[1] + row[2] - row[3], epsilon = 1e-4);
        }
        // GW opens the LDA gap
        assert!(table[(1, 4)] - table[(0, 4)] > table[(1, 0)] - table[(0, 0)]);

        assert_relative_eq!(
            orbitals.qp_diag_energies.sum(),
            table.column(4).sum(),
            epsilon = 1e-3
        );
    }

    #[test]
    fn hydrogen_molecule_excitations() {
        let options = GwbseOptions {
            qp_max: Some(3),
            fragment: Some(1),
            ..Default::default()
        };
        let (orbitals, summary) = hydrogen_molecule(options);
        assert_eq!(summary.singlets, 3);
        assert_eq!(summary.triplets, 3);
        assert_eq!(orbitals.bse_size(), 3);

        // the exchange kernel is positive semi-definite
        assert!(orbitals.bse_triplet_energies[0] <= orbitals.bse_singlet_energies[0]);
        assert!(orbitals.bse_singlet_energies[0] > 0.0);

        let strengths = orbitals.oscillator_strengths();
        assert_eq!(strengths.len(), 3);
        assert!(strengths.iter().all(|&f| f >= 0.0));
        assert!(strengths.iter().copied().fold(0.0, f64::max) > 1e-2);
        for dipole in &orbitals.transition_dipoles {
            assert!(dipole.x.abs() < 1e-8 && dipole.y.abs() < 1e-8);
        }

        for spin in [Spin::Singlet, Spin::Triplet] {
            let rows = match spin {
                Spin::Singlet => &orbitals.eh_s,
                Spin::Triplet => &orbitals.eh_t,
            };
            for (state, dq) in orbitals.fragment_dq(spin).iter().enumerate() {
                // symmetric molecule: no charge transfer between the atoms
                assert_relative_eq!(dq[0], 0.0, epsilon = 1e-6);
                assert_relative_eq!(dq[1], 0.0, epsilon = 1e-6);
                let row = rows.row(state);
                assert_relative_eq!(row.sum(), orbitals.bse_energies(spin)[state], epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn full_singlets_and_single_channel() {
        let options = GwbseOptions {
            qp_max: Some(3),
            bse_type: BseType::Full,
            spin: SpinChannels::Singlet,
            excitations: 2,
            ..Default::default()
        };
        let (orbitals, summary) = hydrogen_molecule(options);
        assert_eq!(summary.singlets, 2);
        assert_eq!(summary.triplets, 0);
        assert_eq!(orbitals.bse_singlet_coefficients_ar.ncols(), 2);
        assert!(orbitals.bse_triplet_energies.is_empty());

        // without a fragment split everything is fragment A; hole and electron
        // carry one electron each
        for dq in &orbitals.singlet_fragment_dq {
            assert_relative_eq!(dq[0], 0.0, epsilon = 1e-8);
            assert_eq!(dq[1], 0.0);
        }
        assert!(orbitals.bse_singlet_energies[0] > 0.0);
    }

    #[test]
    fn single_pair_window() {
        let options = GwbseOptions {
            qp_max: Some(1),
            fragment: Some(1),
            ..Default::default()
        };
        let (orbitals, summary) = hydrogen_molecule(options);
        assert_eq!(orbitals.bse_size(), 1);
        assert_eq!(summary.singlets, 1);
        assert_eq!(summary.triplets, 1);
        assert_eq!(orbitals.transition_dipoles.len(), 1);
        assert!(orbitals.transition_dipoles[0].z.abs() > 1e-3);
        for dq in orbitals.fragment_dq(Spin::Singlet) {
            assert_relative_eq!(dq[0], 0.0, epsilon = 1e-6);
        }
        assert!(orbitals.bse_triplet_energies[0] <= orbitals.bse_singlet_energies[0]);
    }
}

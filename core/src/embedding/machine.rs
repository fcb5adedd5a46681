//! Self-consistent QM/MM loop: the QM region is solved in the potential of a
//! polarizable environment, represented by fitted charges and fed back until
//! geometry, charges and energies settle.
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::{
    espfit::{EspFit, EspFitOptions},
    ewald::Environment,
    polarsite::{PolarSeg, PolarSite, QmInterface},
    qmmiter::QmmIter,
};
use crate::{
    dft::DftEngine,
    error::{Result, XtpError},
    gwbse::GwbseEngine,
    orbitals::{Orbitals, Spin},
    units,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QmapeConvergence {
    /// nm.
    pub dr: f64,
    /// e.
    pub dq: f64,
    /// eV.
    pub de_qm: f64,
    /// eV; `de_qm` when unset.
    pub de_mm: Option<f64>,
    pub max_iterations: usize,
}

impl Default for QmapeConvergence {
    fn default() -> Self {
        Self {
            dr: 0.01,
            dq: 0.01,
            de_qm: 0.001,
            de_mm: None,
            max_iterations: 32,
        }
    }
}

/// Outcome of the four convergence tests on the last iteration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvergenceFlags {
    pub dr: bool,
    pub dq: bool,
    pub de_qm: bool,
    pub de_mm: bool,
}

impl ConvergenceFlags {
    pub fn all(&self) -> bool {
        self.dr && self.dq && self.de_qm && self.de_mm
    }
}

impl QmapeConvergence {
    fn de_mm(&self) -> f64 {
        self.de_mm.unwrap_or(self.de_qm)
    }

    /// Compares the last iteration of `history` with the one before. Nothing
    /// has converged before the second iteration.
    pub fn check(&self, history: &[QmmIter]) -> ConvergenceFlags {
        let [.., previous, last] = history else {
            return ConvergenceFlags::default();
        };
        let de_qm = last.qm_energy - previous.qm_energy;
        let de_mm = last.mm_energy - previous.mm_energy;
        ConvergenceFlags {
            dr: last.rms_dr <= self.dr,
            dq: last.rms_dq <= self.dq,
            de_qm: de_qm * de_qm <= self.de_qm * self.de_qm,
            de_mm: de_mm * de_mm <= self.de_mm() * self.de_mm(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QmapeTasks {
    /// Polarize the environment; otherwise the QM region sits in vacuum.
    pub run_ape: bool,
    /// Solve the QM region; otherwise its charges stay as given.
    pub run_dft: bool,
    pub run_gwbse: bool,
}

impl Default for QmapeTasks {
    fn default() -> Self {
        Self {
            run_ape: true,
            run_dft: true,
            run_gwbse: false,
        }
    }
}

/// Thresholds an excited state has to exceed to be counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateFilter {
    /// Applied to singlets only.
    pub oscillator_strength: Option<f64>,
    /// |ΔQ| of the first fragment between hole and electron, e.
    pub charge_transfer: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QmapeOptions {
    pub convergence: QmapeConvergence,
    pub tasks: QmapeTasks,
    /// 1-based index among the states that pass the filter; 0 targets the ground state.
    pub state: usize,
    #[serde(rename = "type")]
    pub spin: Spin,
    pub filter: StateFilter,
    pub espfit: EspFitOptions,
}

impl Default for QmapeOptions {
    fn default() -> Self {
        Self {
            convergence: QmapeConvergence::default(),
            tasks: QmapeTasks::default(),
            state: 0,
            spin: Spin::Singlet,
            filter: StateFilter::default(),
            espfit: EspFitOptions::default(),
        }
    }
}

impl QmapeOptions {
    pub fn validate(&self) -> Result<()> {
        let convergence = &self.convergence;
        if convergence.max_iterations == 0 {
            return Err(XtpError::Config(
                "embedding needs at least one iteration".to_string(),
            ));
        }
        if [convergence.dr, convergence.dq, convergence.de_qm, convergence.de_mm()]
            .iter()
            .any(|&criterion| criterion < 0.0)
        {
            return Err(XtpError::Config(format!(
                "negative embedding convergence criterion in {convergence:?}"
            )));
        }
        if self.tasks.run_gwbse && !self.tasks.run_dft {
            return Err(XtpError::Config("run_gwbse requires run_dft".to_string()));
        }
        if self.state > 0 && !self.tasks.run_gwbse {
            return Err(XtpError::Config(format!(
                "targeting {} state {} requires run_gwbse",
                self.spin, self.state
            )));
        }
        Ok(())
    }
}

/// Index (0-based) of the `state`-th (1-based) excitation of `spin` that
/// passes `filter`.
pub fn select_state(orbitals: &Orbitals, spin: Spin, state: usize, filter: &StateFilter) -> Result<usize> {
    let mut candidates = (0..orbitals.bse_energies(spin).len()).collect::<Vec<_>>();

    if let (Some(threshold), Spin::Singlet) = (filter.oscillator_strength, spin) {
        let strengths = orbitals.oscillator_strengths();
        candidates.retain(|&i| strengths.get(i).is_some_and(|&f| f > threshold));
    }
    if let Some(threshold) = filter.charge_transfer {
        let dq = orbitals.fragment_dq(spin);
        if dq.is_empty() {
            return Err(XtpError::MissingData(format!(
                "charge transfer filter needs fragment charges of the {spin} states"
            )));
        }
        candidates.retain(|&i| dq.get(i).is_some_and(|q| q[0].abs() > threshold));
    }

    log::info!(
        "{} {spin} states pass the filter: {candidates:?}",
        candidates.len()
    );
    if candidates.is_empty() {
        return Err(XtpError::NoStatesSurviveFilter);
    }
    state
        .checked_sub(1)
        .and_then(|index| candidates.get(index).copied())
        .ok_or_else(|| {
            XtpError::Config(format!(
                "{spin} state {state} requested, only {} pass the filter",
                candidates.len()
            ))
        })
}

/// Result of [`QmapeMachine::evaluate`].
#[derive(Debug, Clone)]
pub struct QmapeOutcome {
    pub converged: bool,
    pub iterations: Vec<QmmIter>,
    /// Orbitals of the last iteration.
    pub orbitals: Orbitals,
    /// eV.
    pub qm_energy: f64,
    /// eV.
    pub mm_energy: f64,
}

/// Probe sites at the QM nuclei followed by the external grid of the DFT engine.
struct Targets {
    atoms: usize,
    background: PolarSeg,
    foreground: PolarSeg,
}

pub struct QmapeMachine<E: Environment> {
    options: QmapeOptions,
    dft: DftEngine,
    gwbse: Option<GwbseEngine>,
    espfit: EspFit,
    environment: E,
    targets: Option<Targets>,
}

impl<E: Environment> QmapeMachine<E> {
    pub fn new(
        options: QmapeOptions,
        dft: DftEngine,
        gwbse: Option<GwbseEngine>,
        environment: E,
    ) -> Result<Self> {
        options.validate()?;
        if options.tasks.run_gwbse && gwbse.is_none() {
            return Err(XtpError::Config(
                "run_gwbse is set but no GW-BSE engine was given".to_string(),
            ));
        }
        let espfit = EspFit::new(options.espfit.clone())?;
        Ok(Self {
            options,
            dft,
            gwbse,
            espfit,
            environment,
            targets: None,
        })
    }

    pub fn environment(&self) -> &E {
        &self.environment
    }

    /// Iterates until all four convergence criteria hold or the iteration
    /// limit is reached; the latter is logged and not an error.
    pub fn evaluate(&mut self) -> Result<QmapeOutcome> {
        let charge = self.environment.qm0().total_charge().round();
        if charge != 0.0 {
            return Err(XtpError::Unsupported(format!(
                "QM region with net charge {charge} e"
            )));
        }

        let convergence = self.options.convergence.clone();
        log::info!(
            "QMAPE convergence: dR {} nm, dQ {} e, dE(QM) {} eV, dE(MM) {} eV, {} iterations at most",
            convergence.dr,
            convergence.dq,
            convergence.de_qm,
            convergence.de_mm(),
            convergence.max_iterations
        );

        let mut history: Vec<QmmIter> = Vec::new();
        let mut orbitals = Orbitals::new();
        let mut converged = false;
        for index in 0..convergence.max_iterations {
            log::info!("QMAPE iteration {index}");
            let iteration = self.iterate(index, &mut orbitals)?;
            log::info!(
                "QMAPE iteration {index}: E(QM) {:.6} eV, E(MM) {:.6} eV",
                iteration.qm_energy,
                iteration.mm_energy
            );
            history.push(iteration);

            let flags = convergence.check(&history);
            log::info!(
                "convergence dR {}, dQ {}, dE(QM) {}, dE(MM) {}",
                flags.dr,
                flags.dq,
                flags.de_qm,
                flags.de_mm
            );
            if flags.all() {
                converged = true;
                log::info!("QMAPE converged after {} iterations", index + 1);
                break;
            }
        }
        if !converged {
            log::warn!(
                "QMAPE not converged after {} iterations, keeping the last state",
                convergence.max_iterations
            );
        }

        let (qm_energy, mm_energy) = history
            .last()
            .map_or((0.0, 0.0), |last| (last.qm_energy, last.mm_energy));
        Ok(QmapeOutcome {
            converged,
            iterations: history,
            orbitals,
            qm_energy,
            mm_energy,
        })
    }

    fn iterate(&mut self, index: usize, orbitals: &mut Orbitals) -> Result<QmmIter> {
        let mut iteration = QmmIter::new(index);

        if self.options.tasks.run_dft {
            let atoms = QmInterface::atoms_from_segment(self.environment.qm0())?;
            self.dft.prepare(&atoms)?;
            if self.options.tasks.run_ape {
                self.embed(atoms.len())?;
            }

            *orbitals = Orbitals::new();
            self.dft.evaluate(orbitals)?;
            let target = self.excited_state(orbitals)?;

            let density = orbitals.density_matrix_total(target)?;
            self.espfit
                .fit_to_density(&mut orbitals.atoms, &density, self.dft.basis()?)?;
            iteration.update_from_qm_atoms(&orbitals.atoms, self.environment.qm0_mut())?;
            iteration.qm_energy = match target {
                Some((spin, state)) => orbitals.total_energy(spin, state)? * units::HRT2EV,
                None => orbitals.qm_energy,
            };
        } else {
            let qm0 = self.environment.qm0();
            iteration.positions = qm0.sites.iter().map(|site| site.position).collect();
            iteration.charges = qm0.sites.iter().map(|site| site.charge).collect();
        }

        if self.options.tasks.run_ape {
            let induction = self.environment.evaluate_induction(index == 0)?;
            if !induction.converged {
                log::warn!(
                    "induction not converged after {} sweeps, RMS change {:.3e}",
                    induction.iterations,
                    induction.rms_change
                );
            }
            let split = self.environment.evaluate_energy();
            log::info!(
                "QM-MM {:+.6} eV, QM-induced {:+.6} eV, induction {:+.6} eV, MM-MM {:+.6} eV",
                split.qm_mm,
                split.qm_induced,
                split.induction,
                split.mm_mm
            );
            iteration.mm_energy = split.mm_energy();
        }
        Ok(iteration)
    }

    /// Samples the environment potential at the nuclei and on the external
    /// grid and hands it to the DFT engine.
    fn embed(&mut self, atoms: usize) -> Result<()> {
        let grid = self
            .dft
            .external_grid_points()?
            .iter()
            .map(|point| point * units::BOHR2NM)
            .collect::<Vec<Vector3<f64>>>();

        if self.targets.is_none() {
            let qm0 = self.environment.qm0();
            let probes = qm0
                .sites
                .iter()
                .map(|site| PolarSite::probe(site.position))
                .chain(grid.iter().copied().map(PolarSite::probe))
                .collect::<Vec<_>>();
            log::debug!(
                "potential targets: {} nuclei and {} grid points",
                atoms,
                grid.len()
            );
            let mut background = PolarSeg::new(qm0.id, probes.clone());
            let foreground = PolarSeg::new(qm0.id, probes);

            self.environment.evaluate_induction(true)?;
            self.environment.evaluate_potential(&mut background, true, false);
            self.targets = Some(Targets {
                atoms,
                background,
                foreground,
            });
        }
        let Some(targets) = self.targets.as_mut() else {
            return Err(XtpError::MissingData("potential targets".to_string()));
        };
        if targets.atoms != atoms || targets.foreground.len() != atoms + grid.len() {
            return Err(XtpError::DimensionMismatch {
                context: "embedding potential targets",
                expected: targets.foreground.len(),
                found: atoms + grid.len(),
            });
        }
        self.environment
            .evaluate_potential(&mut targets.foreground, false, true);

        let potential = targets
            .background
            .sites
            .iter()
            .zip(&targets.foreground.sites)
            .map(|(bg, fg)| (bg.phi + fg.phi) * units::INT2V * units::EV2HRT)
            .collect::<Vec<_>>();
        let (nuclear, electron) = potential.split_at(atoms);
        self.dft
            .set_external_potential(nuclear.to_vec(), electron.to_vec())
    }

    fn excited_state(&self, orbitals: &mut Orbitals) -> Result<Option<(Spin, usize)>> {
        let Some(gwbse) = self.gwbse.as_ref().filter(|_| self.options.tasks.run_gwbse) else {
            return Ok(None);
        };
        gwbse.evaluate(orbitals, self.dft.basis()?)?;
        if self.options.state == 0 {
            return Ok(None);
        }
        let spin = self.options.spin;
        let state = select_state(orbitals, spin, self.options.state, &self.options.filter)?;
        log::info!(
            "targeting {spin} state {} (excitation {state}), {:.6} eV",
            self.options.state,
            orbitals.bse_energies(spin)[state] * units::HRT2EV
        );
        Ok(Some((spin, state)))
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{DVector, Vector3};

    use super::{select_state, QmapeConvergence, QmapeMachine, QmapeOptions, StateFilter};
    use crate::{
        basis::tests::{h2_atoms, hydrogen_6_31g},
        dft::{DftEngine, DftOptions},
        embedding::{
            espfit::{ChargeMethod, EspFitOptions},
            ewald::{Environment, EwaldEnvironment, EwaldOptions},
            polarsite::{PolarSeg, PolarSite, PolarTopology},
            qmmiter::QmmIter,
        },
        error::XtpError,
        orbitals::{Orbitals, Spin},
        units,
    };

    fn iteration(rms_dr: f64, rms_dq: f64, qm_energy: f64, mm_energy: f64) -> QmmIter {
        QmmIter {
            rms_dr,
            rms_dq,
            qm_energy,
            mm_energy,
            ..Default::default()
        }
    }

    #[test]
    fn all_four_criteria_must_hold() {
        let criteria = QmapeConvergence::default();
        let first = iteration(0.0, 0.0, -10.0, 1.0);
        assert!(!criteria.check(&[first.clone()]).all());

        let settled = iteration(0.005, 0.005, -10.0005, 1.0005);
        assert!(criteria.check(&[first.clone(), settled]).all());

        let moved_charge = iteration(0.005, 0.02, -10.0005, 1.0005);
        let flags = criteria.check(&[first.clone(), moved_charge]);
        assert!(flags.dr && !flags.dq && flags.de_qm && flags.de_mm);
        assert!(!flags.all());

        let mm_changed = iteration(0.005, 0.005, -10.0005, 0.9);
        let flags = criteria.check(&[first, mm_changed]);
        assert!(!flags.de_mm && !flags.all());
    }

    fn excited_orbitals() -> Orbitals {
        let mut orbitals = Orbitals::new();
        orbitals.bse_singlet_energies = DVector::from_vec(vec![0.2, 0.25, 0.3, 0.35]);
        orbitals.transition_dipoles = vec![
            Vector3::new(0.0, 0.0, 0.01),
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(0.8, 0.0, 0.0),
        ];
        orbitals.singlet_fragment_dq = vec![[0.0, 0.0], [0.05, -0.05], [0.9, -0.9], [0.6, -0.6]];
        orbitals.bse_triplet_energies = DVector::from_vec(vec![0.1, 0.15]);
        orbitals.triplet_fragment_dq = vec![[0.02, -0.02], [0.7, -0.7]];
        orbitals
    }

    #[test]
    fn states_are_counted_among_those_passing_the_filter() {
        let orbitals = excited_orbitals();
        let none = StateFilter::default();
        assert_eq!(select_state(&orbitals, Spin::Singlet, 2, &none).unwrap(), 1);

        let bright = StateFilter {
            oscillator_strength: Some(0.01),
            charge_transfer: None,
        };
        assert_eq!(select_state(&orbitals, Spin::Singlet, 1, &bright).unwrap(), 1);
        assert_eq!(select_state(&orbitals, Spin::Singlet, 2, &bright).unwrap(), 3);
        assert!(matches!(
            select_state(&orbitals, Spin::Singlet, 3, &bright),
            Err(XtpError::Config(_))
        ));

        let bright_ct = StateFilter {
            oscillator_strength: Some(0.01),
            charge_transfer: Some(0.5),
        };
        assert_eq!(select_state(&orbitals, Spin::Singlet, 1, &bright_ct).unwrap(), 3);

        // the oscillator strength filter does not apply to triplets
        assert_eq!(select_state(&orbitals, Spin::Triplet, 1, &bright_ct).unwrap(), 1);

        let impossible = StateFilter {
            oscillator_strength: None,
            charge_transfer: Some(1.0),
        };
        assert!(matches!(
            select_state(&orbitals, Spin::Singlet, 1, &impossible),
            Err(XtpError::NoStatesSurviveFilter)
        ));
    }

    fn h2_topology(background_charge: f64) -> PolarTopology {
        let qm0 = PolarSeg::new(
            0,
            h2_atoms()
                .iter()
                .map(|atom| PolarSite::new("H", atom.position() * units::BOHR2NM, 0.0))
                .collect(),
        );
        PolarTopology {
            qm0,
            foreground: vec![PolarSeg::new(
                1,
                vec![PolarSite::new("", Vector3::new(0.0, 0.4, 0.0), 0.0).with_polarizability(1e-3)],
            )],
            background: vec![PolarSeg::new(
                2,
                vec![PolarSite::new("", Vector3::new(0.0, 0.0, -0.4), background_charge)],
            )],
        }
    }

    fn machine(topology: PolarTopology, options: QmapeOptions) -> QmapeMachine<EwaldEnvironment> {
        let dft = DftEngine::new(DftOptions::default(), hydrogen_6_31g()).unwrap();
        let environment = EwaldEnvironment::new(EwaldOptions::default(), topology).unwrap();
        QmapeMachine::new(options, dft, None, environment).unwrap()
    }

    #[test]
    fn charged_qm_region_is_rejected() {
        let mut topology = h2_topology(1.0);
        topology.qm0.sites[0].charge = 1.0;
        let mut machine = machine(topology, QmapeOptions::default());
        assert!(matches!(machine.evaluate(), Err(XtpError::Unsupported(_))));
    }

    #[test]
    fn hydrogen_polarizes_towards_a_positive_charge() {
        let options = QmapeOptions {
            espfit: EspFitOptions {
                method: ChargeMethod::Mulliken,
                ..Default::default()
            },
            convergence: QmapeConvergence {
                max_iterations: 6,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut machine = machine(h2_topology(1.0), options);
        let outcome = machine.evaluate().unwrap();

        assert!(outcome.iterations.len() >= 2);
        let charges = &outcome.iterations.last().unwrap().charges;
        assert!(charges[0] < -1e-3);
        assert!((charges[0] + charges[1]).abs() < 1e-6);
        assert_eq!(
            machine.environment().qm0().sites[0].charge,
            outcome.orbitals.atoms[0].partial_charge
        );
        if outcome.converged {
            let [.., previous, last] = outcome.iterations.as_slice() else {
                unreachable!()
            };
            assert!((last.qm_energy - previous.qm_energy).abs() <= 0.001);
        }
    }
}

//! Classical electrostatics of the environment: periodic background charges,
//! polarizable foreground sites and the QM region as point charges.
use std::f64::consts::PI;

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use super::polarsite::{PolarSeg, PolarSite, PolarTopology};
use crate::{
    error::{Result, XtpError},
    units,
};

/// Contributions closer than this (nm) are treated as the site itself.
const SELF_DISTANCE: f64 = 1e-9;

/// The classical part of a QM/MM calculation as seen by the embedding machine.
pub trait Environment {
    /// Solves the induced dipoles of the polarizable sites in the field of all
    /// permanent charges. `reset` restarts from zero dipoles.
    fn evaluate_induction(&mut self, reset: bool) -> Result<InductionSummary>;

    /// Sets φ (e/nm) of every site of `target` to the potential of the background
    /// and/or the foreground, including induced dipoles.
    fn evaluate_potential(&self, target: &mut PolarSeg, background: bool, foreground: bool);

    fn evaluate_energy(&self) -> EnergySplit;

    fn qm0(&self) -> &PolarSeg;

    fn qm0_mut(&mut self) -> &mut PolarSeg;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InductionSummary {
    pub converged: bool,
    pub iterations: usize,
    /// RMS change of the induced dipoles in the last sweep, e·nm.
    pub rms_change: f64,
}

/// Interaction energies in eV.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnergySplit {
    /// QM charges with the permanent charges of the environment.
    pub qm_mm: f64,
    /// QM charges with the induced dipoles.
    pub qm_induced: f64,
    /// Polarisation energy −½ Σ μ·E of the induced dipoles in the field of the
    /// permanent environment charges.
    pub induction: f64,
    /// Permanent foreground charges with each other and with the background.
    pub mm_mm: f64,
}

impl EnergySplit {
    /// Energy of the classical subsystem; QM-MM interactions are part of the QM energy.
    pub fn mm_energy(&self) -> f64 {
        self.induction + self.mm_mm
    }

    pub fn total(&self) -> f64 {
        self.qm_mm + self.qm_induced + self.mm_energy()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EwaldOptions {
    /// Orthorhombic cell edges in nm; open boundaries when absent.
    pub cell: Option<[f64; 3]>,
    /// Ewald splitting parameter, nm⁻¹.
    pub alpha: f64,
    /// Real-space cutoff, nm.
    pub real_cutoff: f64,
    /// Reciprocal vectors up to this index along each axis.
    pub reciprocal_cutoff: i32,
    pub thole_a: f64,
    /// Successive over-relaxation parameter of the induction.
    pub sor_omega: f64,
    /// RMS change of the induced dipoles in one sweep relative to their RMS size.
    pub induction_tolerance: f64,
    pub induction_max_iterations: usize,
}

impl Default for EwaldOptions {
    fn default() -> Self {
        Self {
            cell: None,
            alpha: 3.0,
            real_cutoff: 1.2,
            reciprocal_cutoff: 6,
            thole_a: 0.39,
            sor_omega: 0.75,
            induction_tolerance: 1e-5,
            induction_max_iterations: 512,
        }
    }
}

impl EwaldOptions {
    pub fn validate(&self) -> Result<()> {
        if let Some(cell) = self.cell {
            if cell.iter().any(|&edge| edge <= 0.0) {
                return Err(XtpError::Config(format!("invalid periodic cell {cell:?}")));
            }
            if self.alpha <= 0.0 || self.real_cutoff <= 0.0 || self.reciprocal_cutoff < 1 {
                return Err(XtpError::Config(
                    "Ewald summation needs positive alpha and cutoffs".to_string(),
                ));
            }
        }
        if !(0.0..2.0).contains(&self.sor_omega) || self.sor_omega == 0.0 {
            return Err(XtpError::Config(format!(
                "SOR parameter must lie in (0, 2), got {}",
                self.sor_omega
            )));
        }
        if self.thole_a < 0.0 || self.induction_tolerance <= 0.0 || self.induction_max_iterations == 0 {
            return Err(XtpError::Config("invalid induction parameters".to_string()));
        }
        Ok(())
    }
}

/// Potential and field of periodic point charges.
#[derive(Debug, Clone)]
struct EwaldSum {
    cell: Vector3<f64>,
    alpha: f64,
    cutoff: f64,
    images: Vector3<i32>,
    /// k and 4π/(V k²) exp(−k²/4α²).
    reciprocal: Vec<(Vector3<f64>, f64)>,
    volume: f64,
}

impl EwaldSum {
    fn new(cell: [f64; 3], options: &EwaldOptions) -> Self {
        let cell = Vector3::from(cell);
        let volume = cell.x * cell.y * cell.z;
        let alpha = options.alpha;
        let images = cell.map(|edge| (options.real_cutoff / edge + 0.5).ceil() as i32);

        let k_max = options.reciprocal_cutoff;
        let mut reciprocal = Vec::new();
        for nx in -k_max..=k_max {
            for ny in -k_max..=k_max {
                for nz in -k_max..=k_max {
                    if nx == 0 && ny == 0 && nz == 0 {
                        continue;
                    }
                    let k = 2.0
                        * PI
                        * Vector3::new(nx as f64 / cell.x, ny as f64 / cell.y, nz as f64 / cell.z);
                    let k2 = k.norm_squared();
                    let factor = 4.0 * PI / (volume * k2) * (-k2 / (4.0 * alpha * alpha)).exp();
                    reciprocal.push((k, factor));
                }
            }
        }
        log::debug!(
            "Ewald sum: alpha {alpha} nm^-1, {} reciprocal vectors, images {:?}",
            reciprocal.len(),
            images
        );

        Self {
            cell,
            alpha,
            cutoff: options.real_cutoff,
            images,
            reciprocal,
            volume,
        }
    }

    /// φ and E at `target` of all `sources`, excluding a source located at the target.
    fn potential_and_field<'a>(
        &self,
        target: &Vector3<f64>,
        sources: impl Iterator<Item = &'a PolarSite> + Clone,
    ) -> (f64, Vector3<f64>) {
        let mut phi = 0.0;
        let mut field = Vector3::zeros();
        let mut total_charge = 0.0;
        let alpha = self.alpha;

        for source in sources.clone() {
            total_charge += source.charge;
            let delta = target - source.position;
            let delta = delta - self.cell.component_mul(&delta.component_div(&self.cell).map(f64::round));
            for nx in -self.images.x..=self.images.x {
                for ny in -self.images.y..=self.images.y {
                    for nz in -self.images.z..=self.images.z {
                        let shift = Vector3::new(
                            nx as f64 * self.cell.x,
                            ny as f64 * self.cell.y,
                            nz as f64 * self.cell.z,
                        );
                        let r_vec = delta - shift;
                        let r = r_vec.norm();
                        if r < SELF_DISTANCE {
                            phi -= 2.0 * alpha / PI.sqrt() * source.charge;
                            continue;
                        }
                        if r > self.cutoff {
                            continue;
                        }
                        let screened = libm::erfc(alpha * r);
                        phi += source.charge * screened / r;
                        field += r_vec
                            * (source.charge
                                * (screened / r.powi(3)
                                    + 2.0 * alpha / PI.sqrt() * (-(alpha * r).powi(2)).exp()
                                        / (r * r)));
                    }
                }
            }
        }

        for (k, factor) in &self.reciprocal {
            let (mut cosine, mut sine) = (0.0, 0.0);
            for source in sources.clone() {
                let phase = k.dot(&(target - source.position));
                cosine += source.charge * phase.cos();
                sine += source.charge * phase.sin();
            }
            phi += factor * cosine;
            field += k * (factor * sine);
        }

        // neutralising background of a charged cell
        phi -= PI * total_charge / (self.volume * alpha * alpha);
        (phi, field)
    }
}

/// Thole-damped interactions between two sites with polarisabilities.
fn thole_factors(r: f64, a: f64, first: &PolarSite, second: &PolarSite) -> (f64, f64) {
    let product = first.polarizability * second.polarizability;
    if a == 0.0 || product <= 0.0 {
        return (1.0, 1.0);
    }
    let u = r / product.powf(1.0 / 6.0);
    let damping = (-a * u.powi(3)).exp();
    let lambda3 = 1.0 - damping;
    let lambda5 = 1.0 - (1.0 + a * u.powi(3)) * damping;
    (lambda3, lambda5)
}

/// Index of a site in the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SiteRef {
    segment: usize,
    site: usize,
}

/// Background charges with optional periodicity, Thole-damped polarizable
/// foreground and the QM region.
#[derive(Debug, Clone)]
pub struct EwaldEnvironment {
    options: EwaldOptions,
    background: Vec<PolarSeg>,
    foreground: Vec<PolarSeg>,
    qm0: PolarSeg,
    ewald: Option<EwaldSum>,
    polarizable: Vec<SiteRef>,
}

impl EwaldEnvironment {
    pub fn new(options: EwaldOptions, topology: PolarTopology) -> Result<Self> {
        options.validate()?;
        let ewald = options.cell.map(|cell| EwaldSum::new(cell, &options));
        let polarizable = topology
            .foreground
            .iter()
            .enumerate()
            .flat_map(|(segment, seg)| {
                seg.sites
                    .iter()
                    .enumerate()
                    .filter(|(_, site)| site.is_polarizable())
                    .map(move |(site, _)| SiteRef { segment, site })
            })
            .collect::<Vec<_>>();
        log::info!(
            "environment: {} QM sites, {} foreground segments ({} polarizable sites), {} background segments, {}",
            topology.qm0.len(),
            topology.foreground.len(),
            polarizable.len(),
            topology.background.len(),
            if ewald.is_some() { "periodic" } else { "open boundaries" }
        );
        Ok(Self {
            options,
            background: topology.background,
            foreground: topology.foreground,
            qm0: topology.qm0,
            ewald,
            polarizable,
        })
    }

    fn site(&self, reference: SiteRef) -> &PolarSite {
        &self.foreground[reference.segment].sites[reference.site]
    }

    fn background_sites(&self) -> impl Iterator<Item = &PolarSite> + Clone {
        self.background.iter().flat_map(|seg| seg.sites.iter())
    }

    /// φ and E of the background charges at `target`.
    fn background_potential(&self, target: &Vector3<f64>) -> (f64, Vector3<f64>) {
        match &self.ewald {
            Some(ewald) => ewald.potential_and_field(target, self.background_sites()),
            None => self.background_sites().fold(
                (0.0, Vector3::zeros()),
                |(phi, field), source| {
                    let (p, f) = coulomb(target, source);
                    (phi + p, field + f)
                },
            ),
        }
    }

    /// Field of all permanent charges at a foreground site, excluding its own segment.
    fn permanent_field(&self, reference: SiteRef) -> Vector3<f64> {
        let target = self.site(reference);
        let mut field = self.background_potential(&target.position).1;

        for (segment, seg) in self.foreground.iter().enumerate() {
            if segment == reference.segment {
                continue;
            }
            for source in &seg.sites {
                let r_vec = target.position - source.position;
                let r = r_vec.norm();
                if r < SELF_DISTANCE {
                    continue;
                }
                let (lambda3, _) = thole_factors(r, self.options.thole_a, target, source);
                field += r_vec * (lambda3 * source.charge / r.powi(3));
            }
        }
        for source in &self.qm0.sites {
            field += coulomb(&target.position, source).1;
        }
        field
    }

    /// Damped dipole field tensor between two foreground sites.
    fn dipole_tensor(&self, target: &PolarSite, source: &PolarSite) -> Matrix3<f64> {
        let r_vec = target.position - source.position;
        let r = r_vec.norm();
        if r < SELF_DISTANCE {
            return Matrix3::zeros();
        }
        let (lambda3, lambda5) = thole_factors(r, self.options.thole_a, target, source);
        r_vec * r_vec.transpose() * (3.0 * lambda5 / r.powi(5)) - Matrix3::identity() * (lambda3 / r.powi(3))
    }

    pub fn foreground(&self) -> &[PolarSeg] {
        &self.foreground
    }

    pub fn background(&self) -> &[PolarSeg] {
        &self.background
    }

    /// Logs the composition of the energy.
    pub fn show_energy_splitting(&self) {
        let split = self.evaluate_energy();
        log::info!(
            "QM-MM {:+.6} eV, QM-induced {:+.6} eV, induction {:+.6} eV, MM-MM {:+.6} eV, total {:+.6} eV",
            split.qm_mm,
            split.qm_induced,
            split.induction,
            split.mm_mm,
            split.total()
        );
    }
}

/// Undamped φ and E of a point charge.
fn coulomb(target: &Vector3<f64>, source: &PolarSite) -> (f64, Vector3<f64>) {
    let r_vec = target - source.position;
    let r = r_vec.norm();
    if r < SELF_DISTANCE {
        return (0.0, Vector3::zeros());
    }
    (source.charge / r, r_vec * (source.charge / r.powi(3)))
}

/// Potential of a point dipole.
fn dipole_potential(target: &Vector3<f64>, source: &PolarSite) -> f64 {
    let r_vec = target - source.position;
    let r = r_vec.norm();
    if r < SELF_DISTANCE {
        return 0.0;
    }
    source.induced_dipole.dot(&r_vec) / r.powi(3)
}

impl Environment for EwaldEnvironment {
    fn evaluate_induction(&mut self, reset: bool) -> Result<InductionSummary> {
        if reset {
            for seg in &mut self.foreground {
                for site in &mut seg.sites {
                    site.induced_dipole = Vector3::zeros();
                }
            }
        }
        if self.polarizable.is_empty() {
            return Ok(InductionSummary {
                converged: true,
                iterations: 0,
                rms_change: 0.0,
            });
        }

        let permanent = self
            .polarizable
            .iter()
            .map(|&reference| self.permanent_field(reference))
            .collect::<Vec<_>>();
        let tensors = self
            .polarizable
            .iter()
            .map(|&i| {
                self.polarizable
                    .iter()
                    .map(|&j| {
                        if i.segment == j.segment {
                            Matrix3::zeros()
                        } else {
                            self.dipole_tensor(self.site(i), self.site(j))
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        let omega = self.options.sor_omega;
        let mut dipoles = self
            .polarizable
            .iter()
            .map(|&reference| self.site(reference).induced_dipole)
            .collect::<Vec<_>>();
        let mut summary = InductionSummary {
            converged: false,
            iterations: 0,
            rms_change: f64::INFINITY,
        };
        for iteration in 1..=self.options.induction_max_iterations {
            let mut change = 0.0;
            for (i, &reference) in self.polarizable.iter().enumerate() {
                let field = tensors[i]
                    .iter()
                    .zip(&dipoles)
                    .fold(permanent[i], |acc, (tensor, dipole)| acc + tensor * dipole);
                let updated = field * self.site(reference).polarizability;
                let next = dipoles[i] * (1.0 - omega) + updated * omega;
                change += (next - dipoles[i]).norm_squared();
                dipoles[i] = next;
            }
            summary.iterations = iteration;
            summary.rms_change = (change / dipoles.len() as f64).sqrt();
            let size = (dipoles.iter().map(|d| d.norm_squared()).sum::<f64>() / dipoles.len() as f64).sqrt();
            if summary.rms_change <= self.options.induction_tolerance * size {
                summary.converged = true;
                break;
            }
        }
        if !summary.converged {
            log::warn!(
                "induction not converged after {} iterations (rms change {:e} e nm)",
                summary.iterations,
                summary.rms_change
            );
        } else {
            log::debug!("induction converged in {} iterations", summary.iterations);
        }

        for (&reference, dipole) in self.polarizable.iter().zip(dipoles) {
            self.foreground[reference.segment].sites[reference.site].induced_dipole = dipole;
        }
        Ok(summary)
    }

    fn evaluate_potential(&self, target: &mut PolarSeg, background: bool, foreground: bool) {
        for site in &mut target.sites {
            let mut phi = 0.0;
            if background {
                phi += self.background_potential(&site.position).0;
            }
            if foreground {
                for source in self.foreground.iter().flat_map(|seg| seg.sites.iter()) {
                    phi += coulomb(&site.position, source).0 + dipole_potential(&site.position, source);
                }
            }
            site.phi = phi;
        }
    }

    fn evaluate_energy(&self) -> EnergySplit {
        let mut split = EnergySplit::default();

        for site in &self.qm0.sites {
            let mut permanent = self.background_potential(&site.position).0;
            let mut induced = 0.0;
            for source in self.foreground.iter().flat_map(|seg| seg.sites.iter()) {
                permanent += coulomb(&site.position, source).0;
                induced += dipole_potential(&site.position, source);
            }
            split.qm_mm += site.charge * permanent;
            split.qm_induced += site.charge * induced;
        }

        for &reference in &self.polarizable {
            let site = self.site(reference);
            split.induction -= 0.5 * site.induced_dipole.dot(&self.permanent_field(reference));
        }
        // QM charges are accounted for in the QM energy
        for site in &self.qm0.sites {
            for &reference in &self.polarizable {
                let source = self.site(reference);
                let field = coulomb(&source.position, site).1;
                split.induction += 0.5 * source.induced_dipole.dot(&field);
            }
        }

        for (segment, seg) in self.foreground.iter().enumerate() {
            for site in &seg.sites {
                split.mm_mm += site.charge * self.background_potential(&site.position).0;
                for other in self.foreground.iter().skip(segment + 1) {
                    for source in &other.sites {
                        split.mm_mm += site.charge * coulomb(&site.position, source).0;
                    }
                }
            }
        }

        split.qm_mm *= units::INT2EV;
        split.qm_induced *= units::INT2EV;
        split.induction *= units::INT2EV;
        split.mm_mm *= units::INT2EV;
        split
    }

    fn qm0(&self) -> &PolarSeg {
        &self.qm0
    }

    fn qm0_mut(&mut self) -> &mut PolarSeg {
        &mut self.qm0
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    use super::{Environment, EwaldEnvironment, EwaldOptions};
    use crate::{
        embedding::polarsite::{PolarSeg, PolarSite, PolarTopology},
        units,
    };

    fn topology(foreground: Vec<PolarSeg>, background: Vec<PolarSeg>) -> PolarTopology {
        PolarTopology {
            qm0: PolarSeg::new(0, vec![PolarSite::new("H", Vector3::zeros(), 0.5)]),
            foreground,
            background,
        }
    }

    #[test]
    fn open_boundary_potential_of_a_charge() {
        let background = PolarSeg::new(1, vec![PolarSite::new("", Vector3::new(0.0, 0.0, 2.0), -1.0)]);
        let environment = EwaldEnvironment::new(EwaldOptions::default(), topology(vec![], vec![background])).unwrap();

        let mut target = PolarSeg::new(0, vec![PolarSite::probe(Vector3::new(0.0, 0.0, 1.0))]);
        environment.evaluate_potential(&mut target, true, false);
        assert_relative_eq!(target.sites[0].phi, -1.0, epsilon = 1e-12);
        environment.evaluate_potential(&mut target, false, true);
        assert_eq!(target.sites[0].phi, 0.0);

        let energy = environment.evaluate_energy();
        assert_relative_eq!(energy.qm_mm, 0.5 * -0.5 * units::INT2EV, epsilon = 1e-12);
        assert_eq!(energy.mm_energy(), 0.0);
    }

    #[test]
    fn single_polarizable_site_in_a_uniform_charge_field() {
        // a unit charge 1 nm away polarizes a site of 1e-3 nm^3
        let foreground = PolarSeg::new(
            1,
            vec![PolarSite::new("", Vector3::new(1.0, 0.0, 0.0), 0.0).with_polarizability(1e-3)],
        );
        let mut topology = topology(vec![foreground], vec![]);
        topology.qm0.sites[0].charge = 1.0;
        let mut environment = EwaldEnvironment::new(EwaldOptions::default(), topology).unwrap();

        let summary = environment.evaluate_induction(true).unwrap();
        assert!(summary.converged);
        let dipole = environment.foreground()[0].sites[0].induced_dipole;
        assert_relative_eq!(dipole, Vector3::new(1e-3, 0.0, 0.0), epsilon = 1e-8);

        // the dipole points away from the charge and lowers the potential there
        let mut probe = PolarSeg::new(0, vec![PolarSite::probe(Vector3::zeros())]);
        environment.evaluate_potential(&mut probe, false, true);
        assert_relative_eq!(probe.sites[0].phi, -1e-3, epsilon = 1e-8);

        let energy = environment.evaluate_energy();
        assert_relative_eq!(energy.qm_induced, -1e-3 * units::INT2EV, epsilon = 1e-8);
        // QM-driven polarisation is not counted as MM energy
        assert_relative_eq!(energy.induction, 0.0, epsilon = 1e-10);
    }

    #[test]
    fn induction_converges_relative_to_dipole_size() {
        for polarizability in [1e-6, 1e-3, 1e-1] {
            let foreground = PolarSeg::new(
                1,
                vec![PolarSite::new("", Vector3::new(1.0, 0.0, 0.0), 0.0).with_polarizability(polarizability)],
            );
            let mut topology = topology(vec![foreground], vec![]);
            topology.qm0.sites[0].charge = 1.0;
            let mut environment = EwaldEnvironment::new(EwaldOptions::default(), topology).unwrap();

            let summary = environment.evaluate_induction(true).unwrap();
            assert!(summary.converged);
            let dipole = environment.foreground()[0].sites[0].induced_dipole;
            assert_relative_eq!(dipole.x, polarizability, max_relative = 1e-5);
        }

        // no field at all converges at once
        let foreground = PolarSeg::new(
            1,
            vec![PolarSite::new("", Vector3::new(1.0, 0.0, 0.0), 0.0).with_polarizability(1e-3)],
        );
        let mut topology = topology(vec![foreground], vec![]);
        topology.qm0.sites[0].charge = 0.0;
        let mut environment = EwaldEnvironment::new(EwaldOptions::default(), topology).unwrap();
        let summary = environment.evaluate_induction(true).unwrap();
        assert!(summary.converged);
        assert_eq!(summary.iterations, 1);
    }

    #[test]
    fn thole_damping_limits_mutual_polarisation() {
        let site = |x: f64| PolarSite::new("", Vector3::new(x, 0.0, 0.0), 0.0).with_polarizability(1e-3);
        let pair = |a: f64| {
            let foreground = vec![PolarSeg::new(1, vec![site(0.3)]), PolarSeg::new(2, vec![site(0.5)])];
            let options = EwaldOptions {
                thole_a: a,
                induction_tolerance: 1e-12,
                ..Default::default()
            };
            let mut topology = topology(foreground, vec![]);
            topology.qm0.sites[0].charge = 1.0;
            let mut environment = EwaldEnvironment::new(options, topology).unwrap();
            assert!(environment.evaluate_induction(true).unwrap().converged);
            environment.foreground()[0].sites[0].induced_dipole.x
        };
        let damped = pair(0.39);
        let undamped = pair(0.0);
        // collinear dipoles enhance each other, damping weakens that
        assert!(undamped > damped);
        assert!(damped > 1e-3 / 0.09);
    }

    #[test]
    fn ewald_potential_is_periodic() {
        let background = PolarSeg::new(
            1,
            vec![
                PolarSite::new("", Vector3::new(0.5, 0.5, 0.5), 1.0),
                PolarSite::new("", Vector3::new(1.5, 1.5, 1.5), -1.0),
            ],
        );
        let options = EwaldOptions {
            cell: Some([2.0, 2.0, 2.0]),
            ..Default::default()
        };
        let environment = EwaldEnvironment::new(options, topology(vec![], vec![background])).unwrap();
        let mut targets = PolarSeg::new(
            0,
            vec![
                PolarSite::probe(Vector3::new(0.2, 0.9, 1.1)),
                PolarSite::probe(Vector3::new(2.2, 0.9, -0.9)),
                PolarSite::probe(Vector3::new(1.0, 1.0, 1.0)),
            ],
        );
        environment.evaluate_potential(&mut targets, true, false);
        assert_relative_eq!(targets.sites[0].phi, targets.sites[1].phi, epsilon = 1e-6);
        // midpoint between opposite charges of a symmetric lattice
        assert_relative_eq!(targets.sites[2].phi, 0.0, epsilon = 1e-6);

        assert!(EwaldEnvironment::new(
            EwaldOptions {
                cell: Some([0.0, 1.0, 1.0]),
                ..Default::default()
            },
            topology(vec![], vec![])
        )
        .is_err());
    }
}

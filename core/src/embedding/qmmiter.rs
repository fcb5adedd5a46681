use nalgebra::Vector3;

use super::polarsite::PolarSeg;
use crate::{
    error::{Result, XtpError},
    orbitals::QmAtom,
    units,
};

/// State of the QM region after one embedding iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QmmIter {
    pub index: usize,
    /// nm.
    pub positions: Vec<Vector3<f64>>,
    /// e.
    pub charges: Vec<f64>,
    /// RMS displacement against the previous QM0 state, nm.
    pub rms_dr: f64,
    /// RMS charge change against the previous QM0 state, e.
    pub rms_dq: f64,
    /// eV; the total energy of the targeted excited state if there is one.
    pub qm_energy: f64,
    /// eV.
    pub mm_energy: f64,
}

impl QmmIter {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    /// Records `atoms` and moves the sites of `qm0` (same order) onto them.
    pub fn update_from_qm_atoms(&mut self, atoms: &[QmAtom], qm0: &mut PolarSeg) -> Result<()> {
        if atoms.len() != qm0.len() {
            return Err(XtpError::DimensionMismatch {
                context: "QM atoms vs QM0 polar sites",
                expected: qm0.len(),
                found: atoms.len(),
            });
        }
        let mut dr2 = 0.0;
        let mut dq2 = 0.0;
        self.positions.clear();
        self.charges.clear();
        for (atom, site) in atoms.iter().zip(qm0.sites.iter_mut()) {
            let position = atom.position * units::BOHR2NM;
            dr2 += (position - site.position).norm_squared();
            dq2 += (atom.partial_charge - site.charge).powi(2);
            site.position = position;
            site.charge = atom.partial_charge;
            self.positions.push(position);
            self.charges.push(atom.partial_charge);
        }
        let count = atoms.len().max(1) as f64;
        self.rms_dr = (dr2 / count).sqrt();
        self.rms_dq = (dq2 / count).sqrt();
        log::info!(
            "QM0 update: RMS dR {:.6} nm, RMS dQ {:.6} e",
            self.rms_dr,
            self.rms_dq
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    use super::QmmIter;
    use crate::{
        embedding::polarsite::{PolarSeg, PolarSite},
        orbitals::QmAtom,
        periodic_table::ElementType,
        units,
    };

    #[test]
    fn update_moves_sites_and_measures_change() {
        let mut qm0 = PolarSeg::new(
            0,
            vec![
                PolarSite::new("H", Vector3::zeros(), 0.1),
                PolarSite::new("H", Vector3::new(0.0, 0.0, 0.074), -0.1),
            ],
        );
        let atoms = qm0
            .sites
            .iter()
            .enumerate()
            .map(|(index, site)| QmAtom {
                index,
                element: ElementType::H,
                position: (site.position + Vector3::new(0.01, 0.0, 0.0)) * units::NM2BOHR,
                nuclear_charge: 1.0,
                partial_charge: 0.0,
            })
            .collect::<Vec<_>>();

        let mut iteration = QmmIter::new(0);
        iteration.update_from_qm_atoms(&atoms, &mut qm0).unwrap();
        assert_relative_eq!(iteration.rms_dr, 0.01, epsilon = 1e-10);
        assert_relative_eq!(iteration.rms_dq, 0.1, epsilon = 1e-12);
        assert_eq!(qm0.total_charge(), 0.0);
        assert_relative_eq!(qm0.sites[0].position.x, 0.01, epsilon = 1e-10);

        assert!(iteration.update_from_qm_atoms(&atoms[..1], &mut qm0).is_err());
    }
}

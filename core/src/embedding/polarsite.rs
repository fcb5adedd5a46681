use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::{
    atom::Atom,
    error::{Result, XtpError},
    orbitals::QmAtom,
    periodic_table::ElementType,
    units,
};

/// A classical point charge with an isotropic polarisability. Positions in nm,
/// charges in e, polarisabilities in nm³, potentials in e/nm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolarSite {
    #[serde(default)]
    pub name: String,
    pub position: Vector3<f64>,
    #[serde(default)]
    pub charge: f64,
    #[serde(default)]
    pub polarizability: f64,
    #[serde(skip)]
    pub induced_dipole: Vector3<f64>,
    #[serde(skip)]
    pub phi: f64,
}

impl PolarSite {
    pub fn new(name: impl Into<String>, position: Vector3<f64>, charge: f64) -> Self {
        Self {
            name: name.into(),
            position,
            charge,
            polarizability: 0.0,
            induced_dipole: Vector3::zeros(),
            phi: 0.0,
        }
    }

    /// A site that only probes the potential.
    pub fn probe(position: Vector3<f64>) -> Self {
        Self::new("", position, 0.0)
    }

    pub fn with_polarizability(mut self, polarizability: f64) -> Self {
        self.polarizability = polarizability;
        self
    }

    pub fn is_polarizable(&self) -> bool {
        self.polarizability > 0.0
    }
}

/// A rigid group of sites, e.g. one molecule of the environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolarSeg {
    pub id: usize,
    pub sites: Vec<PolarSite>,
}

impl PolarSeg {
    pub fn new(id: usize, sites: Vec<PolarSite>) -> Self {
        Self { id, sites }
    }

    pub fn total_charge(&self) -> f64 {
        self.sites.iter().map(|site| site.charge).sum()
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

/// QM region, polarizable surroundings (MM1) and fixed background of one job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolarTopology {
    pub qm0: PolarSeg,
    #[serde(default)]
    pub foreground: Vec<PolarSeg>,
    #[serde(default)]
    pub background: Vec<PolarSeg>,
}

/// Conversion between QM atoms (Bohr) and polar sites (nm).
pub struct QmInterface;

impl QmInterface {
    pub fn site_from_atom(atom: &QmAtom) -> PolarSite {
        PolarSite::new(
            atom.element.symbol(),
            atom.position * units::BOHR2NM,
            atom.partial_charge,
        )
    }

    /// QM atoms at the sites of `segment`; site names are element symbols.
    pub fn atoms_from_segment(segment: &PolarSeg) -> Result<Vec<Atom>> {
        segment
            .sites
            .iter()
            .map(|site| {
                let element = ElementType::from_symbol(&site.name).ok_or_else(|| {
                    XtpError::Config(format!(
                        "QM site {:?} of segment {} is not an element",
                        site.name, segment.id
                    ))
                })?;
                Ok(Atom::new(element, site.position * units::NM2BOHR))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    use super::{PolarSeg, PolarSite, QmInterface};
    use crate::{orbitals::QmAtom, units};

    #[test]
    fn qm_atoms_round_trip_through_sites() {
        let segment = PolarSeg::new(
            0,
            vec![
                PolarSite::new("O", Vector3::new(0.0, 0.0, 0.0), -0.8),
                PolarSite::new("H", Vector3::new(0.0957, 0.0, 0.0), 0.4),
            ],
        );
        let atoms = QmInterface::atoms_from_segment(&segment).unwrap();
        assert_relative_eq!(atoms[1].position().x, 0.0957 * units::NM2BOHR);

        let mut qm_atom = QmAtom::from_atom(1, &atoms[1]);
        qm_atom.partial_charge = 0.35;
        let site = QmInterface::site_from_atom(&qm_atom);
        assert_eq!(site.name, "H");
        assert_relative_eq!(site.position, segment.sites[1].position, epsilon = 1e-12);
        assert_eq!(site.charge, 0.35);

        let bad = PolarSeg::new(3, vec![PolarSite::probe(Vector3::zeros())]);
        assert!(QmInterface::atoms_from_segment(&bad).is_err());
    }
}

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::{
    atom::Atom, error::XtpError, molecule::Molecule, periodic_table::ElementType, units,
};

/// Represents a full molecule in a config file.
/// A molecule is just a list of positioned atoms, coordinates in Angstrom.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMolecule(Vec<ConfigAtom>);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigAtom {
    element: ElementType,
    position: Vec<f64>,
}

impl TryFrom<ConfigMolecule> for Molecule {
    type Error = XtpError;

    fn try_from(value: ConfigMolecule) -> Result<Self, Self::Error> {
        let ConfigMolecule(config_atoms) = value;

        let mut atoms = Vec::with_capacity(config_atoms.len());

        for (index, atom) in config_atoms.into_iter().enumerate() {
            let &[x, y, z] = atom.position.as_slice() else {
                return Err(XtpError::Config(format!(
                    "atom {index} ({}) needs exactly three coordinates, found {}",
                    atom.element,
                    atom.position.len()
                )));
            };

            atoms.push(Atom {
                position: Vector3::new(x, y, z) * units::ANG2BOHR,
                element_type: atom.element,
            });
        }

        Ok(Self { atoms })
    }
}

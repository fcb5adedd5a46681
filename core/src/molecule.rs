use crate::atom::Atom;

/// Represents a molecule
#[derive(Debug, Clone, Default)]
pub struct Molecule {
    pub(crate) atoms: Vec<Atom>,
}

impl Molecule {
    pub fn new(atoms: Vec<Atom>) -> Self {
        Self { atoms }
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    /// Number of electrons of the neutral molecule.
    pub fn n_electrons(&self) -> usize {
        self.atoms
            .iter()
            .map(|atom| atom.nuclear_charge() as usize)
            .sum()
    }

    /// Coulomb repulsion between all nuclei, in Hartree.
    pub fn nuclear_repulsion(&self) -> f64 {
        let mut potential = 0.0;
        for (a, atom_a) in self.atoms.iter().enumerate() {
            for atom_b in &self.atoms[a + 1..] {
                potential += (atom_a.nuclear_charge() * atom_b.nuclear_charge()) as f64
                    / (atom_b.position - atom_a.position).norm();
            }
        }
        potential
    }
}

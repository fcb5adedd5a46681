//! One-, two- and three-centre integrals over the canonical AO basis.
mod aomatrix;
mod electron_tensor;
mod mmd;
mod threecenter;
pub(crate) mod utils;

use nalgebra::Vector3;

pub use aomatrix::{
    dipole_matrices, kinetic_matrix, nuclear_matrix, overlap_matrix, point_charge_matrix,
};
pub use electron_tensor::ElectronTensor;
pub use mmd::McMurchieDavidson;
pub use threecenter::{coulomb_metric, ThreeCenter};

use crate::atom::Atom;

/// Integrator used by the engines.
pub type DefaultIntegrator = McMurchieDavidson;

/// A classical point charge, position in Bohr and charge in e.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PointCharge {
    pub position: Vector3<f64>,
    pub charge: f64,
}

impl PointCharge {
    pub fn new(position: Vector3<f64>, charge: f64) -> Self {
        Self { position, charge }
    }
}

impl From<&Atom> for PointCharge {
    fn from(atom: &Atom) -> Self {
        Self::new(atom.position, atom.nuclear_charge() as f64)
    }
}

pub trait Integrator: Sync {
    type Function: Sync;

    /// Overlap ⟨a|b⟩.
    fn overlap(&self, functions: (&Self::Function, &Self::Function)) -> f64;

    /// Kinetic energy ⟨a|-½∇²|b⟩.
    fn kinetic(&self, functions: (&Self::Function, &Self::Function)) -> f64;

    /// Attraction of an electron to point charges, ⟨a|-Σ q/|r-C||b⟩.
    fn nuclear(&self, functions: (&Self::Function, &Self::Function), charges: &[PointCharge]) -> f64;

    /// Electron repulsion (ab|cd) in chemists' notation.
    fn electron_repulsion(
        &self,
        functions: (
            &Self::Function,
            &Self::Function,
            &Self::Function,
            &Self::Function,
        ),
    ) -> f64;

    /// Position operator ⟨a|r - origin|b⟩.
    fn dipole(&self, functions: (&Self::Function, &Self::Function), origin: Vector3<f64>) -> Vector3<f64>;
}

mod basis_set;
mod job;
mod molecule;

pub use basis_set::{load_basis_set, ConfigBasisSet};
pub use job::JobConfig;
pub use molecule::ConfigMolecule;

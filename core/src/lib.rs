//! Ground and excited state electronic structure of molecules: closed shell
//! DFT, GW quasiparticles, BSE excitations and self-consistent embedding into
//! a polarizable classical environment.
pub mod atom;
pub mod basis;
pub mod config;
pub mod dft;
pub mod diis;
pub mod embedding;
pub mod error;
pub mod grid;
pub mod gwbse;
pub mod integrals;
pub mod molecule;
pub mod orbitals;
pub mod periodic_table;
pub mod units;

pub(crate) mod linalg;

//! Unit conversion factors. Internally, lengths are in Bohr and energies in
//! Hartree; the classical environment works in nm, elementary charges and eV.

pub const HRT2EV: f64 = 27.21138386;
pub const EV2HRT: f64 = 1.0 / HRT2EV;

pub const BOHR2ANG: f64 = 0.52917721092;
pub const ANG2BOHR: f64 = 1.0 / BOHR2ANG;

pub const NM2BOHR: f64 = 18.897259886;
pub const BOHR2NM: f64 = 1.0 / NM2BOHR;

/// Potential of a unit charge at 1 nm, in Volt: e / (4 pi eps0 nm).
pub const INT2V: f64 = 1.4399645;
/// Interaction energy of two unit charges at 1 nm, in eV.
pub const INT2EV: f64 = INT2V;

//! Result container shared by the DFT, GW-BSE and embedding engines.
mod checkpoint;

use std::fmt;

use nalgebra::{DMatrix, DVector, Vector3};
use serde::{Deserialize, Serialize};

use crate::{
    atom::Atom,
    error::{Result, XtpError},
    linalg,
    periodic_table::ElementType,
    units,
};

pub use checkpoint::CHECKPOINT_VERSION;

/// An atom of the QM region, position in Bohr.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QmAtom {
    pub index: usize,
    #[serde(rename = "type")]
    pub element: ElementType,
    pub position: Vector3<f64>,
    pub nuclear_charge: f64,
    #[serde(default)]
    pub partial_charge: f64,
}

impl QmAtom {
    pub fn from_atom(index: usize, atom: &Atom) -> Self {
        Self {
            index,
            element: atom.element_type(),
            position: *atom.position(),
            nuclear_charge: atom.nuclear_charge() as f64,
            partial_charge: 0.0,
        }
    }

    pub fn to_atom(&self) -> Atom {
        Atom::new(self.element, self.position)
    }
}

/// Spin channel of a BSE excitation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Spin {
    Singlet,
    Triplet,
}

impl fmt::Display for Spin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Singlet => "singlet",
            Self::Triplet => "triplet",
        })
    }
}

/// Whether the singlet BSE keeps the coupling to anti-resonant transitions.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BseType {
    /// Tamm-Dancoff approximation.
    #[default]
    Resonant,
    Full,
}

/// Molecular orbitals, quasiparticle and excitation data of one QM region.
///
/// MO coefficients hold one column per level; BSE coefficients one column per
/// excited state, with the row of the pair (v, c) at `v * bse_ctotal + c`
/// relative to `bse_vmin`/`bse_cmin`. Excited states are indexed from zero.
#[derive(Debug, Clone, Default)]
pub struct Orbitals {
    pub basis_set_size: usize,
    pub occupied_levels: usize,
    pub unoccupied_levels: usize,
    pub number_of_electrons: usize,

    pub mo_energies: DVector<f64>,
    pub mo_coefficients: DMatrix<f64>,
    /// Exchange-correlation potential of the ground state in the AO basis.
    pub vxc: DMatrix<f64>,

    pub atoms: Vec<QmAtom>,
    /// Ground state total energy in eV.
    pub qm_energy: f64,
    pub qm_package: String,
    pub self_energy: f64,
    pub dft_basis: String,
    pub aux_basis: String,
    pub ecp: String,
    pub sca_hfx: f64,

    pub rpa_min: usize,
    pub rpa_max: usize,
    pub qp_min: usize,
    pub qp_max: usize,
    bse_vmin: usize,
    bse_vmax: usize,
    bse_cmin: usize,
    bse_cmax: usize,
    bse_vtotal: usize,
    bse_ctotal: usize,
    bse_size: usize,
    pub bse_type: BseType,

    /// Columns: DFT energy, Σx, Σc, Vxc, QP energy (Hartree).
    pub qp_pert_energies: DMatrix<f64>,
    pub qp_diag_energies: DVector<f64>,
    pub qp_diag_coefficients: DMatrix<f64>,

    pub bse_singlet_energies: DVector<f64>,
    pub bse_singlet_coefficients: DMatrix<f64>,
    pub bse_singlet_coefficients_ar: DMatrix<f64>,
    pub transition_dipoles: Vec<Vector3<f64>>,
    pub bse_triplet_energies: DVector<f64>,
    pub bse_triplet_coefficients: DMatrix<f64>,
    /// Per state: free transition, direct and exchange electron-hole terms.
    pub eh_s: DMatrix<f64>,
    pub eh_t: DMatrix<f64>,
    /// Per state Löwdin charge change (hole − electron) of fragments A and B.
    pub singlet_fragment_dq: Vec<[f64; 2]>,
    pub triplet_fragment_dq: Vec<[f64; 2]>,
}

impl Orbitals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn number_of_levels(&self) -> usize {
        self.mo_energies.len()
    }

    pub fn set_number_of_levels(&mut self, occupied: usize, unoccupied: usize) {
        self.occupied_levels = occupied;
        self.unoccupied_levels = unoccupied;
    }

    /// Sets the BSE product space [vmin, vmax] × [cmin, cmax] and its derived sizes.
    pub fn set_bse_range(&mut self, vmin: usize, vmax: usize, cmin: usize, cmax: usize) -> Result<()> {
        if vmax < vmin || cmax < cmin || cmin <= vmax {
            return Err(XtpError::Config(format!(
                "invalid BSE range [{vmin}, {vmax}] x [{cmin}, {cmax}]"
            )));
        }
        self.bse_vmin = vmin;
        self.bse_vmax = vmax;
        self.bse_cmin = cmin;
        self.bse_cmax = cmax;
        self.bse_vtotal = vmax - vmin + 1;
        self.bse_ctotal = cmax - cmin + 1;
        self.bse_size = self.bse_vtotal * self.bse_ctotal;
        Ok(())
    }

    pub fn bse_vmin(&self) -> usize {
        self.bse_vmin
    }

    pub fn bse_vmax(&self) -> usize {
        self.bse_vmax
    }

    pub fn bse_cmin(&self) -> usize {
        self.bse_cmin
    }

    pub fn bse_cmax(&self) -> usize {
        self.bse_cmax
    }

    pub fn bse_vtotal(&self) -> usize {
        self.bse_vtotal
    }

    pub fn bse_ctotal(&self) -> usize {
        self.bse_ctotal
    }

    pub fn bse_size(&self) -> usize {
        self.bse_size
    }

    pub fn qp_total(&self) -> usize {
        self.qp_max + 1 - self.qp_min
    }

    pub fn rpa_total(&self) -> usize {
        self.rpa_max + 1 - self.rpa_min
    }

    pub fn has_mo_coefficients(&self) -> bool {
        self.mo_coefficients.ncols() > 0
    }

    pub fn bse_energies(&self, spin: Spin) -> &DVector<f64> {
        match spin {
            Spin::Singlet => &self.bse_singlet_energies,
            Spin::Triplet => &self.bse_triplet_energies,
        }
    }

    pub fn bse_coefficients(&self, spin: Spin) -> &DMatrix<f64> {
        match spin {
            Spin::Singlet => &self.bse_singlet_coefficients,
            Spin::Triplet => &self.bse_triplet_coefficients,
        }
    }

    pub fn fragment_dq(&self, spin: Spin) -> &[[f64; 2]] {
        match spin {
            Spin::Singlet => &self.singlet_fragment_dq,
            Spin::Triplet => &self.triplet_fragment_dq,
        }
    }

    /// Whether the singlet coefficients come with anti-resonant partners.
    fn uses_full_singlets(&self, spin: Spin) -> bool {
        self.bse_type == BseType::Full && spin == Spin::Singlet
    }

    fn require_mo_coefficients(&self, levels: usize) -> Result<()> {
        if self.mo_coefficients.ncols() < levels || self.mo_coefficients.nrows() != self.basis_set_size {
            return Err(XtpError::MissingData(format!(
                "MO coefficients for {levels} levels over {} basis functions",
                self.basis_set_size
            )));
        }
        Ok(())
    }

    /// Closed shell ground state density 2 Σ_occ c cᵀ.
    pub fn density_matrix_ground_state(&self) -> Result<DMatrix<f64>> {
        self.require_mo_coefficients(self.occupied_levels)?;
        let occupied = self.mo_coefficients.columns(0, self.occupied_levels);
        Ok(2.0 * &occupied * occupied.transpose())
    }

    /// Expansion coefficients of the QP eigenstates in the AO basis, one column per state.
    pub fn lambda_matrix_quasi_particle(&self) -> Result<DMatrix<f64>> {
        let qp_total = self.qp_total();
        if self.qp_diag_coefficients.shape() != (qp_total, qp_total) {
            return Err(XtpError::MissingData(
                "diagonalized quasiparticle coefficients".to_string(),
            ));
        }
        self.require_mo_coefficients(self.qp_max + 1)?;
        Ok(self.mo_coefficients.columns(self.qp_min, qp_total) * &self.qp_diag_coefficients)
    }

    pub fn density_matrix_quasi_particle(&self, state: usize) -> Result<DMatrix<f64>> {
        let lambda = self.lambda_matrix_quasi_particle()?;
        if state >= lambda.ncols() {
            return Err(XtpError::MissingData(format!("quasiparticle state {state}")));
        }
        let column = lambda.column(state);
        Ok(&column * column.transpose())
    }

    /// Amplitudes of `state` as a (bse_vtotal × bse_ctotal) matrix.
    fn amplitudes(&self, coefficients: &DMatrix<f64>, spin: Spin, state: usize) -> Result<DMatrix<f64>> {
        if state >= coefficients.ncols() || coefficients.nrows() == 0 {
            return Err(XtpError::MissingData(format!(
                "no {spin} BSE coefficients for state {state}"
            )));
        }
        if coefficients.nrows() != self.bse_size {
            return Err(XtpError::DimensionMismatch {
                context: "BSE coefficients (rows vs product space)",
                expected: self.bse_size,
                found: coefficients.nrows(),
            });
        }
        self.require_mo_coefficients(self.bse_cmax + 1)?;
        let column = coefficients.column(state);
        Ok(DMatrix::from_fn(self.bse_vtotal, self.bse_ctotal, |v, c| {
            column[v * self.bse_ctotal + c]
        }))
    }

    fn occupied_block(&self) -> DMatrix<f64> {
        self.mo_coefficients.columns(self.bse_vmin, self.bse_vtotal).into_owned()
    }

    fn virtual_block(&self) -> DMatrix<f64> {
        self.mo_coefficients.columns(self.bse_cmin, self.bse_ctotal).into_owned()
    }

    /// √2 Σ_vc A_vc c_v c_cᵀ; full singlets use the sum of resonant and
    /// anti-resonant amplitudes.
    pub fn transition_density_matrix(&self, spin: Spin, state: usize) -> Result<DMatrix<f64>> {
        let mut amplitudes = self.amplitudes(self.bse_coefficients(spin), spin, state)?;
        if self.uses_full_singlets(spin) {
            amplitudes += self.amplitudes(&self.bse_singlet_coefficients_ar, spin, state)?;
        }
        Ok(std::f64::consts::SQRT_2 * self.occupied_block() * amplitudes * self.virtual_block().transpose())
    }

    fn hole_electron(&self, amplitudes: &DMatrix<f64>) -> [DMatrix<f64>; 2] {
        let occupied = self.occupied_block();
        let virtuals = self.virtual_block();
        let hole = &occupied * (amplitudes * amplitudes.transpose()) * occupied.transpose();
        let electron = &virtuals * (amplitudes.transpose() * amplitudes) * virtuals.transpose();
        [hole, electron]
    }

    /// Hole and electron densities of the resonant part of `state`.
    pub fn density_matrix_excited_state_r(&self, spin: Spin, state: usize) -> Result<[DMatrix<f64>; 2]> {
        let amplitudes = self.amplitudes(self.bse_coefficients(spin), spin, state)?;
        Ok(self.hole_electron(&amplitudes))
    }

    /// Hole and electron densities of the anti-resonant part of a singlet.
    pub fn density_matrix_excited_state_ar(&self, spin: Spin, state: usize) -> Result<[DMatrix<f64>; 2]> {
        if spin != Spin::Singlet {
            return Err(XtpError::Config(
                "anti-resonant densities exist for singlets only".to_string(),
            ));
        }
        let amplitudes = self.amplitudes(&self.bse_singlet_coefficients_ar, spin, state)?;
        Ok(self.hole_electron(&amplitudes))
    }

    /// Hole and electron densities of `state`.
    pub fn density_matrix_excited_state(&self, spin: Spin, state: usize) -> Result<[DMatrix<f64>; 2]> {
        let [mut hole, mut electron] = self.density_matrix_excited_state_r(spin, state)?;
        if self.uses_full_singlets(spin) {
            let [hole_ar, electron_ar] = self.density_matrix_excited_state_ar(spin, state)?;
            hole -= hole_ar;
            electron -= electron_ar;
        }
        Ok([hole, electron])
    }

    /// Total density of `state`: ground state minus hole plus electron.
    pub fn density_matrix_total(&self, state: Option<(Spin, usize)>) -> Result<DMatrix<f64>> {
        let mut density = self.density_matrix_ground_state()?;
        if let Some((spin, state)) = state {
            let [hole, electron] = self.density_matrix_excited_state(spin, state)?;
            density = density - hole + electron;
        }
        Ok(density)
    }

    /// Löwdin populations (S^½ D S^½)_ii of the functions before and from
    /// `frag` on; together they sum to tr(DS).
    pub fn loewdin_population(
        density: &DMatrix<f64>,
        overlap: &DMatrix<f64>,
        frag: usize,
    ) -> Result<[f64; 2]> {
        if density.shape() != overlap.shape() {
            return Err(XtpError::DimensionMismatch {
                context: "Löwdin population (density vs overlap)",
                expected: overlap.nrows(),
                found: density.nrows(),
            });
        }
        let s_sqrt = linalg::sqrt(overlap, "AO overlap")?;
        let product = &s_sqrt * density * &s_sqrt;
        let split = frag.min(product.nrows());
        let a = (0..split).map(|i| product[(i, i)]).sum();
        let b = (split..product.nrows()).map(|i| product[(i, i)]).sum();
        Ok([a, b])
    }

    /// f = 2/3 ω |d|² for every singlet that has a transition dipole.
    pub fn oscillator_strengths(&self) -> Vec<f64> {
        self.transition_dipoles
            .iter()
            .zip(self.bse_singlet_energies.iter())
            .map(|(dipole, omega)| dipole.norm_squared() * 2.0 / 3.0 * omega)
            .collect()
    }

    /// Ground state energy plus the excitation energy of `state`, in Hartree.
    pub fn total_energy(&self, spin: Spin, state: usize) -> Result<f64> {
        let energies = self.bse_energies(spin);
        let omega = energies.get(state).ok_or_else(|| {
            XtpError::MissingData(format!("no {spin} excitation energy for state {state}"))
        })?;
        Ok(self.qm_energy * units::EV2HRT + omega)
    }

    /// Nuclear charges of the first `frag` atoms and of the remaining ones.
    pub fn fragment_nuclear_charges(&self, frag: usize) -> [f64; 2] {
        let mut charges = [0.0; 2];
        for (position, atom) in self.atoms.iter().enumerate() {
            let fragment = if position < frag { 0 } else { 1 };
            charges[fragment] += atom.nuclear_charge;
        }
        charges
    }

    /// Groups of levels whose energies differ by less than `tolerance` eV.
    /// Every level belongs to its own group.
    pub fn check_degeneracy(&self, tolerance: f64) -> Vec<Vec<usize>> {
        (0..self.number_of_levels())
            .map(|level| self.degeneracy(level, tolerance))
            .collect()
    }

    pub fn degeneracy(&self, level: usize, tolerance: f64) -> Vec<usize> {
        let Some(&energy) = self.mo_energies.get(level) else {
            return Vec::new();
        };
        self.mo_energies
            .iter()
            .enumerate()
            .filter(|&(_, &other)| ((other - energy) * units::HRT2EV).abs() < tolerance)
            .map(|(index, _)| index)
            .collect()
    }

    /// Level indices sorted by descending energy; ties keep their order.
    pub fn sort_energies(&self) -> Vec<usize> {
        let mut order = (0..self.number_of_levels()).collect::<Vec<_>>();
        order.sort_by(|&a, &b| self.mo_energies[b].total_cmp(&self.mo_energies[a]));
        order
    }

    /// Keeps `factor` times the number of occupied levels.
    pub fn trim_factor(&mut self, factor: usize) -> Result<()> {
        if factor == 0 {
            return Err(XtpError::Config("trim factor must be positive".to_string()));
        }
        let keep = factor * self.occupied_levels;
        if keep < self.number_of_levels() {
            self.keep_levels(0, keep);
            self.unoccupied_levels = (factor - 1) * self.occupied_levels;
        }
        Ok(())
    }

    /// Keeps the `degenerate_homo` highest occupied and the `degenerate_lumo`
    /// lowest unoccupied levels.
    pub fn trim_window(&mut self, degenerate_homo: usize, degenerate_lumo: usize) -> Result<()> {
        if degenerate_homo > self.occupied_levels
            || self.occupied_levels + degenerate_lumo > self.number_of_levels()
        {
            return Err(XtpError::Config(format!(
                "cannot keep {degenerate_homo} occupied and {degenerate_lumo} unoccupied levels of {}",
                self.number_of_levels()
            )));
        }
        self.keep_levels(self.occupied_levels - degenerate_homo, degenerate_homo + degenerate_lumo);
        self.occupied_levels = degenerate_homo;
        self.unoccupied_levels = degenerate_lumo;
        self.number_of_electrons = 2 * degenerate_homo;
        Ok(())
    }

    fn keep_levels(&mut self, first: usize, count: usize) {
        self.mo_energies = self.mo_energies.rows(first, count).into_owned();
        if self.mo_coefficients.ncols() >= first + count {
            self.mo_coefficients = self.mo_coefficients.columns(first, count).into_owned();
        }
    }

    /// Dimer guess from two monomers: block-diagonal coefficients and the
    /// concatenated energies.
    pub fn prepare_dimer_guess(a: &Orbitals, b: &Orbitals) -> Orbitals {
        let (basis_a, basis_b) = (a.basis_set_size, b.basis_set_size);
        let (levels_a, levels_b) = (a.number_of_levels(), b.number_of_levels());

        let mut mo_coefficients = DMatrix::zeros(basis_a + basis_b, levels_a + levels_b);
        mo_coefficients
            .view_mut((0, 0), (basis_a, levels_a))
            .copy_from(&a.mo_coefficients);
        mo_coefficients
            .view_mut((basis_a, levels_a), (basis_b, levels_b))
            .copy_from(&b.mo_coefficients);

        let mut mo_energies = DVector::zeros(levels_a + levels_b);
        mo_energies.rows_mut(0, levels_a).copy_from(&a.mo_energies);
        mo_energies.rows_mut(levels_a, levels_b).copy_from(&b.mo_energies);

        let number_of_electrons = a.number_of_electrons + b.number_of_electrons;
        let occupied = number_of_electrons / 2;

        let mut atoms = a.atoms.clone();
        atoms.extend(b.atoms.iter().cloned().map(|mut atom| {
            atom.index += a.atoms.len();
            atom
        }));

        Orbitals {
            basis_set_size: basis_a + basis_b,
            occupied_levels: occupied,
            unoccupied_levels: (levels_a + levels_b).saturating_sub(occupied),
            number_of_electrons,
            mo_energies,
            mo_coefficients,
            atoms,
            dft_basis: a.dft_basis.clone(),
            ..Default::default()
        }
    }
}

//! JSON checkpoint of an [`Orbitals`] object.
//!
//! The document holds a single `QMdata` group with a fixed field set and a
//! `qmatoms` subgroup of `atom<i>` records. Matrices are stored row by row.
use std::{collections::BTreeMap, fs::File, io::BufWriter, path::Path};

use nalgebra::{DMatrix, DVector, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{Result, XtpError};

use super::{BseType, Orbitals, QmAtom};

pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct CheckpointFile {
    #[serde(rename = "QMdata")]
    qm_data: QmData,
}

#[derive(Serialize, Deserialize)]
#[serde(default)]
struct QmData {
    #[serde(rename = "Version")]
    version: u32,
    basis_set_size: usize,
    occupied_levels: usize,
    unoccupied_levels: usize,
    number_of_electrons: usize,

    mo_energies: Vec<f64>,
    mo_coefficients: Vec<Vec<f64>>,

    qmatoms: BTreeMap<String, QmAtom>,

    qm_energy: f64,
    qm_package: String,
    self_energy: f64,
    dftbasis: String,
    auxbasis: String,

    rpamin: usize,
    rpamax: usize,
    qpmin: usize,
    qpmax: usize,
    bse_vmin: usize,
    bse_vmax: usize,
    bse_cmin: usize,
    bse_cmax: usize,

    #[serde(rename = "ScaHFX")]
    sca_hfx: f64,
    bsetype: BseType,
    #[serde(rename = "ECP")]
    ecp: String,

    #[serde(rename = "QPpert_energies")]
    qp_pert_energies: Vec<Vec<f64>>,
    #[serde(rename = "QPdiag_energies")]
    qp_diag_energies: Vec<f64>,
    #[serde(rename = "QPdiag_coefficients")]
    qp_diag_coefficients: Vec<Vec<f64>>,
    eh_t: Vec<Vec<f64>>,
    eh_s: Vec<Vec<f64>>,

    #[serde(rename = "BSE_singlet_energies")]
    bse_singlet_energies: Vec<f64>,
    #[serde(rename = "BSE_singlet_coefficients")]
    bse_singlet_coefficients: Vec<Vec<f64>>,
    #[serde(rename = "BSE_singlet_coefficients_AR")]
    bse_singlet_coefficients_ar: Vec<Vec<f64>>,
    transition_dipoles: Vec<Vector3<f64>>,

    #[serde(rename = "BSE_triplet_energies")]
    bse_triplet_energies: Vec<f64>,
    #[serde(rename = "BSE_triplet_coefficients")]
    bse_triplet_coefficients: Vec<Vec<f64>>,
}

impl Default for QmData {
    fn default() -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            basis_set_size: 0,
            occupied_levels: 0,
            unoccupied_levels: 0,
            number_of_electrons: 0,
            mo_energies: Vec::new(),
            mo_coefficients: Vec::new(),
            qmatoms: BTreeMap::new(),
            qm_energy: 0.0,
            qm_package: String::new(),
            self_energy: 0.0,
            dftbasis: String::new(),
            auxbasis: String::new(),
            rpamin: 0,
            rpamax: 0,
            qpmin: 0,
            qpmax: 0,
            bse_vmin: 0,
            bse_vmax: 0,
            bse_cmin: 0,
            bse_cmax: 0,
            sca_hfx: 0.0,
            bsetype: BseType::default(),
            ecp: String::new(),
            qp_pert_energies: Vec::new(),
            qp_diag_energies: Vec::new(),
            qp_diag_coefficients: Vec::new(),
            eh_t: Vec::new(),
            eh_s: Vec::new(),
            bse_singlet_energies: Vec::new(),
            bse_singlet_coefficients: Vec::new(),
            bse_singlet_coefficients_ar: Vec::new(),
            transition_dipoles: Vec::new(),
            bse_triplet_energies: Vec::new(),
            bse_triplet_coefficients: Vec::new(),
        }
    }
}

fn rows(matrix: &DMatrix<f64>) -> Vec<Vec<f64>> {
    matrix
        .row_iter()
        .map(|row| row.iter().copied().collect())
        .collect()
}

fn matrix(context: &'static str, rows: Vec<Vec<f64>>) -> Result<DMatrix<f64>> {
    let ncols = rows.first().map_or(0, Vec::len);
    if let Some(row) = rows.iter().find(|row| row.len() != ncols) {
        return Err(XtpError::DimensionMismatch {
            context,
            expected: ncols,
            found: row.len(),
        });
    }
    let nrows = rows.len();
    let data = rows.into_iter().flatten().collect::<Vec<_>>();
    Ok(DMatrix::from_row_slice(nrows, ncols, &data))
}

impl Orbitals {
    fn to_checkpoint(&self) -> QmData {
        QmData {
            version: CHECKPOINT_VERSION,
            basis_set_size: self.basis_set_size,
            occupied_levels: self.occupied_levels,
            unoccupied_levels: self.unoccupied_levels,
            number_of_electrons: self.number_of_electrons,
            mo_energies: self.mo_energies.iter().copied().collect(),
            mo_coefficients: rows(&self.mo_coefficients),
            qmatoms: self
                .atoms
                .iter()
                .enumerate()
                .map(|(i, atom)| (format!("atom{i}"), atom.clone()))
                .collect(),
            qm_energy: self.qm_energy,
            qm_package: self.qm_package.clone(),
            self_energy: self.self_energy,
            dftbasis: self.dft_basis.clone(),
            auxbasis: self.aux_basis.clone(),
            rpamin: self.rpa_min,
            rpamax: self.rpa_max,
            qpmin: self.qp_min,
            qpmax: self.qp_max,
            bse_vmin: self.bse_vmin,
            bse_vmax: self.bse_vmax,
            bse_cmin: self.bse_cmin,
            bse_cmax: self.bse_cmax,
            sca_hfx: self.sca_hfx,
            bsetype: self.bse_type,
            ecp: self.ecp.clone(),
            qp_pert_energies: rows(&self.qp_pert_energies),
            qp_diag_energies: self.qp_diag_energies.iter().copied().collect(),
            qp_diag_coefficients: rows(&self.qp_diag_coefficients),
            eh_t: rows(&self.eh_t),
            eh_s: rows(&self.eh_s),
            bse_singlet_energies: self.bse_singlet_energies.iter().copied().collect(),
            bse_singlet_coefficients: rows(&self.bse_singlet_coefficients),
            bse_singlet_coefficients_ar: rows(&self.bse_singlet_coefficients_ar),
            transition_dipoles: self.transition_dipoles.clone(),
            bse_triplet_energies: self.bse_triplet_energies.iter().copied().collect(),
            bse_triplet_coefficients: rows(&self.bse_triplet_coefficients),
        }
    }

    fn from_checkpoint(data: QmData) -> Result<Self> {
        if data.version != CHECKPOINT_VERSION {
            return Err(XtpError::Config(format!(
                "checkpoint version {} cannot be read, expected {CHECKPOINT_VERSION}",
                data.version
            )));
        }

        let mut atoms = Vec::with_capacity(data.qmatoms.len());
        for i in 0..data.qmatoms.len() {
            let atom = data.qmatoms.get(&format!("atom{i}")).ok_or_else(|| {
                XtpError::MissingData(format!("checkpoint record qmatoms/atom{i}"))
            })?;
            atoms.push(atom.clone());
        }

        let mut orbitals = Orbitals {
            basis_set_size: data.basis_set_size,
            occupied_levels: data.occupied_levels,
            unoccupied_levels: data.unoccupied_levels,
            number_of_electrons: data.number_of_electrons,
            mo_energies: DVector::from_vec(data.mo_energies),
            mo_coefficients: matrix("mo_coefficients", data.mo_coefficients)?,
            atoms,
            qm_energy: data.qm_energy,
            qm_package: data.qm_package,
            self_energy: data.self_energy,
            dft_basis: data.dftbasis,
            aux_basis: data.auxbasis,
            ecp: data.ecp,
            sca_hfx: data.sca_hfx,
            rpa_min: data.rpamin,
            rpa_max: data.rpamax,
            qp_min: data.qpmin,
            qp_max: data.qpmax,
            bse_type: data.bsetype,
            qp_pert_energies: matrix("QPpert_energies", data.qp_pert_energies)?,
            qp_diag_energies: DVector::from_vec(data.qp_diag_energies),
            qp_diag_coefficients: matrix("QPdiag_coefficients", data.qp_diag_coefficients)?,
            eh_t: matrix("eh_t", data.eh_t)?,
            eh_s: matrix("eh_s", data.eh_s)?,
            bse_singlet_energies: DVector::from_vec(data.bse_singlet_energies),
            bse_singlet_coefficients: matrix("BSE_singlet_coefficients", data.bse_singlet_coefficients)?,
            bse_singlet_coefficients_ar: matrix(
                "BSE_singlet_coefficients_AR",
                data.bse_singlet_coefficients_ar,
            )?,
            transition_dipoles: data.transition_dipoles,
            bse_triplet_energies: DVector::from_vec(data.bse_triplet_energies),
            bse_triplet_coefficients: matrix("BSE_triplet_coefficients", data.bse_triplet_coefficients)?,
            ..Default::default()
        };

        if data.bse_vmax > 0 || data.bse_cmax > 0 {
            orbitals.set_bse_range(data.bse_vmin, data.bse_vmax, data.bse_cmin, data.bse_cmax)?;
        }

        Ok(orbitals)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&CheckpointFile {
            qm_data: self.to_checkpoint(),
        })?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: CheckpointFile = serde_json::from_str(json)?;
        Self::from_checkpoint(file.qm_data)
    }

    pub fn write_to_cpt(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(
            writer,
            &CheckpointFile {
                qm_data: self.to_checkpoint(),
            },
        )?;
        log::info!("wrote orbitals checkpoint to {}", path.display());
        Ok(())
    }

    pub fn read_from_cpt(path: impl AsRef<Path>) -> Result<Self> {
        let file: CheckpointFile = serde_json::from_reader(File::open(path.as_ref())?)?;
        Self::from_checkpoint(file.qm_data)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use crate::{
        error::XtpError,
        orbitals::{tests::model_orbitals, BseType, Orbitals},
    };

    #[test]
    fn checkpoint_keeps_field_names() {
        let json = model_orbitals().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let data = &value["QMdata"];
        for key in [
            "Version",
            "basis_set_size",
            "mo_coefficients",
            "ScaHFX",
            "ECP",
            "QPpert_energies",
            "BSE_singlet_coefficients_AR",
            "BSE_triplet_energies",
        ] {
            assert!(data.get(key).is_some(), "missing {key}");
        }
        assert!(data["qmatoms"].get("atom1").is_some());
        // derived sizes are not stored
        assert!(data.get("bse_size").is_none());
    }

    #[test]
    fn reading_reconstructs_derived_sizes() {
        let mut orbitals = model_orbitals();
        orbitals.bse_type = BseType::Full;
        let restored = Orbitals::from_json(&orbitals.to_json().unwrap()).unwrap();

        assert_eq!(restored.bse_vtotal(), 2);
        assert_eq!(restored.bse_ctotal(), 2);
        assert_eq!(restored.bse_size(), 4);
        assert_eq!(restored.bse_type, BseType::Full);
        assert_eq!(restored.atoms, orbitals.atoms);
        assert_relative_eq!(restored.mo_coefficients, orbitals.mo_coefficients);
        assert_relative_eq!(restored.bse_singlet_coefficients, orbitals.bse_singlet_coefficients);
        assert_relative_eq!(restored.transition_dipoles[0], orbitals.transition_dipoles[0]);
    }

    #[test]
    fn ragged_matrices_are_rejected() {
        let json = r#"{"QMdata":{"Version":1,"mo_coefficients":[[1.0,0.0],[0.0]]}}"#;
        assert!(matches!(
            Orbitals::from_json(json),
            Err(XtpError::DimensionMismatch { .. })
        ));
        let json = r#"{"QMdata":{"Version":7}}"#;
        assert!(matches!(Orbitals::from_json(json), Err(XtpError::Config(_))));
    }
}

use std::{fs::File, io::BufReader, path::{Path, PathBuf}};

use serde::{Deserialize, Serialize};

use super::ConfigMolecule;
use crate::{
    dft::DftOptions,
    embedding::{EwaldOptions, PolarTopology, QmapeOptions},
    error::Result,
    gwbse::GwbseOptions,
};

/// A complete calculation: the molecule, where its basis sets live and the
/// options of every engine. Relative paths are resolved against the job file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub molecule: ConfigMolecule,
    pub basis_set: PathBuf,
    #[serde(default)]
    pub auxiliary_basis_set: Option<PathBuf>,
    #[serde(default)]
    pub dft: DftOptions,
    #[serde(default)]
    pub gwbse: GwbseOptions,
    #[serde(default)]
    pub qmape: QmapeOptions,
    #[serde(default)]
    pub ewald: EwaldOptions,
    /// JSON file holding a [`PolarTopology`].
    #[serde(default)]
    pub environment: Option<PathBuf>,
}

impl JobConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut job: Self = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        if let Some(directory) = path.parent() {
            job.basis_set = directory.join(&job.basis_set);
            job.auxiliary_basis_set = job.auxiliary_basis_set.map(|aux| directory.join(aux));
            job.environment = job.environment.map(|environment| directory.join(environment));
        }
        log::debug!("loaded job {}", path.display());
        Ok(job)
    }

    pub fn load_environment(&self) -> Result<Option<PolarTopology>> {
        self.environment
            .as_ref()
            .map(|path| Ok(serde_json::from_reader(BufReader::new(File::open(path)?))?))
            .transpose()
    }
}

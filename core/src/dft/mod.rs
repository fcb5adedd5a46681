//! Closed shell Kohn-Sham/Hartree-Fock SCF.
mod engine;
mod xc;

use serde::{Deserialize, Serialize};

pub use engine::{DftEngine, DftSummary};

use crate::{
    diis::DiisOptions,
    error::{Result, XtpError},
    grid::GridQuality,
};

/// Exchange-correlation treatment.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Functional {
    /// Slater exchange with VWN5 correlation.
    #[default]
    Lda,
    /// Exact exchange only.
    #[serde(rename = "hf")]
    HartreeFock,
}

impl Functional {
    /// Fraction of exact exchange in the Fock matrix.
    pub fn sca_hfx(&self) -> f64 {
        match self {
            Self::Lda => 0.0,
            Self::HartreeFock => 1.0,
        }
    }

    fn uses_grid(&self) -> bool {
        matches!(self, Self::Lda)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitialGuess {
    /// Extended Hückel, 0.875 S_ij (H_ii + H_jj).
    #[default]
    Huckel,
    /// Eigenvectors of the core Hamiltonian.
    Core,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DftOptions {
    pub max_iterations: usize,
    /// Hartree.
    pub energy_convergence: f64,
    pub error_convergence: f64,
    /// Weight of the previous density while damping.
    pub mixing: f64,
    /// Hartree, added to all virtual levels.
    pub level_shift: f64,
    pub grid: GridQuality,
    pub small_grid: GridQuality,
    /// Converge on the small grid first, then finish on the full one.
    pub use_small_grid: bool,
    /// Quality of the grid on which an external potential is sampled.
    pub external_grid: GridQuality,
    pub functional: Functional,
    pub guess: InitialGuess,
    pub diis: DiisOptions,
}

impl Default for DftOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            energy_convergence: 1e-7,
            error_convergence: 1e-7,
            mixing: 0.7,
            level_shift: 0.0,
            grid: GridQuality::Medium,
            small_grid: GridQuality::Coarse,
            use_small_grid: false,
            external_grid: GridQuality::Coarse,
            functional: Functional::default(),
            guess: InitialGuess::default(),
            diis: DiisOptions::default(),
        }
    }
}

impl DftOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(XtpError::Config(
                "the SCF needs at least one iteration".to_string(),
            ));
        }
        if self.energy_convergence <= 0.0 || self.error_convergence <= 0.0 {
            return Err(XtpError::Config(
                "SCF convergence thresholds must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.mixing) {
            return Err(XtpError::Config(format!(
                "mixing parameter must lie in [0, 1), got {}",
                self.mixing
            )));
        }
        if self.level_shift < 0.0 {
            return Err(XtpError::Config("level shift must not be negative".to_string()));
        }
        self.diis.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::{DftOptions, Functional};

    #[test]
    fn options_from_partial_json() {
        let options: DftOptions =
            serde_json::from_str(r#"{"functional": "hf", "grid": "fine", "diis": {"history": 4}}"#).unwrap();
        assert_eq!(options.functional, Functional::HartreeFock);
        assert_eq!(options.diis.history, 4);
        assert_eq!(options.max_iterations, 100);
        assert!(options.validate().is_ok());

        let options = DftOptions {
            mixing: 1.0,
            ..Default::default()
        };
        assert!(options.validate().is_err());
        assert!(serde_json::from_str::<DftOptions>(r#"{"functional": "b3lyp"}"#).is_err());
    }
}

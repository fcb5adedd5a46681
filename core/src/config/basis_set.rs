use std::{collections::HashMap, fs::File, io::BufReader, path::Path};

use serde::Deserialize;

use crate::{
    basis::{AngularMomentum, AtomicBasis, BasisSet, ElectronShell, ShellType},
    error::{Result, XtpError},
    periodic_table::ElementType,
};

/// Basis set in the JSON format of the MolSSI basis set exchange.
#[derive(Deserialize)]
pub struct ConfigBasisSet {
    #[serde(default)]
    name: String,
    elements: HashMap<ElementType, ConfigElectronicConfiguration>,
}

#[derive(Deserialize)]
struct ConfigElectronicConfiguration {
    electron_shells: Vec<ConfigElectronShell>,
}

#[derive(Deserialize)]
#[allow(unused)]
struct ConfigElectronShell {
    function_type: String,
    angular_momentum: Vec<i32>,
    exponents: Vec<String>,
    coefficients: Vec<Vec<String>>,
}

impl TryFrom<ConfigBasisSet> for BasisSet {
    type Error = XtpError;

    fn try_from(value: ConfigBasisSet) -> Result<Self> {
        let mut atomic_mapping = HashMap::with_capacity(value.elements.len());

        for (element, configuration) in value.elements {
            let mut element_atomic_basis = AtomicBasis::empty();

            for electron_shell in configuration.electron_shells {
                element_atomic_basis.push(electron_shell.into_shell(element)?);
            }

            atomic_mapping.insert(element, element_atomic_basis);
        }

        Ok(Self::new(value.name, atomic_mapping))
    }
}

impl ConfigElectronShell {
    /// Shells listing several angular momenta (e.g. `[0, 1]`) share their
    /// exponents and become one combined shell.
    fn into_shell(self, element: ElementType) -> Result<ElectronShell> {
        let components = self
            .angular_momentum
            .iter()
            .map(|&l| {
                AngularMomentum::from_l(l).ok_or_else(|| {
                    XtpError::Config(format!("angular momentum {l} of {element} is not supported"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let exponents = parse_numbers(&self.exponents)?;
        let contractions = self
            .coefficients
            .iter()
            .map(|coefficients| parse_numbers(coefficients))
            .collect::<Result<Vec<_>>>()?;

        ElectronShell::new(ShellType::new(components), exponents, contractions)
    }
}

fn parse_numbers(values: &[String]) -> Result<Vec<f64>> {
    values
        .iter()
        .map(|value| {
            value
                .trim()
                .replace(['D', 'd'], "E")
                .parse::<f64>()
                .map_err(|_| XtpError::Config(format!("'{value}' is not a number")))
        })
        .collect()
}

/// Reads a MolSSI JSON basis set file.
pub fn load_basis_set(path: impl AsRef<Path>) -> Result<BasisSet> {
    let path = path.as_ref();
    let config: ConfigBasisSet = serde_json::from_reader(BufReader::new(File::open(path)?))?;
    let mut basis_set = BasisSet::try_from(config)?;
    if basis_set.name().is_empty() {
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        basis_set = basis_set.renamed(stem);
    }
    log::debug!("loaded basis set '{}' from {}", basis_set.name(), path.display());
    Ok(basis_set)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::ConfigBasisSet;
    use crate::{basis::BasisSet, periodic_table::ElementType};

    const STO_3G_C: &str = r#"{"elements":{"6":{"electron_shells":[{"function_type":"gto","region":"","angular_momentum":[0],"exponents":["0.7161683735E+02","0.1304509632E+02","0.3530512160E+01"],"coefficients":[["0.1543289673E+00","0.5353281423E+00","0.4446345422E+00"]]},{"function_type":"gto","region":"","angular_momentum":[0,1],"exponents":["0.2941249355E+01","0.6834830964E+00","0.2222899159E+00"],"coefficients":[["-0.9996722919E-01","0.3995128261E+00","0.7001154689E+00"],["0.1559162750E+00","0.6076837186E+00","0.3919573931E+00"]]}]}},"name":"STO-3G"}"#;

    #[test]
    fn combined_shells_are_kept_together() {
        let config: ConfigBasisSet = serde_json::from_str(STO_3G_C).unwrap();
        let basis_set = BasisSet::try_from(config).unwrap();
        assert_eq!(basis_set.name(), "STO-3G");

        let carbon = basis_set.element(ElementType::C).unwrap();
        assert_eq!(carbon.shells().len(), 2);
        assert_eq!(carbon.shells()[1].shell_type().to_string(), "SP");
        assert_relative_eq!(carbon.shells()[1].exponents()[2], 0.2222899159);
        assert!(basis_set.element(ElementType::H).is_err());
    }
}

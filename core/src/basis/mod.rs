mod aobasis;
mod functions;
mod reorder;
mod set;
mod shell;
mod spherical;

pub use aobasis::{AoBasis, AoShell};
pub use functions::{BasisFunction, ContractedGaussian, Gaussian};
pub use reorder::Convention;
pub use set::{AtomicBasis, BasisSet, ElectronShell};
pub use shell::{AngularMomentum, ShellType};

#[cfg(test)]
pub(crate) mod tests {
    //! Small basis sets shared by the unit tests of the whole crate.
    use std::collections::HashMap;

    use nalgebra::Vector3;

    use super::{AoBasis, AtomicBasis, BasisSet, ElectronShell, ShellType};
    use crate::{atom::Atom, config::ConfigBasisSet, periodic_table::ElementType};

    pub(crate) const H_6_31G: &str = r#"{"molssi_bse_schema":{"schema_type":"complete","schema_version":"0.1"},"elements":{"1":{"electron_shells":[{"function_type":"gto","region":"valence","angular_momentum":[0],"exponents":["0.1873113696E+02","0.2825394365E+01","0.6401216923E+00"],"coefficients":[["0.3349460434E-01","0.2347269535E+00","0.8137573261E+00"]]},{"function_type":"gto","region":"valence","angular_momentum":[0],"exponents":["0.1612777588E+00"],"coefficients":[["1.0000000"]]}]},"2":{"electron_shells":[{"function_type":"gto","region":"valence","angular_momentum":[0],"exponents":["0.3842163400E+02","0.5778030000E+01","0.1241774000E+01"],"coefficients":[["0.4013973935E-01","0.2612460970E+00","0.7931846246E+00"]]},{"function_type":"gto","region":"valence","angular_momentum":[0],"exponents":["0.2979640000E+00"],"coefficients":[["1.0000000"]]}]}},"name":"6-31G"}"#;

    pub(crate) fn hydrogen_6_31g() -> BasisSet {
        let config: ConfigBasisSet = serde_json::from_str(H_6_31G).unwrap();
        BasisSet::try_from(config).unwrap()
    }

    /// Even-tempered auxiliary basis for H and He.
    pub(crate) fn auxiliary_basis() -> BasisSet {
        let mut element = AtomicBasis::empty();
        for exponent in [8.0, 2.0, 0.5, 0.125] {
            element.push(ElectronShell::new(ShellType::parse("S").unwrap(), vec![exponent], vec![vec![1.0]]).unwrap());
        }
        element.push(ElectronShell::new(ShellType::parse("P").unwrap(), vec![1.0], vec![vec![1.0]]).unwrap());

        let mut mapping = HashMap::new();
        mapping.insert(ElementType::H, element.clone());
        mapping.insert(ElementType::He, element);
        BasisSet::new("aux-test", mapping)
    }

    pub(crate) fn h2_atoms() -> Vec<Atom> {
        vec![
            Atom::new(ElementType::H, Vector3::zeros()),
            Atom::new(ElementType::H, Vector3::new(0.0, 0.0, 1.4)),
        ]
    }

    /// One oxygen with an `SP` and a `D` shell: 9 functions, 10 cartesians.
    pub(crate) fn sp_d_basis() -> AoBasis {
        let mut oxygen = AtomicBasis::empty();
        oxygen.push(
            ElectronShell::new(
                ShellType::parse("SP").unwrap(),
                vec![3.0, 0.7],
                vec![vec![0.4, 0.7], vec![0.3, 0.8]],
            )
            .unwrap(),
        );
        oxygen.push(ElectronShell::new(ShellType::parse("D").unwrap(), vec![0.9], vec![vec![1.0]]).unwrap());

        let basis_set = BasisSet::new("sp-d", HashMap::from([(ElementType::O, oxygen)]));
        AoBasis::fill(&basis_set, &[Atom::new(ElementType::O, Vector3::zeros())], None).unwrap()
    }

    /// Three atoms with s, p, sp and d shells.
    pub(crate) fn water_like_basis() -> AoBasis {
        let mut oxygen = AtomicBasis::empty();
        oxygen.push(ElectronShell::new(ShellType::parse("S").unwrap(), vec![50.0, 9.0], vec![vec![0.3, 0.7]]).unwrap());
        oxygen.push(
            ElectronShell::new(
                ShellType::parse("SP").unwrap(),
                vec![2.0, 0.5],
                vec![vec![-0.1, 1.1], vec![0.4, 0.7]],
            )
            .unwrap(),
        );
        oxygen.push(ElectronShell::new(ShellType::parse("D").unwrap(), vec![0.8], vec![vec![1.0]]).unwrap());

        let mut hydrogen = AtomicBasis::empty();
        hydrogen.push(ElectronShell::new(ShellType::parse("S").unwrap(), vec![3.4, 0.6], vec![vec![0.2, 0.8]]).unwrap());
        hydrogen.push(ElectronShell::new(ShellType::parse("P").unwrap(), vec![0.75], vec![vec![1.0]]).unwrap());

        let basis_set = BasisSet::new(
            "water-like",
            HashMap::from([(ElementType::O, oxygen), (ElementType::H, hydrogen)]),
        );
        let atoms = [
            Atom::new(ElementType::O, Vector3::zeros()),
            Atom::new(ElementType::H, Vector3::new(0.0, 1.43, 1.1)),
            Atom::new(ElementType::H, Vector3::new(0.0, -1.43, 1.1)),
        ];
        AoBasis::fill(&basis_set, &atoms, Some(1)).unwrap()
    }
}

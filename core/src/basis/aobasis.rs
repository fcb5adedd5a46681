use nalgebra::Vector3;

use crate::{
    atom::Atom,
    error::{Result, XtpError},
};

use super::{
    spherical::shell_block, BasisFunction, BasisSet, ContractedGaussian, Convention, ShellType,
};

/// A shell placed on an atom, with the index of its first basis function.
#[derive(Debug, Clone)]
pub struct AoShell {
    pub(crate) shell_type: ShellType,
    pub(crate) start: usize,
    pub(crate) atom_index: usize,
    pub(crate) position: Vector3<f64>,
    pub(crate) exponents: Vec<f64>,
    pub(crate) contractions: Vec<Vec<f64>>,
}

impl AoShell {
    pub fn shell_type(&self) -> &ShellType {
        &self.shell_type
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn size(&self) -> usize {
        self.shell_type.n_functions()
    }

    pub fn atom_index(&self) -> usize {
        self.atom_index
    }

    pub fn position(&self) -> &Vector3<f64> {
        &self.position
    }

    pub fn lmax(&self) -> i32 {
        self.shell_type.lmax()
    }

    pub fn lmin(&self) -> i32 {
        self.shell_type.lmin()
    }

    /// Smallest exponent of the shell.
    pub fn min_exponent(&self) -> f64 {
        self.exponents.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// Normalized cartesian functions of this shell, component by component.
    pub fn cartesian_functions(&self) -> Vec<BasisFunction> {
        let mut functions = Vec::with_capacity(self.shell_type.n_cartesian());
        for (component, contraction) in self.shell_type.components().iter().zip(&self.contractions) {
            for angular in component.cartesian_components() {
                functions.push(BasisFunction {
                    contracted_gaussian: ContractedGaussian::normalized(
                        &self.exponents,
                        contraction,
                        angular,
                    ),
                    position: self.position,
                });
            }
        }
        functions
    }

    /// Spherical functions of this shell in canonical ordering.
    pub fn basis_functions(&self) -> Result<Vec<BasisFunction>> {
        let mut functions = Vec::with_capacity(self.size());
        for (component, contraction) in self.shell_type.components().iter().zip(&self.contractions) {
            let block = shell_block(*component, Convention::Xtp)?;
            let cartesian = component
                .cartesian_components()
                .into_iter()
                .map(|angular| {
                    ContractedGaussian::normalized(&self.exponents, contraction, angular)
                })
                .collect::<Vec<_>>();

            for row in block.row_iter() {
                let terms = row
                    .iter()
                    .zip(&cartesian)
                    .filter(|(weight, _)| weight.abs() > 0.0)
                    .map(|(&weight, function)| (weight, function));
                functions.push(BasisFunction {
                    contracted_gaussian: ContractedGaussian::combine(terms),
                    position: self.position,
                });
            }
        }
        Ok(functions)
    }
}

/// Atom-centred Gaussian basis of a molecule. Shells are stored in atom order
/// and their function indices are contiguous.
#[derive(Debug, Clone, Default)]
pub struct AoBasis {
    shells: Vec<AoShell>,
    size: usize,
    frag_a: usize,
    frag_b: usize,
    name: String,
}

impl AoBasis {
    /// Places the shells of `basis_set` on every atom (positions in Bohr).
    ///
    /// `frag_break` splits the molecule into fragment A (atoms before the
    /// break) and fragment B; without it all functions belong to A.
    pub fn fill(basis_set: &BasisSet, atoms: &[Atom], frag_break: Option<usize>) -> Result<Self> {
        let mut shells = Vec::new();
        let mut size = 0;
        let mut frag_a = 0;

        for (atom_index, atom) in atoms.iter().enumerate() {
            let element = basis_set.element(atom.element_type)?;
            for shell in element.shells() {
                shells.push(AoShell {
                    shell_type: shell.shell_type.clone(),
                    start: size,
                    atom_index,
                    position: atom.position,
                    exponents: shell.exponents.clone(),
                    contractions: shell.contractions.clone(),
                });
                size += shell.shell_type.n_functions();
            }

            if frag_break.is_some_and(|frag_break| atom_index < frag_break) {
                frag_a = size;
            }
        }

        let (frag_a, frag_b) = match frag_break {
            Some(_) => (frag_a, size - frag_a),
            None => (size, 0),
        };

        log::debug!(
            "filled basis '{}' with {} shells and {size} functions",
            basis_set.name(),
            shells.len()
        );

        Ok(Self {
            shells,
            size,
            frag_a,
            frag_b,
            name: basis_set.name().to_string(),
        })
    }

    pub fn shells(&self) -> &[AoShell] {
        &self.shells
    }

    /// Total number of (spherical) basis functions.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn n_cartesian(&self) -> usize {
        self.shells
            .iter()
            .map(|shell| shell.shell_type.n_cartesian())
            .sum()
    }

    pub fn fragment_a_size(&self) -> usize {
        self.frag_a
    }

    pub fn fragment_b_size(&self) -> usize {
        self.frag_b
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_functions_per_shell(&self) -> usize {
        self.shells.iter().map(AoShell::size).max().unwrap_or(0)
    }

    /// All basis functions in canonical ordering.
    pub fn basis_functions(&self) -> Result<Vec<BasisFunction>> {
        let mut functions = Vec::with_capacity(self.size);
        for shell in &self.shells {
            functions.extend(shell.basis_functions()?);
        }
        if functions.len() != self.size {
            return Err(XtpError::DimensionMismatch {
                context: "basis functions of AO basis",
                expected: self.size,
                found: functions.len(),
            });
        }
        Ok(functions)
    }

    /// Index of the owning atom for every basis function.
    pub fn function_atoms(&self) -> Vec<usize> {
        self.shells
            .iter()
            .flat_map(|shell| std::iter::repeat(shell.atom_index).take(shell.size()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use crate::{
        basis::tests::{h2_atoms, hydrogen_6_31g, sp_d_basis},
        error::XtpError,
        integrals::{DefaultIntegrator, Integrator},
    };

    #[test]
    fn fill_assigns_contiguous_starts() {
        let basis = sp_d_basis();
        let starts = basis.shells().iter().map(|s| s.start()).collect::<Vec<_>>();
        assert_eq!(starts, vec![0, 4]);
        assert_eq!(basis.size(), 9);
        assert_eq!(basis.n_cartesian(), 10);
        assert_eq!(basis.fragment_a_size(), 9);
        assert_eq!(basis.fragment_b_size(), 0);
    }

    #[test]
    fn fill_fails_for_missing_element() {
        let basis_set = hydrogen_6_31g();
        let atoms = [crate::atom::Atom::new(
            crate::periodic_table::ElementType::Kr,
            nalgebra::Vector3::zeros(),
        )];
        let error = super::AoBasis::fill(&basis_set, &atoms, None).unwrap_err();
        assert!(matches!(error, XtpError::Config(_)));
    }

    #[test]
    fn fragment_split() {
        let basis_set = hydrogen_6_31g();
        let atoms = h2_atoms();
        let basis = super::AoBasis::fill(&basis_set, &atoms, Some(1)).unwrap();
        assert_eq!(basis.fragment_a_size(), 2);
        assert_eq!(basis.fragment_b_size(), 2);
        assert_eq!(basis.function_atoms(), vec![0, 0, 1, 1]);
    }

    #[test]
    fn spherical_functions_are_normalized() {
        let basis = sp_d_basis();
        let integrator = DefaultIntegrator::default();
        for function in basis.basis_functions().unwrap() {
            assert_relative_eq!(
                integrator.overlap((&function, &function)),
                1.0,
                epsilon = 1e-10
            );
        }
    }
}

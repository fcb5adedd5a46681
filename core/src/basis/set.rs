use std::collections::HashMap;

use crate::{atom::Atom, error::XtpError, periodic_table::ElementType};

use super::ShellType;

/// A named basis set: per element, the list of shells of that element.
#[derive(Debug, Clone)]
pub struct BasisSet {
    name: String,
    atomic_mapping: HashMap<ElementType, AtomicBasis>,
}

impl BasisSet {
    /// Returns the basis of a given atom, if it exists.
    pub fn for_atom(&self, atom: &Atom) -> Option<&AtomicBasis> {
        self.atomic_mapping.get(&atom.element_type)
    }

    /// Returns the basis of an element or fails with a descriptive error.
    pub fn element(&self, element: ElementType) -> Result<&AtomicBasis, XtpError> {
        self.atomic_mapping.get(&element).ok_or_else(|| {
            XtpError::Config(format!(
                "element {element} is not part of basis set '{}'",
                self.name
            ))
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn renamed(self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self
        }
    }

    /// Create a new basis set given mappings from element type to the basis of that element
    pub fn new(name: impl Into<String>, atomic_mapping: HashMap<ElementType, AtomicBasis>) -> Self {
        Self {
            name: name.into(),
            atomic_mapping,
        }
    }
}

/// Represents the basis functions for a single atom.
#[derive(Debug, Clone, Default)]
pub struct AtomicBasis {
    pub(crate) shells: Vec<ElectronShell>,
}

impl AtomicBasis {
    pub fn empty() -> Self {
        Self { shells: Vec::new() }
    }

    pub fn shells(&self) -> &[ElectronShell] {
        &self.shells
    }

    pub fn push(&mut self, shell: ElectronShell) {
        self.shells.push(shell);
    }
}

/// Exponents shared by all components of a shell, and one contraction
/// vector per component (two for an `SP` shell).
#[derive(Debug, Clone)]
pub struct ElectronShell {
    pub(crate) shell_type: ShellType,
    pub(crate) exponents: Vec<f64>,
    pub(crate) contractions: Vec<Vec<f64>>,
}

impl ElectronShell {
    pub fn new(
        shell_type: ShellType,
        exponents: Vec<f64>,
        contractions: Vec<Vec<f64>>,
    ) -> Result<Self, XtpError> {
        if contractions.len() != shell_type.components().len() {
            return Err(XtpError::DimensionMismatch {
                context: "contraction sets of shell",
                expected: shell_type.components().len(),
                found: contractions.len(),
            });
        }
        for contraction in &contractions {
            if contraction.len() != exponents.len() {
                return Err(XtpError::DimensionMismatch {
                    context: "contraction coefficients of shell",
                    expected: exponents.len(),
                    found: contraction.len(),
                });
            }
        }

        Ok(Self {
            shell_type,
            exponents,
            contractions,
        })
    }

    pub fn shell_type(&self) -> &ShellType {
        &self.shell_type
    }

    pub fn exponents(&self) -> &[f64] {
        &self.exponents
    }

    pub fn contractions(&self) -> &[Vec<f64>] {
        &self.contractions
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::XtpError;

/// Angular momentum of a single-type shell.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AngularMomentum {
    S,
    P,
    D,
    F,
    G,
}

impl AngularMomentum {
    pub fn from_l(l: i32) -> Option<Self> {
        match l {
            0 => Some(Self::S),
            1 => Some(Self::P),
            2 => Some(Self::D),
            3 => Some(Self::F),
            4 => Some(Self::G),
            _ => None,
        }
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'S' => Some(Self::S),
            'P' => Some(Self::P),
            'D' => Some(Self::D),
            'F' => Some(Self::F),
            'G' => Some(Self::G),
            _ => None,
        }
    }

    pub fn l(&self) -> i32 {
        *self as i32
    }

    pub fn letter(&self) -> char {
        match self {
            Self::S => 'S',
            Self::P => 'P',
            Self::D => 'D',
            Self::F => 'F',
            Self::G => 'G',
        }
    }

    /// Number of real spherical harmonics, 2l+1.
    pub fn n_spherical(&self) -> usize {
        2 * self.l() as usize + 1
    }

    /// Number of cartesian components, (l+1)(l+2)/2.
    pub fn n_cartesian(&self) -> usize {
        let l = self.l() as usize;
        (l + 1) * (l + 2) / 2
    }

    /// Cartesian exponents in the order used throughout the crate:
    /// s; x y z; xx yy zz xy xz yz.
    pub(crate) fn cartesian_components(&self) -> SmallVec<[(i32, i32, i32); 6]> {
        match self {
            Self::S => SmallVec::from_slice(&[(0, 0, 0)]),
            Self::P => SmallVec::from_slice(&[(1, 0, 0), (0, 1, 0), (0, 0, 1)]),
            Self::D => SmallVec::from_slice(&[
                (2, 0, 0),
                (0, 2, 0),
                (0, 0, 2),
                (1, 1, 0),
                (1, 0, 1),
                (0, 1, 1),
            ]),
            _ => {
                let l = self.l();
                let mut components = SmallVec::new();
                for i in (0..=l).rev() {
                    for j in (0..=l - i).rev() {
                        components.push((i, j, l - i - j));
                    }
                }
                components
            }
        }
    }
}

/// Type of a shell, e.g. `S`, `P`, `D` or a combined `SP` shell whose
/// components share exponents.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShellType(SmallVec<[AngularMomentum; 2]>);

impl ShellType {
    pub fn new(components: impl IntoIterator<Item = AngularMomentum>) -> Self {
        Self(components.into_iter().collect())
    }

    pub fn single(l: AngularMomentum) -> Self {
        Self(SmallVec::from_slice(&[l]))
    }

    pub fn parse(label: &str) -> Result<Self, XtpError> {
        let components = label
            .trim()
            .chars()
            .map(|letter| {
                AngularMomentum::from_letter(letter)
                    .ok_or_else(|| XtpError::Config(format!("unknown shell type '{label}'")))
            })
            .collect::<Result<SmallVec<_>, _>>()?;

        if components.is_empty() {
            return Err(XtpError::Config("empty shell type".to_string()));
        }
        Ok(Self(components))
    }

    /// The single-type sub-shells of this shell, in order.
    pub fn components(&self) -> &[AngularMomentum] {
        &self.0
    }

    pub fn lmin(&self) -> i32 {
        self.0.iter().map(AngularMomentum::l).min().unwrap_or(0)
    }

    pub fn lmax(&self) -> i32 {
        self.0.iter().map(AngularMomentum::l).max().unwrap_or(0)
    }

    /// Number of (spherical) functions of this shell.
    pub fn n_functions(&self) -> usize {
        self.0.iter().map(AngularMomentum::n_spherical).sum()
    }

    pub fn n_cartesian(&self) -> usize {
        self.0.iter().map(AngularMomentum::n_cartesian).sum()
    }

    pub fn is_combined(&self) -> bool {
        self.0.len() > 1
    }
}

impl fmt::Display for ShellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for component in &self.0 {
            write!(f, "{}", component.letter())?;
        }
        Ok(())
    }
}

impl TryFrom<String> for ShellType {
    type Error = XtpError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ShellType> for String {
    fn from(value: ShellType) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{AngularMomentum, ShellType};

    #[test]
    fn combined_shell_sizes() {
        let sp = ShellType::parse("SP").unwrap();
        assert_eq!(sp.components(), &[AngularMomentum::S, AngularMomentum::P]);
        assert_eq!(sp.n_functions(), 4);
        assert_eq!(sp.lmin(), 0);
        assert_eq!(sp.lmax(), 1);
        assert_eq!(sp.to_string(), "SP");

        let d = ShellType::parse("D").unwrap();
        assert_eq!(d.n_functions(), 5);
        assert_eq!(d.n_cartesian(), 6);
        assert!(ShellType::parse("SX").is_err());
    }

    #[test]
    fn cartesian_component_counts() {
        for l in 0..=4 {
            let momentum = AngularMomentum::from_l(l).unwrap();
            assert_eq!(momentum.cartesian_components().len(), momentum.n_cartesian());
        }
    }
}

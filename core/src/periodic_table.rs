use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::XtpError;

macro_rules! elements {
    ($($element:ident = $z:literal, $radius:literal;)*) => {
        /// Chemical elements, with the atomic number as discriminant.
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        #[repr(u8)]
        pub enum ElementType {
            $($element = $z),*
        }

        impl ElementType {
            /// Element symbol, e.g. `"He"`.
            pub fn symbol(&self) -> &'static str {
                match self {
                    $(Self::$element => stringify!($element)),*
                }
            }

            /// Van der Waals radius in Angstrom.
            pub fn vdw_radius(&self) -> f64 {
                match self {
                    $(Self::$element => $radius),*
                }
            }

            pub fn from_atomic_number(z: u8) -> Option<Self> {
                match z {
                    $($z => Some(Self::$element),)*
                    _ => None,
                }
            }

            pub fn from_symbol(symbol: &str) -> Option<Self> {
                match symbol {
                    $(stringify!($element) => Some(Self::$element),)*
                    _ => None,
                }
            }
        }
    };
}

elements! {
    H = 1, 1.20; He = 2, 1.40;
    Li = 3, 1.82; Be = 4, 1.53; B = 5, 1.92; C = 6, 1.70; N = 7, 1.55; O = 8, 1.52; F = 9, 1.47; Ne = 10, 1.54;
    Na = 11, 2.27; Mg = 12, 1.73; Al = 13, 1.84; Si = 14, 2.10; P = 15, 1.80; S = 16, 1.80; Cl = 17, 1.75; Ar = 18, 1.88;
    K = 19, 2.75; Ca = 20, 2.31; Sc = 21, 2.11; Ti = 22, 2.00; V = 23, 2.00; Cr = 24, 2.00; Mn = 25, 2.00; Fe = 26, 2.00;
    Co = 27, 2.00; Ni = 28, 1.63; Cu = 29, 1.40; Zn = 30, 1.39; Ga = 31, 1.87; Ge = 32, 2.11; As = 33, 1.85; Se = 34, 1.90;
    Br = 35, 1.85; Kr = 36, 2.02;
}

impl ElementType {
    pub fn atomic_number(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Accepts both element symbols (`"O"`) and atomic numbers (`"8"`), the latter
/// being how basis set files key their elements.
impl TryFrom<String> for ElementType {
    type Error = XtpError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let value = value.trim();
        let element = match value.parse::<u8>() {
            Ok(z) => Self::from_atomic_number(z),
            Err(_) => Self::from_symbol(value),
        };
        element.ok_or_else(|| XtpError::Config(format!("unknown element '{value}'")))
    }
}

impl From<ElementType> for String {
    fn from(value: ElementType) -> Self {
        value.symbol().to_string()
    }
}

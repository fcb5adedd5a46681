//! Bethe-Salpeter equation in the space of occupied-virtual pairs.
use std::ops::RangeInclusive;

use nalgebra::{DMatrix, DVector};

use super::{ppm::PlasmonPoleModel, rpa::MoThreeCenter};
use crate::{
    error::{Result, XtpError},
    linalg::{sorted_eigs, sqrt, symmetrize},
    orbitals::Spin,
};

/// Excitations of one spin channel, coefficients as columns.
pub(crate) struct Excitations {
    pub energies: DVector<f64>,
    pub resonant: DMatrix<f64>,
    /// Only for the full (non-Tamm-Dancoff) problem.
    pub anti_resonant: Option<DMatrix<f64>>,
    /// Per state: ⟨D⟩, direct and exchange kernel expectation values.
    pub interaction: DMatrix<f64>,
}

pub(crate) struct BseProblem<'a> {
    pub valence: RangeInclusive<usize>,
    pub conduction: RangeInclusive<usize>,
    /// Quasiparticle energies of all levels.
    pub energies: &'a DVector<f64>,
    pub mo: &'a MoThreeCenter,
    pub ppm: &'a PlasmonPoleModel,
    /// Plasmon-projected three-centre matrices per level.
    pub modes: &'a [DMatrix<f64>],
}

impl BseProblem<'_> {
    fn conduction_count(&self) -> usize {
        self.conduction.end() + 1 - self.conduction.start()
    }

    pub(crate) fn size(&self) -> usize {
        (self.valence.end() + 1 - self.valence.start()) * self.conduction_count()
    }

    /// (v, c) of a product index.
    fn pair(&self, index: usize) -> (usize, usize) {
        let ctotal = self.conduction_count();
        (
            self.valence.start() + index / ctotal,
            self.conduction.start() + index % ctotal,
        )
    }

    fn diagonal(&self) -> DVector<f64> {
        DVector::from_fn(self.size(), |index, _| {
            let (v, c) = self.pair(index);
            self.energies[c] - self.energies[v]
        })
    }

    /// Bare exchange (vc|v'c').
    fn exchange_kernel(&self) -> DMatrix<f64> {
        crate::linalg::symmetric_matrix(self.size(), |i, j| {
            let (v1, c1) = self.pair(i);
            let (v2, c2) = self.pair(j);
            self.mo.coulomb((v1, c1), (v2, c2))
        })
    }

    /// Statically screened W(0) between two pairs of levels.
    fn screened(&self, (a, b): (usize, usize), (c, d): (usize, usize)) -> f64 {
        let weights = self.ppm.weights();
        let (ab, cd) = (&self.modes[a], &self.modes[c]);
        (0..weights.len())
            .map(|i| (1.0 - weights[i]) * ab[(i, b)] * cd[(i, d)])
            .sum()
    }

    /// Direct term (vv'|W|cc') of the resonant block.
    fn direct_kernel(&self) -> DMatrix<f64> {
        crate::linalg::symmetric_matrix(self.size(), |i, j| {
            let (v1, c1) = self.pair(i);
            let (v2, c2) = self.pair(j);
            self.screened((v1, v2), (c1, c2))
        })
    }

    /// Direct term (vc'|W|v'c) of the coupling block.
    fn direct_coupling_kernel(&self) -> DMatrix<f64> {
        crate::linalg::symmetric_matrix(self.size(), |i, j| {
            let (v1, c1) = self.pair(i);
            let (v2, c2) = self.pair(j);
            self.screened((v1, c2), (v2, c1))
        })
    }

    /// Lowest `count` excitations in the Tamm-Dancoff approximation.
    pub(crate) fn solve_resonant(&self, spin: Spin, count: usize) -> Result<Excitations> {
        let diagonal = self.diagonal();
        let direct = self.direct_kernel();
        let exchange = match spin {
            Spin::Singlet => Some(self.exchange_kernel() * 2.0),
            Spin::Triplet => None,
        };

        let mut hamiltonian = DMatrix::from_diagonal(&diagonal) - &direct;
        if let Some(exchange) = &exchange {
            hamiltonian += exchange;
        }
        let (values, vectors) = sorted_eigs(hamiltonian, "BSE Hamiltonian")?;
        let count = count.min(values.len());
        let energies = values.rows(0, count).into_owned();
        let resonant = vectors.columns(0, count).into_owned();

        let interaction = interaction_table(&resonant, &diagonal, &direct, exchange.as_ref());
        log::info!(
            "{spin} BSE: lowest excitation {:.6} Ha from {} pairs",
            energies.get(0).copied().unwrap_or(f64::NAN),
            self.size()
        );
        Ok(Excitations {
            energies,
            resonant,
            anti_resonant: None,
            interaction,
        })
    }

    /// Lowest `count` singlet excitations with the coupling block, solved as
    /// (A−B)^½ (A+B) (A−B)^½ z = Ω² z.
    pub(crate) fn solve_full_singlet(&self, count: usize) -> Result<Excitations> {
        let diagonal = self.diagonal();
        let direct = self.direct_kernel();
        let exchange = self.exchange_kernel() * 2.0;

        let a = DMatrix::from_diagonal(&diagonal) + &exchange - &direct;
        let b = &exchange - self.direct_coupling_kernel();

        let a_minus_b = symmetrize(&a - &b);
        let root = sqrt(&a_minus_b, "A - B of the BSE")?;
        let root_inverse = root.clone().try_inverse().ok_or_else(|| {
            XtpError::Numerical("A - B of the BSE is singular".to_string())
        })?;
        let product = symmetrize(&root * (&a + &b) * &root);
        let (squares, vectors) = sorted_eigs(product, "full BSE Hamiltonian")?;

        let count = count.min(squares.len());
        let size = self.size();
        let mut energies = DVector::zeros(count);
        let mut resonant = DMatrix::zeros(size, count);
        let mut anti_resonant = DMatrix::zeros(size, count);
        for state in 0..count {
            if squares[state] <= 0.0 {
                return Err(XtpError::Numerical(format!(
                    "full BSE has an unstable excitation (Ω² = {:e})",
                    squares[state]
                )));
            }
            let omega = squares[state].sqrt();
            let z = vectors.column(state);
            let plus = &root * z / omega.sqrt();
            let minus = &root_inverse * z * omega.sqrt();
            energies[state] = omega;
            resonant.set_column(state, &((&plus + &minus) * 0.5));
            anti_resonant.set_column(state, &((&plus - &minus) * 0.5));
        }

        let interaction = interaction_table(&resonant, &diagonal, &direct, Some(&exchange));
        log::info!(
            "full singlet BSE: lowest excitation {:.6} Ha from {} pairs",
            energies.get(0).copied().unwrap_or(f64::NAN),
            size
        );
        Ok(Excitations {
            energies,
            resonant,
            anti_resonant: Some(anti_resonant),
            interaction,
        })
    }
}

fn interaction_table(
    coefficients: &DMatrix<f64>,
    diagonal: &DVector<f64>,
    direct: &DMatrix<f64>,
    exchange: Option<&DMatrix<f64>>,
) -> DMatrix<f64> {
    let count = coefficients.ncols();
    let mut table = DMatrix::zeros(count, 3);
    for (state, x) in coefficients.column_iter().enumerate() {
        table[(state, 0)] = x.component_mul(&x).dot(diagonal);
        table[(state, 1)] = -(x.transpose() * direct * x)[(0, 0)];
        if let Some(exchange) = exchange {
            table[(state, 2)] = (x.transpose() * exchange * x)[(0, 0)];
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::{DMatrix, DVector};

    use super::BseProblem;
    use crate::{
        gwbse::{ppm::PlasmonPoleModel, rpa::MoThreeCenter},
        orbitals::Spin,
    };

    /// Two levels, one auxiliary function, bare (vc|vc) = 0.01, (vv|cc) = 0.16.
    fn two_level() -> (MoThreeCenter, PlasmonPoleModel, DVector<f64>) {
        let mo = MoThreeCenter::from_levels(vec![
            DMatrix::from_row_slice(1, 2, &[0.4, 0.1]),
            DMatrix::from_row_slice(1, 2, &[0.1, 0.4]),
        ]);
        // ε(0) = 2 halves the static screened interaction
        let ppm = PlasmonPoleModel::fit(
            &DMatrix::from_element(1, 1, 2.0),
            &DMatrix::from_element(1, 1, 4.0 / 3.0),
            &DMatrix::identity(1, 1),
            0.5,
        )
        .unwrap();
        (mo, ppm, DVector::from_vec(vec![-0.5, 0.5]))
    }

    #[test]
    fn single_pair_excitations() {
        let (mo, ppm, energies) = two_level();
        let modes = ppm.project(mo.levels());
        let problem = BseProblem {
            valence: 0..=0,
            conduction: 1..=1,
            energies: &energies,
            mo: &mo,
            ppm: &ppm,
            modes: &modes,
        };
        assert_eq!(problem.size(), 1);

        let triplet = problem.solve_resonant(Spin::Triplet, 5).unwrap();
        assert_eq!(triplet.energies.len(), 1);
        assert_relative_eq!(triplet.energies[0], 1.0 - 0.08, epsilon = 1e-12);
        assert_relative_eq!(triplet.interaction[(0, 1)], -0.08, epsilon = 1e-12);
        assert_eq!(triplet.interaction[(0, 2)], 0.0);

        let singlet = problem.solve_resonant(Spin::Singlet, 5).unwrap();
        assert_relative_eq!(singlet.energies[0], 1.0 - 0.08 + 0.02, epsilon = 1e-12);
        let row = singlet.interaction.row(0);
        assert_relative_eq!(row[0] + row[1] + row[2], singlet.energies[0], epsilon = 1e-12);
    }

    #[test]
    fn full_singlet_lies_below_resonant() {
        let (mo, ppm, energies) = two_level();
        let modes = ppm.project(mo.levels());
        let problem = BseProblem {
            valence: 0..=0,
            conduction: 1..=1,
            energies: &energies,
            mo: &mo,
            ppm: &ppm,
            modes: &modes,
        };
        let full = problem.solve_full_singlet(1).unwrap();
        // A = 0.94, B = 0.02 - 0.005
        let (a, b) = (0.94, 0.02 - 0.005);
        assert_relative_eq!(full.energies[0], f64::sqrt((a - b) * (a + b)), epsilon = 1e-12);

        let x = full.resonant[(0, 0)];
        let y = full.anti_resonant.as_ref().unwrap()[(0, 0)];
        assert_relative_eq!(x * x - y * y, 1.0, epsilon = 1e-12);
        assert!(full.energies[0] < a);
    }
}

use nalgebra::DMatrix;
use smallvec::smallvec;

use crate::{
    basis::{BasisFunction, ContractedGaussian, Gaussian},
    linalg::symmetric_matrix,
};

use super::Integrator;

/// Constant function 1, turning a four-centre integral into a three- or
/// two-centre one.
fn unit_function(at: &BasisFunction) -> BasisFunction {
    BasisFunction {
        contracted_gaussian: ContractedGaussian(smallvec![Gaussian {
            exponent: 0.0,
            coefficient: 1.0,
            angular: (0, 0, 0),
        }]),
        position: at.position,
    }
}

/// Two-centre Coulomb metric (P|Q) of an auxiliary basis.
pub fn coulomb_metric(
    auxiliary: &[BasisFunction],
    integrator: &impl Integrator<Function = BasisFunction>,
) -> DMatrix<f64> {
    symmetric_matrix(auxiliary.len(), |p, q| {
        integrator.electron_repulsion((
            &auxiliary[p],
            &unit_function(&auxiliary[p]),
            &auxiliary[q],
            &unit_function(&auxiliary[q]),
        ))
    })
}

/// Three-centre integrals (P|μν): one symmetric AO matrix per auxiliary function.
pub struct ThreeCenter {
    matrices: Vec<DMatrix<f64>>,
}

impl ThreeCenter {
    pub fn from_basis(
        auxiliary: &[BasisFunction],
        basis: &[BasisFunction],
        integrator: &impl Integrator<Function = BasisFunction>,
    ) -> Self {
        let compute = |aux: &BasisFunction| {
            let unit = unit_function(aux);
            symmetric_matrix(basis.len(), |m, n| {
                integrator.electron_repulsion((aux, &unit, &basis[m], &basis[n]))
            })
        };

        #[cfg(feature = "rayon")]
        let matrices = {
            use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
            auxiliary.par_iter().map(compute).collect::<Vec<_>>()
        };

        #[cfg(not(feature = "rayon"))]
        let matrices = auxiliary.iter().map(compute).collect::<Vec<_>>();

        log::debug!(
            "three-centre integrals: {} auxiliary x {} basis functions",
            auxiliary.len(),
            basis.len()
        );

        Self { matrices }
    }

    pub fn from_matrices(matrices: Vec<DMatrix<f64>>) -> Self {
        Self { matrices }
    }

    pub fn auxiliary_size(&self) -> usize {
        self.matrices.len()
    }

    pub fn matrices(&self) -> &[DMatrix<f64>] {
        &self.matrices
    }
}

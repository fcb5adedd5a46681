use nalgebra::{DMatrix, Vector3};

use crate::{atom::Atom, basis::BasisFunction, linalg::symmetric_matrix};

use super::{Integrator, PointCharge};

pub fn overlap_matrix(
    basis: &[BasisFunction],
    integrator: &impl Integrator<Function = BasisFunction>,
) -> DMatrix<f64> {
    symmetric_matrix(basis.len(), |i, j| {
        let overlap_ij = integrator.overlap((&basis[i], &basis[j]));
        log::trace!("overlap ({i}{j}) = {overlap_ij}");
        overlap_ij
    })
}

pub fn kinetic_matrix(
    basis: &[BasisFunction],
    integrator: &impl Integrator<Function = BasisFunction>,
) -> DMatrix<f64> {
    symmetric_matrix(basis.len(), |i, j| {
        let kinetic_ij = integrator.kinetic((&basis[i], &basis[j]));
        log::trace!("kinetic ({i}{j}) = {kinetic_ij}");
        kinetic_ij
    })
}

/// Electron-nuclear attraction of all `nuclei`.
pub fn nuclear_matrix(
    basis: &[BasisFunction],
    nuclei: &[Atom],
    integrator: &impl Integrator<Function = BasisFunction>,
) -> DMatrix<f64> {
    let charges = nuclei.iter().map(PointCharge::from).collect::<Vec<_>>();
    symmetric_matrix(basis.len(), |i, j| {
        let nuclear_ij = integrator.nuclear((&basis[i], &basis[j]), &charges);
        log::trace!("nuclear ({i}{j}) = {nuclear_ij}");
        nuclear_ij
    })
}

/// Potential energy matrix of an electron in the field of external point charges.
pub fn point_charge_matrix(
    basis: &[BasisFunction],
    charges: &[PointCharge],
    integrator: &impl Integrator<Function = BasisFunction>,
) -> DMatrix<f64> {
    if charges.is_empty() {
        return DMatrix::zeros(basis.len(), basis.len());
    }
    symmetric_matrix(basis.len(), |i, j| integrator.nuclear((&basis[i], &basis[j]), charges))
}

/// x, y and z components of ⟨a|r - origin|b⟩.
pub fn dipole_matrices(
    basis: &[BasisFunction],
    origin: Vector3<f64>,
    integrator: &impl Integrator<Function = BasisFunction>,
) -> [DMatrix<f64>; 3] {
    let n = basis.len();
    let mut matrices = [DMatrix::zeros(n, n), DMatrix::zeros(n, n), DMatrix::zeros(n, n)];
    for i in 0..n {
        for j in i..n {
            let dipole = integrator.dipole((&basis[i], &basis[j]), origin);
            for (matrix, component) in matrices.iter_mut().zip(dipole.iter()) {
                matrix[(i, j)] = *component;
                matrix[(j, i)] = *component;
            }
        }
    }
    matrices
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use crate::{basis::tests::water_like_basis, integrals::DefaultIntegrator};

    #[test]
    fn overlap_is_symmetric_with_unit_diagonal() {
        let basis = water_like_basis().basis_functions().unwrap();
        let overlap = super::overlap_matrix(&basis, &DefaultIntegrator::default());
        assert_relative_eq!(overlap.clone(), overlap.transpose(), epsilon = 1e-12);
        for i in 0..basis.len() {
            assert_relative_eq!(overlap[(i, i)], 1.0, epsilon = 1e-10);
        }
        // functions of one shell on one atom are orthogonal
        assert_relative_eq!(overlap[(2, 3)], 0.0, epsilon = 1e-12);
    }
}

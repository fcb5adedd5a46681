//! Dense symmetric eigen-solvers shared by the engines.
use nalgebra::{Cholesky, DMatrix, DVector, SymmetricEigen};

use crate::error::{Result, XtpError};

#[inline(always)]
/// Create a symmetric, square matrix. Function is only run for upper triangle of the matrix
pub(crate) fn symmetric_matrix(
    n: usize,
    mut func: impl FnMut(usize, usize) -> f64,
) -> DMatrix<f64> {
    let mut m = DMatrix::zeros(n, n);
    for j in 0..n {
        for i in 0..=j {
            let value = func(i, j);
            m[(i, j)] = value;
            m[(j, i)] = value;
        }
    }
    m
}

fn eigs(matrix: DMatrix<f64>, context: &str) -> Result<(DVector<f64>, DMatrix<f64>)> {
    let max_iterations = 1000 * matrix.nrows().max(1);
    let eigen = SymmetricEigen::try_new(matrix, f64::EPSILON, max_iterations)
        .ok_or_else(|| XtpError::Numerical(format!("eigen decomposition of {context} did not converge")))?;
    Ok((eigen.eigenvalues, eigen.eigenvectors))
}

/// Eigenvalues in ascending order and the matching eigenvectors as columns.
pub(crate) fn sorted_eigs(matrix: DMatrix<f64>, context: &str) -> Result<(DVector<f64>, DMatrix<f64>)> {
    let (eigenvalues, eigenvectors) = eigs(matrix, context)?;

    let mut val_vec_pairs = eigenvalues
        .into_iter()
        .zip(eigenvectors.column_iter())
        .collect::<Vec<_>>();

    val_vec_pairs.sort_unstable_by(|(a, _), (b, _)| a.total_cmp(b));

    let (values, vectors): (Vec<_>, Vec<_>) = val_vec_pairs.into_iter().unzip();

    Ok((
        DVector::from_column_slice(&values),
        DMatrix::from_columns(&vectors),
    ))
}

/// f(M) for a symmetric matrix M, applied to its eigenvalues.
pub(crate) fn symmetric_function(
    matrix: &DMatrix<f64>,
    context: &str,
    f: impl Fn(f64) -> Result<f64>,
) -> Result<DMatrix<f64>> {
    let (values, vectors) = eigs(matrix.clone(), context)?;
    let mut mapped = DVector::zeros(values.len());
    for (target, &value) in mapped.iter_mut().zip(values.iter()) {
        *target = f(value)?;
    }
    Ok(&vectors * DMatrix::from_diagonal(&mapped) * vectors.transpose())
}

/// Symmetric M^{-1/2} of a positive definite matrix.
pub(crate) fn inverse_sqrt(matrix: &DMatrix<f64>, context: &str) -> Result<DMatrix<f64>> {
    symmetric_function(matrix, context, |value| {
        if value <= 0.0 {
            Err(XtpError::Numerical(format!(
                "{context} is not positive definite (eigenvalue {value:e})"
            )))
        } else {
            Ok(value.sqrt().recip())
        }
    })
}

/// Symmetric M^{1/2} of a positive definite matrix.
pub(crate) fn sqrt(matrix: &DMatrix<f64>, context: &str) -> Result<DMatrix<f64>> {
    symmetric_function(matrix, context, |value| {
        if value < 0.0 {
            Err(XtpError::Numerical(format!(
                "{context} is not positive semi-definite (eigenvalue {value:e})"
            )))
        } else {
            Ok(value.sqrt())
        }
    })
}

/// Lower Cholesky factor of a positive definite matrix.
pub(crate) fn cholesky_factor(matrix: &DMatrix<f64>, context: &str) -> Result<DMatrix<f64>> {
    Cholesky::new(matrix.clone())
        .map(|cholesky| cholesky.l())
        .ok_or_else(|| XtpError::Numerical(format!("Cholesky decomposition of {context} failed")))
}

/// Solves H C = S C e with ascending `e`; the columns of C are S-orthonormal.
pub(crate) fn generalized_eigs(
    h: &DMatrix<f64>,
    s: &DMatrix<f64>,
) -> Result<(DVector<f64>, DMatrix<f64>)> {
    let l = cholesky_factor(s, "overlap matrix")?;
    let l_inv = l
        .try_inverse()
        .ok_or_else(|| XtpError::Numerical("Cholesky factor of overlap is singular".to_string()))?;
    let transformed = &l_inv * h * l_inv.transpose();
    let (values, vectors) = sorted_eigs(symmetrize(transformed), "transformed Hamiltonian")?;
    Ok((values, l_inv.transpose() * vectors))
}

pub(crate) fn symmetrize(matrix: DMatrix<f64>) -> DMatrix<f64> {
    (&matrix + matrix.transpose()) * 0.5
}

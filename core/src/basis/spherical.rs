//! Cartesian → real spherical transformation of shells up to d-functions.
use nalgebra::DMatrix;

use crate::error::{Result, XtpError};

use super::{reorder::shell_order, AngularMomentum, AoBasis, Convention};

/// Block of one single-type shell in Gaussian ordering.
///
/// Columns are the cartesian components (s; x y z; xx yy zz xy xz yz), rows the
/// spherical functions (s; px py pz; d3z2-r2 dxz dyz dx2-y2 dxy).
fn gaussian_block(l: AngularMomentum) -> Result<DMatrix<f64>> {
    match l {
        AngularMomentum::S => Ok(DMatrix::identity(1, 1)),
        AngularMomentum::P => Ok(DMatrix::identity(3, 3)),
        AngularMomentum::D => {
            let mut block = DMatrix::zeros(5, 6);
            block[(0, 0)] = -0.5;
            block[(0, 1)] = -0.5;
            block[(0, 2)] = 1.0;
            block[(1, 4)] = 1.0;
            block[(2, 5)] = 1.0;
            block[(3, 0)] = 0.5 * 3f64.sqrt();
            block[(3, 1)] = -0.5 * 3f64.sqrt();
            block[(4, 3)] = 1.0;
            Ok(block)
        }
        AngularMomentum::F | AngularMomentum::G => Err(XtpError::Unsupported(format!(
            "cartesian to spherical transformation for {}-functions",
            l.letter().to_ascii_lowercase()
        ))),
    }
}

/// Block of one single-type shell with rows in the requested ordering.
pub(crate) fn shell_block(l: AngularMomentum, convention: Convention) -> Result<DMatrix<f64>> {
    let gaussian = gaussian_block(l)?;
    match convention {
        Convention::Gaussian => Ok(gaussian),
        Convention::Xtp => {
            let order = shell_order(Convention::Gaussian, l)?;
            let mut block = DMatrix::zeros(gaussian.nrows(), gaussian.ncols());
            for (x, &target) in order.iter().enumerate() {
                block.set_row(target, &gaussian.row(x));
            }
            Ok(block)
        }
        other => Err(XtpError::Unsupported(format!(
            "cartesian to spherical transformation in {other} ordering"
        ))),
    }
}

impl AoBasis {
    /// Block-diagonal transformation (spherical × cartesian) of the whole basis.
    /// Combined shells contribute one block per component.
    pub fn cartesian_to_spherical(&self, convention: Convention) -> Result<DMatrix<f64>> {
        let n_cartesian = self.n_cartesian();
        let mut transformation = DMatrix::zeros(self.size(), n_cartesian);

        let (mut row, mut col) = (0, 0);
        for shell in self.shells() {
            for &component in shell.shell_type().components() {
                let block = shell_block(component, convention)?;
                transformation
                    .view_mut((row, col), (block.nrows(), block.ncols()))
                    .copy_from(&block);
                row += block.nrows();
                col += block.ncols();
            }
        }

        Ok(transformation)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::shell_block;
    use crate::basis::{tests::sp_d_basis, AngularMomentum, Convention};

    #[test]
    fn canonical_d_block_rows() {
        let block = shell_block(AngularMomentum::D, Convention::Xtp).unwrap();
        // d0, dyz, dxz, dxy, dx2-y2
        assert_relative_eq!(block[(0, 2)], 1.0);
        assert_relative_eq!(block[(1, 5)], 1.0);
        assert_relative_eq!(block[(2, 4)], 1.0);
        assert_relative_eq!(block[(3, 3)], 1.0);
        assert_relative_eq!(block[(4, 0)], 0.5 * 3f64.sqrt());
    }

    #[test]
    fn whole_basis_transformation_shape() {
        let basis = sp_d_basis();
        let gaussian = basis.cartesian_to_spherical(Convention::Gaussian).unwrap();
        assert_eq!(gaussian.shape(), (9, 10));
        // p block is the identity in gaussian ordering
        assert_relative_eq!(gaussian[(1, 1)], 1.0);
        assert_relative_eq!(gaussian[(4, 4)], -0.5);

        let canonical = basis.cartesian_to_spherical(Convention::Xtp).unwrap();
        // canonical p order is z, y, x
        assert_relative_eq!(canonical[(1, 3)], 1.0);
        assert_relative_eq!(canonical[(3, 1)], 1.0);
        assert!(basis.cartesian_to_spherical(Convention::Orca).is_err());
    }
}

//! McMurchie Davidon integration scheme.
//! Reference:
//!
//! [1] Goings, J. Integrals. https://joshuagoings.com/2017/04/28/integrals/
use std::f64::consts::PI;

use nalgebra::Vector3;

use crate::basis::{BasisFunction, ContractedGaussian, Gaussian};

use super::{
    utils::{coulomb_auxiliary, hermite_expansion},
    Integrator, PointCharge,
};

#[derive(Default, Clone, Copy, Debug)]
pub struct McMurchieDavidson;

impl Integrator for McMurchieDavidson {
    type Function = BasisFunction;

    fn overlap(&self, functions: (&Self::Function, &Self::Function)) -> f64 {
        let (basis_a, basis_b) = functions;
        let diff = basis_a.position - basis_b.position;

        let (ContractedGaussian(data_a), ContractedGaussian(data_b)) =
            (&basis_a.contracted_gaussian, &basis_b.contracted_gaussian);

        let mut output = 0.0;
        for (&primitive_a, &primitive_b) in itertools::iproduct!(data_a, data_b) {
            output += primitive_a.coefficient
                * primitive_b.coefficient
                * primitive_overlap(primitive_a, primitive_b, diff);
        }
        output
    }

    fn kinetic(&self, functions: (&Self::Function, &Self::Function)) -> f64 {
        let (basis_a, basis_b) = functions;
        let diff = basis_a.position - basis_b.position;

        let (ContractedGaussian(data_a), ContractedGaussian(data_b)) =
            (&basis_a.contracted_gaussian, &basis_b.contracted_gaussian);

        let mut output = 0.0;
        for (&primitive_a, &primitive_b) in itertools::iproduct!(data_a, data_b) {
            output += primitive_a.coefficient
                * primitive_b.coefficient
                * primitive_kinetic(primitive_a, primitive_b, diff);
        }
        output
    }

    fn nuclear(&self, functions: (&Self::Function, &Self::Function), charges: &[PointCharge]) -> f64 {
        let (basis_a, basis_b) = functions;
        let diff = basis_a.position - basis_b.position;

        let (ContractedGaussian(data_a), ContractedGaussian(data_b)) =
            (&basis_a.contracted_gaussian, &basis_b.contracted_gaussian);

        let mut output = 0.0;
        for (&primitive_a, &primitive_b) in itertools::iproduct!(data_a, data_b) {
            let product_center = product_center(
                basis_a.position,
                primitive_a.exponent,
                basis_b.position,
                primitive_b.exponent,
            );

            let coefficient = primitive_a.coefficient * primitive_b.coefficient;
            for charge in charges {
                output += coefficient
                    * primitive_nuclear(primitive_a, primitive_b, diff, product_center, charge);
            }
        }

        output
    }

    fn electron_repulsion(
        &self,
        functions: (
            &Self::Function,
            &Self::Function,
            &Self::Function,
            &Self::Function,
        ),
    ) -> f64 {
        let (basis_a, basis_b, basis_c, basis_d) = functions;
        let diff_ab = basis_a.position - basis_b.position;
        let diff_cd = basis_c.position - basis_d.position;

        let ContractedGaussian(data_a) = &basis_a.contracted_gaussian;
        let ContractedGaussian(data_b) = &basis_b.contracted_gaussian;
        let ContractedGaussian(data_c) = &basis_c.contracted_gaussian;
        let ContractedGaussian(data_d) = &basis_d.contracted_gaussian;

        let mut output = 0.0;
        for &primitive_a in data_a {
            for &primitive_b in data_b {
                let product_center_ab = product_center(
                    basis_a.position,
                    primitive_a.exponent,
                    basis_b.position,
                    primitive_b.exponent,
                );
                let coefficient_ab = primitive_a.coefficient * primitive_b.coefficient;

                for &primitive_c in data_c {
                    for &primitive_d in data_d {
                        let product_center_cd = product_center(
                            basis_c.position,
                            primitive_c.exponent,
                            basis_d.position,
                            primitive_d.exponent,
                        );

                        let diff_product = product_center_ab - product_center_cd;

                        output += coefficient_ab
                            * primitive_c.coefficient
                            * primitive_d.coefficient
                            * primitive_electron(
                                [primitive_a, primitive_b, primitive_c, primitive_d],
                                diff_ab,
                                diff_cd,
                                diff_product,
                            )
                    }
                }
            }
        }

        output
    }

    fn dipole(&self, functions: (&Self::Function, &Self::Function), origin: Vector3<f64>) -> Vector3<f64> {
        let (basis_a, basis_b) = functions;
        let diff = basis_a.position - basis_b.position;
        let shift = basis_b.position - origin;

        let (ContractedGaussian(data_a), ContractedGaussian(data_b)) =
            (&basis_a.contracted_gaussian, &basis_b.contracted_gaussian);

        let mut output = Vector3::zeros();
        for (&primitive_a, &primitive_b) in itertools::iproduct!(data_a, data_b) {
            let coefficient = primitive_a.coefficient * primitive_b.coefficient;
            let overlap = primitive_overlap(primitive_a, primitive_b, diff);
            // x - O_x = (x - B_x) + (B_x - O_x)
            let step = |i, j, k| primitive_overlap(primitive_a, add_angular(primitive_b, [i, j, k]), diff);
            output += coefficient
                * Vector3::new(
                    step(1, 0, 0) + shift.x * overlap,
                    step(0, 1, 0) + shift.y * overlap,
                    step(0, 0, 1) + shift.z * overlap,
                );
        }
        output
    }
}

/// Overlap of two primitives, without their coefficients. `diff` is A - B.
fn primitive_overlap(primitive_a: Gaussian, primitive_b: Gaussian, diff: Vector3<f64>) -> f64 {
    let Gaussian {
        exponent: exp_a,
        angular: (l1, m1, n1),
        ..
    } = primitive_a;

    let Gaussian {
        exponent: exp_b,
        angular: (l2, m2, n2),
        ..
    } = primitive_b;

    hermite_expansion([l1, l2, 0], diff.x, exp_a, exp_b)
        * hermite_expansion([m1, m2, 0], diff.y, exp_a, exp_b)
        * hermite_expansion([n1, n2, 0], diff.z, exp_a, exp_b)
        * (PI / (exp_a + exp_b)).powi(3).sqrt()
}

fn primitive_kinetic(primitive_a: Gaussian, primitive_b: Gaussian, diff: Vector3<f64>) -> f64 {
    let Gaussian {
        exponent: b_exp,
        angular: (l, m, n),
        ..
    } = primitive_b;

    let angular_step =
        |i, j, k| primitive_overlap(primitive_a, add_angular(primitive_b, [i, j, k]), diff);

    let term_0 =
        b_exp * (2 * (l + m + n) + 3) as f64 * primitive_overlap(primitive_a, primitive_b, diff);
    let term_1 = -2.0
        * b_exp.powi(2)
        * (angular_step(2, 0, 0) + angular_step(0, 2, 0) + angular_step(0, 0, 2));
    let term_2 = -0.5
        * ((l * (l - 1)) as f64 * angular_step(-2, 0, 0)
            + (m * (m - 1)) as f64 * angular_step(0, -2, 0)
            + (n * (n - 1)) as f64 * angular_step(0, 0, -2));
    term_0 + term_1 + term_2
}

fn primitive_nuclear(
    primitive_a: Gaussian,
    primitive_b: Gaussian,
    // difference of the positions of the two basis functions: a - b
    diff: Vector3<f64>,
    // the product center of the two basis functions
    product_center: Vector3<f64>,
    charge: &PointCharge,
) -> f64 {
    let Gaussian {
        exponent: a,
        angular: (l1, m1, n1),
        ..
    } = primitive_a;

    let Gaussian {
        exponent: b,
        angular: (l2, m2, n2),
        ..
    } = primitive_b;

    let p = a + b;
    let diff_charge = product_center - charge.position;

    let mut sum = 0.0;
    for t in 0..=l1 + l2 {
        let e1 = hermite_expansion([l1, l2, t], diff.x, a, b);
        for u in 0..=m1 + m2 {
            let e2 = hermite_expansion([m1, m2, u], diff.y, a, b);
            for v in 0..=n1 + n2 {
                let e3 = hermite_expansion([n1, n2, v], diff.z, a, b);
                sum += e1 * e2 * e3 * coulomb_auxiliary(t, u, v, 0, p, diff_charge)
            }
        }
    }
    (-charge.charge * std::f64::consts::TAU / p) * sum
}

fn primitive_electron(
    [primitive_a, primitive_b, primitive_c, primitive_d]: [Gaussian; 4],
    diff_ab: Vector3<f64>,
    diff_cd: Vector3<f64>,
    diff_product: Vector3<f64>,
) -> f64 {
    let Gaussian {
        exponent: a,
        angular: (l1, m1, n1),
        ..
    } = primitive_a;
    let Gaussian {
        exponent: b,
        angular: (l2, m2, n2),
        ..
    } = primitive_b;
    let Gaussian {
        exponent: c,
        angular: (l3, m3, n3),
        ..
    } = primitive_c;
    let Gaussian {
        exponent: d,
        angular: (l4, m4, n4),
        ..
    } = primitive_d;

    let p = a + b;
    let q = c + d;
    let alpha = p * q / (p + q);

    let mut sum = 0.0;
    for t1 in 0..=l1 + l2 {
        let e1 = hermite_expansion([l1, l2, t1], diff_ab.x, a, b);
        for u1 in 0..=m1 + m2 {
            let e2 = hermite_expansion([m1, m2, u1], diff_ab.y, a, b);
            for v1 in 0..=n1 + n2 {
                let e3 = hermite_expansion([n1, n2, v1], diff_ab.z, a, b);
                let e_ab = e1 * e2 * e3;
                if e_ab == 0.0 {
                    continue;
                }
                for t2 in 0..=l3 + l4 {
                    let e4 = hermite_expansion([l3, l4, t2], diff_cd.x, c, d);
                    for u2 in 0..=m3 + m4 {
                        let e5 = hermite_expansion([m3, m4, u2], diff_cd.y, c, d);
                        for v2 in 0..=n3 + n4 {
                            let e6 = hermite_expansion([n3, n4, v2], diff_cd.z, c, d);
                            // (-1)^(t2 + u2 + v2)
                            let sign = if (t2 + u2 + v2) % 2 == 0 { 1.0 } else { -1.0 };

                            sum += e_ab
                                * e4
                                * e5
                                * e6
                                * sign
                                * coulomb_auxiliary(
                                    t1 + t2,
                                    u1 + u2,
                                    v1 + v2,
                                    0,
                                    alpha,
                                    diff_product,
                                )
                        }
                    }
                }
            }
        }
    }

    2.0 * PI.powi(5).sqrt() * (p * q * (p + q).sqrt()).recip() * sum
}

#[inline(always)]
fn add_angular(gaussian: Gaussian, [i, j, k]: [i32; 3]) -> Gaussian {
    let Gaussian {
        angular: (l, m, n), ..
    } = gaussian;

    Gaussian {
        angular: (l + i, m + j, n + k),
        ..gaussian
    }
}

#[inline(always)]
fn product_center(
    a_pos: Vector3<f64>,
    a_exp: f64,
    b_pos: Vector3<f64>,
    b_exp: f64,
) -> Vector3<f64> {
    (a_exp * a_pos + b_exp * b_pos) / (a_exp + b_exp)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    use crate::{
        basis::{BasisFunction, ContractedGaussian, Gaussian},
        integrals::{Integrator, McMurchieDavidson, PointCharge},
    };

    fn s_function(exponent: f64, position: Vector3<f64>) -> BasisFunction {
        BasisFunction {
            contracted_gaussian: ContractedGaussian::normalized(&[exponent], &[1.0], (0, 0, 0)),
            position,
        }
    }

    #[test]
    fn test_primitive_overlap() {
        let trivial = Gaussian {
            exponent: 1.0,
            coefficient: 1.0,
            angular: (0, 0, 0),
        };
        let angular_i = Gaussian {
            angular: (1, 0, 0),
            ..trivial
        };
        let angular_j = Gaussian {
            angular: (0, 1, 0),
            ..trivial
        };

        let diff = Vector3::new(1.0, 0.0, 0.0);
        assert_relative_eq!(
            super::primitive_overlap(trivial, trivial, diff),
            1.1940776638,
            epsilon = 1e-9
        );
        // (1/(2p) - (ab/p)^2 x^2) * s00 = (1/4 - 1/4) * s00
        assert_relative_eq!(super::primitive_overlap(angular_i, angular_i, diff), 0.0, epsilon = 1e-12);
        assert_relative_eq!(
            super::primitive_overlap(angular_j, angular_j, diff),
            0.2985194159,
            epsilon = 1e-9
        );
    }

    #[test]
    fn s_type_closed_forms() {
        let integrator = McMurchieDavidson;
        let a = s_function(0.8, Vector3::zeros());
        let b = s_function(0.8, Vector3::new(0.0, 0.0, 1.2));

        // kinetic energy of a normalized s gaussian: 3a/2
        assert_relative_eq!(integrator.kinetic((&a, &a)), 1.2, epsilon = 1e-12);

        // attraction of a unit charge in its centre: -2 sqrt(2a/pi)
        let nucleus = [PointCharge::new(Vector3::zeros(), 1.0)];
        assert_relative_eq!(
            integrator.nuclear((&a, &a), &nucleus),
            -2.0 * (1.6 / std::f64::consts::PI).sqrt(),
            epsilon = 1e-12
        );

        // (aa|aa) of a normalized s gaussian: 2 sqrt(a / pi)
        assert_relative_eq!(
            integrator.electron_repulsion((&a, &a, &a, &a)),
            2.0 * (0.8 / std::f64::consts::PI).sqrt(),
            epsilon = 1e-12
        );

        // symmetry of the overlap and of the electron repulsion
        assert_relative_eq!(integrator.overlap((&a, &b)), integrator.overlap((&b, &a)), epsilon = 1e-14);
        assert_relative_eq!(
            integrator.electron_repulsion((&a, &b, &a, &a)),
            integrator.electron_repulsion((&a, &a, &b, &a)),
            epsilon = 1e-12
        );
    }

    #[test]
    fn dipole_of_displaced_density() {
        let integrator = McMurchieDavidson;
        let a = s_function(1.1, Vector3::new(0.3, -0.2, 0.7));
        let dipole = integrator.dipole((&a, &a), Vector3::zeros());
        assert_relative_eq!(dipole, Vector3::new(0.3, -0.2, 0.7), epsilon = 1e-12);
    }
}

use nalgebra::Vector3;

/// Hermite expansion coefficient E^{ij}_t of the product of two one-dimensional
/// Gaussians with exponents `a` and `b`, separated by `qx = A_x - B_x`.
pub(crate) fn hermite_expansion([i, j, t]: [i32; 3], qx: f64, a: f64, b: f64) -> f64 {
    if i < 0 || j < 0 || t < 0 || t > i + j {
        return 0.0;
    }

    let p = a + b;
    let q = a * b / p;

    if i == 0 && j == 0 && t == 0 {
        (-q * qx * qx).exp()
    } else if j == 0 {
        (2.0 * p).recip() * hermite_expansion([i - 1, j, t - 1], qx, a, b)
            - (q * qx / a) * hermite_expansion([i - 1, j, t], qx, a, b)
            + (t + 1) as f64 * hermite_expansion([i - 1, j, t + 1], qx, a, b)
    } else {
        (2.0 * p).recip() * hermite_expansion([i, j - 1, t - 1], qx, a, b)
            + (q * qx / b) * hermite_expansion([i, j - 1, t], qx, a, b)
            + (t + 1) as f64 * hermite_expansion([i, j - 1, t + 1], qx, a, b)
    }
}

/// Hermite Coulomb integral R^n_{tuv} for exponent `p` and the vector
/// `pc = P - C` between the Gaussian product centre and the charge.
pub(crate) fn coulomb_auxiliary(t: i32, u: i32, v: i32, n: i32, p: f64, pc: Vector3<f64>) -> f64 {
    if t < 0 || u < 0 || v < 0 {
        return 0.0;
    }

    if t == 0 && u == 0 && v == 0 {
        return (-2.0 * p).powi(n) * boys(n, p * pc.norm_squared());
    }

    if t == 0 && u == 0 {
        (v - 1) as f64 * coulomb_auxiliary(t, u, v - 2, n + 1, p, pc)
            + pc.z * coulomb_auxiliary(t, u, v - 1, n + 1, p, pc)
    } else if t == 0 {
        (u - 1) as f64 * coulomb_auxiliary(t, u - 2, v, n + 1, p, pc)
            + pc.y * coulomb_auxiliary(t, u - 1, v, n + 1, p, pc)
    } else {
        (t - 1) as f64 * coulomb_auxiliary(t - 2, u, v, n + 1, p, pc)
            + pc.x * coulomb_auxiliary(t - 1, u, v, n + 1, p, pc)
    }
}

/// Boys function F_n(t).
pub(crate) fn boys(n: i32, t: f64) -> f64 {
    const SMALL: f64 = 1e-12;
    const SERIES_LIMIT: f64 = 30.0;

    let two_n = (2 * n) as f64;
    if t < SMALL {
        return (two_n + 1.0).recip();
    }

    if t < SERIES_LIMIT {
        let mut term = (two_n + 1.0).recip();
        let mut sum = term;
        let mut k = 1.0;
        while term > 1e-17 * sum {
            term *= 2.0 * t / (two_n + 2.0 * k + 1.0);
            sum += term;
            k += 1.0;
        }
        return (-t).exp() * sum;
    }

    // upward recursion is stable for large arguments
    let exp = (-t).exp();
    let mut value = 0.5 * (std::f64::consts::PI / t).sqrt() * libm::erf(t.sqrt());
    for m in 0..n {
        value = ((2 * m + 1) as f64 * value - exp) / (2.0 * t);
    }
    value
}

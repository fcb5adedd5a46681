//! One-dimensional quadratures the molecular grids are built from.
use std::f64::consts::PI;

/// Gauss-Legendre nodes and weights on [-1, 1].
pub(crate) fn gauss_legendre(n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut nodes = vec![0.0; n];
    let mut weights = vec![0.0; n];

    for i in 0..(n + 1) / 2 {
        // Tricomi's initial guess, refined by Newton iteration
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let mut derivative = 0.0;
        for _ in 0..100 {
            let (p, dp) = legendre(n, x);
            derivative = dp;
            let step = p / dp;
            x -= step;
            if step.abs() < 1e-15 {
                break;
            }
        }
        let (_, dp) = legendre(n, x);
        if dp != 0.0 {
            derivative = dp;
        }
        let weight = 2.0 / ((1.0 - x * x) * derivative * derivative);
        nodes[i] = x;
        nodes[n - 1 - i] = -x;
        weights[i] = weight;
        weights[n - 1 - i] = weight;
    }

    (nodes, weights)
}

/// P_n(x) and its derivative.
fn legendre(n: usize, x: f64) -> (f64, f64) {
    let (mut p0, mut p1) = (1.0, x);
    if n == 0 {
        return (1.0, 0.0);
    }
    for k in 2..=n {
        let k = k as f64;
        let p2 = ((2.0 * k - 1.0) * x * p1 - (k - 1.0) * p0) / k;
        p0 = p1;
        p1 = p2;
    }
    let dp = n as f64 * (x * p1 - p0) / (x * x - 1.0);
    (p1, dp)
}

/// Becke's mapping of Chebyshev (second kind) nodes onto (0, ∞): radii and
/// weights for ∫ f(r) r² dr.
pub(crate) fn becke_radial(n: usize, scale: f64) -> (Vec<f64>, Vec<f64>) {
    let mut radii = Vec::with_capacity(n);
    let mut weights = Vec::with_capacity(n);
    for i in 1..=n {
        let theta = i as f64 * PI / (n as f64 + 1.0);
        let x = theta.cos();
        let r = scale * (1.0 + x) / (1.0 - x);
        let dr = 2.0 * scale / (1.0 - x).powi(2);
        radii.push(r);
        weights.push(PI / (n as f64 + 1.0) * theta.sin() * dr * r * r);
    }
    (radii, weights)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    #[test]
    fn gauss_legendre_integrates_polynomials() {
        let (nodes, weights) = super::gauss_legendre(7);
        assert_relative_eq!(weights.iter().sum::<f64>(), 2.0, epsilon = 1e-13);
        let x6: f64 = nodes.iter().zip(&weights).map(|(x, w)| w * x.powi(6)).sum();
        assert_relative_eq!(x6, 2.0 / 7.0, epsilon = 1e-13);
    }

    #[test]
    fn radial_quadrature_integrates_gaussian() {
        // ∫ exp(-r²) r² dr = sqrt(pi) / 4
        let (radii, weights) = super::becke_radial(60, 1.0);
        let integral: f64 = radii
            .iter()
            .zip(&weights)
            .map(|(r, w)| w * (-r * r).exp())
            .sum();
        assert_relative_eq!(integral, std::f64::consts::PI.sqrt() / 4.0, epsilon = 1e-8);
    }
}

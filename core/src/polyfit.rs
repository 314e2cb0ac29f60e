//! Least-squares polynomial fitting used by the channel equalizer and pilot tracker

/// Fits `y ≈ p[0] + p[1]*x + ... + p[order]*x^order` in the least-squares sense.
///
/// Solves the normal equations with partial pivoting; a degenerate system
/// (fewer distinct points than coefficients) leaves the unresolved
/// coefficients at zero instead of producing NaN.
pub fn polyfit(x: &[f32], y: &[f32], order: usize) -> Vec<f32> {
    let n = order + 1;
    let mut a = vec![vec![0f64; n + 1]; n];

    for (&xi, &yi) in x.iter().zip(y.iter()) {
        let xi = xi as f64;
        let mut powers = vec![1f64; 2 * n - 1];
        for p in 1..powers.len() {
            powers[p] = powers[p - 1] * xi;
        }
        for r in 0..n {
            for c in 0..n {
                a[r][c] += powers[r + c];
            }
            a[r][n] += powers[r] * yi as f64;
        }
    }

    // Gaussian elimination
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        a.swap(col, pivot);
        if a[col][col].abs() < 1e-12 {
            continue;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for c in col..=n {
                a[row][c] -= factor * a[col][c];
            }
        }
    }

    (0..n)
        .map(|i| {
            if a[i][i].abs() < 1e-12 {
                0.0
            } else {
                (a[i][n] / a[i][i]) as f32
            }
        })
        .collect()
}

/// Evaluates a polynomial with coefficients in ascending order
pub fn polyval(p: &[f32], x: f32) -> f32 {
    p.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

//! Lemke's complementary pivoting method.
//!
//! Finds `z ≥ 0` with `w = M z + q ≥ 0` and `z · w = 0`. The tableau is kept
//! in a workspace that is reused between solves.

use crate::{
    config::LcpSettings,
    error::LcpError,
    utils::linalg::{MatrixN, VectorN},
};

/// Relative window within which two ratios tie.
const TIE_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Default)]
pub struct LemkeSolver {
    settings: LcpSettings,
    tableau: Vec<f64>,
    basis: Vec<usize>,
    cols: usize,
    pivots: usize,
}

impl LemkeSolver {
    pub fn new(settings: LcpSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> &LcpSettings {
        &self.settings
    }

    /// Pivots used by the last solve.
    pub fn last_pivots(&self) -> usize {
        self.pivots
    }

    pub fn solve(&mut self, m: &MatrixN, q: &VectorN) -> Result<VectorN, LcpError> {
        let n = q.len();
        if !m.is_square() || m.rows() != n {
            return Err(LcpError::DimensionMismatch {
                rows: m.rows(),
                cols: m.cols(),
                len: n,
            });
        }
        if !m.is_finite() || !q.is_finite() {
            return Err(LcpError::NonFinite);
        }
        self.pivots = 0;
        let Some((start_row, q_min)) = q.argmin() else {
            return Ok(VectorN::zeros(0));
        };
        if q_min >= 0.0 {
            return Ok(VectorN::zeros(n));
        }

        // Columns: w (n) | z (n) | z0 | rhs.
        let z0 = 2 * n;
        let rhs = 2 * n + 1;
        self.cols = 2 * n + 2;
        self.tableau.clear();
        self.tableau.resize(n * self.cols, 0.0);
        for i in 0..n {
            self.set(i, i, 1.0);
            for j in 0..n {
                self.set(i, n + j, -m[(i, j)]);
            }
            self.set(i, z0, -1.0);
            self.set(i, rhs, q[i]);
        }
        self.basis.clear();
        self.basis.extend(0..n);

        let limit = self.settings.max_pivots_factor * n + 100;
        self.pivot(start_row, z0);
        self.basis[start_row] = z0;
        let mut entering = n + start_row;

        loop {
            if self.pivots >= limit {
                return Err(LcpError::PivotLimit { limit });
            }
            let row = self
                .ratio_test(entering, n)
                .ok_or(LcpError::RayTermination { pivots: self.pivots })?;
            let leaving = self.basis[row];
            self.pivot(row, entering);
            self.basis[row] = entering;
            if leaving == z0 {
                break;
            }
            entering = if leaving < n { leaving + n } else { leaving - n };
        }

        let mut z = VectorN::zeros(n);
        for (row, &var) in self.basis.iter().enumerate() {
            if (n..2 * n).contains(&var) {
                z[var - n] = self.get(row, rhs).max(0.0);
            }
        }
        if !z.is_finite() {
            return Err(LcpError::NonFinite);
        }
        Ok(z)
    }

    fn get(&self, row: usize, col: usize) -> f64 {
        self.tableau[row * self.cols + col]
    }

    fn set(&mut self, row: usize, col: usize, value: f64) {
        self.tableau[row * self.cols + col] = value;
    }

    fn pivot(&mut self, row: usize, col: usize) {
        let cols = self.cols;
        let p = self.get(row, col);
        for j in 0..cols {
            self.tableau[row * cols + j] /= p;
        }
        let n = self.basis.len();
        for i in (0..n).filter(|&i| i != row) {
            let factor = self.get(i, col);
            if factor == 0.0 {
                continue;
            }
            for j in 0..cols {
                let v = self.tableau[row * cols + j];
                self.tableau[i * cols + j] -= factor * v;
            }
        }
        self.pivots += 1;
    }

    /// Minimum ratio row for `entering`; ties go to the artificial variable,
    /// then to the lexicographically smallest row of the basis inverse.
    fn ratio_test(&self, entering: usize, n: usize) -> Option<usize> {
        let rhs = 2 * n + 1;
        let z0 = 2 * n;
        let tol = self.settings.zero_tolerance;
        let ratios: Vec<(usize, f64)> = (0..n)
            .filter(|&i| self.get(i, entering) > tol)
            .map(|i| (i, self.get(i, rhs) / self.get(i, entering)))
            .collect();
        let min_ratio = ratios.iter().map(|&(_, r)| r).reduce(f64::min)?;
        let window = TIE_TOLERANCE * min_ratio.abs().max(1.0);
        let mut ties: Vec<usize> = ratios
            .iter()
            .filter(|&&(_, r)| r <= min_ratio + window)
            .map(|&(i, _)| i)
            .collect();

        if let Some(&row) = ties.iter().find(|&&i| self.basis[i] == z0) {
            return Some(row);
        }
        for col in 0..n {
            if ties.len() <= 1 {
                break;
            }
            let scaled = |i: usize| self.get(i, col) / self.get(i, entering);
            let best = ties.iter().map(|&i| scaled(i)).reduce(f64::min)?;
            ties.retain(|&i| scaled(i) <= best + TIE_TOLERANCE * best.abs().max(1.0));
        }
        ties.first().copied()
    }
}

/// Largest violation of `z ≥ 0`, `w ≥ 0` and `z_i w_i = 0`.
pub fn complementarity_error(m: &MatrixN, q: &VectorN, z: &VectorN) -> f64 {
    let mut w = m.mul_vec(z);
    w.axpy(1.0, q);
    z.iter()
        .zip(w.iter())
        .map(|(&zi, &wi)| (-zi).max(-wi).max((zi * wi).abs()))
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solver() -> LemkeSolver {
        LemkeSolver::new(LcpSettings::default())
    }

    #[test]
    fn nonnegative_q_is_solved_by_zero() {
        let m = MatrixN::identity(3);
        let q = VectorN::from_slice(&[1.0, 0.0, 2.0]);
        let z = solver().solve(&m, &q).unwrap();
        assert_eq!(&z[..], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn positive_definite_problem() {
        let m = MatrixN::from_rows(&[
            VectorN::from_slice(&[2.0, 1.0]),
            VectorN::from_slice(&[1.0, 2.0]),
        ]);
        let q = VectorN::from_slice(&[-5.0, -6.0]);
        let z = solver().solve(&m, &q).unwrap();
        assert!((z[0] - 4.0 / 3.0).abs() < 1e-10);
        assert!((z[1] - 7.0 / 3.0).abs() < 1e-10);
        assert!(complementarity_error(&m, &q, &z) < 1e-10);
    }

    #[test]
    fn mixed_active_set() {
        let m = MatrixN::from_rows(&[
            VectorN::from_slice(&[1.0, 0.5, 0.0]),
            VectorN::from_slice(&[0.5, 1.0, 0.0]),
            VectorN::from_slice(&[0.0, 0.0, 1.0]),
        ]);
        let q = VectorN::from_slice(&[-1.0, 2.0, -0.5]);
        let z = solver().solve(&m, &q).unwrap();
        assert!((z[0] - 1.0).abs() < 1e-10);
        assert_eq!(z[1], 0.0);
        assert!((z[2] - 0.5).abs() < 1e-10);
        assert!(complementarity_error(&m, &q, &z) < 1e-10);
    }

    #[test]
    fn degenerate_duplicate_rows_are_handled() {
        // Two identical contacts sharing a body: any split of the impulse is valid.
        let m = MatrixN::from_rows(&[
            VectorN::from_slice(&[1.0, 1.0]),
            VectorN::from_slice(&[1.0, 1.0]),
        ]);
        let q = VectorN::from_slice(&[-1.0, -1.0]);
        let z = solver().solve(&m, &q).unwrap();
        assert!((z[0] + z[1] - 1.0).abs() < 1e-10);
        assert!(complementarity_error(&m, &q, &z) < 1e-10);
    }

    #[test]
    fn infeasible_problem_reports_ray_termination() {
        let m = MatrixN::from_rows(&[VectorN::from_slice(&[-1.0])]);
        let q = VectorN::from_slice(&[-1.0]);
        assert!(matches!(
            solver().solve(&m, &q),
            Err(LcpError::RayTermination { .. })
        ));
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let m = MatrixN::identity(2);
        let q = VectorN::from_slice(&[1.0]);
        assert!(matches!(
            solver().solve(&m, &q),
            Err(LcpError::DimensionMismatch { .. })
        ));
    }
}

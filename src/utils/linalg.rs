//! Small dense linear algebra used by the constraint subproblem.
//!
//! Only what the builder, the LCP solver and the articulated dynamics need:
//! dynamically sized vectors and row-major matrices, products, block copies
//! and an LU solve with partial pivoting.

use std::{
    ops::{Deref, DerefMut, Index, IndexMut},
    slice::SliceIndex,
};

/// Dynamically sized column vector.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VectorN(Vec<f64>);

impl VectorN {
    pub fn zeros(len: usize) -> Self {
        Self(vec![0.0; len])
    }

    pub fn from_vec(values: Vec<f64>) -> Self {
        Self(values)
    }

    pub fn from_slice(values: &[f64]) -> Self {
        Self(values.to_vec())
    }

    /// Unit vector `e_k` of the given length.
    pub fn basis(len: usize, k: usize) -> Self {
        let mut v = Self::zeros(len);
        v.0[k] = 1.0;
        v
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }

    pub fn dot(&self, other: &VectorN) -> f64 {
        debug_assert_eq!(self.len(), other.len());
        self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum()
    }

    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    /// `self += alpha * x`
    pub fn axpy(&mut self, alpha: f64, x: &VectorN) {
        debug_assert_eq!(self.len(), x.len());
        for (a, b) in self.0.iter_mut().zip(x.0.iter()) {
            *a += alpha * b;
        }
    }

    pub fn scaled(&self, alpha: f64) -> VectorN {
        Self(self.0.iter().map(|v| v * alpha).collect())
    }

    pub fn add(&self, other: &VectorN) -> VectorN {
        let mut out = self.clone();
        out.axpy(1.0, other);
        out
    }

    pub fn sub(&self, other: &VectorN) -> VectorN {
        let mut out = self.clone();
        out.axpy(-1.0, other);
        out
    }

    pub fn fill(&mut self, value: f64) {
        self.0.iter_mut().for_each(|v| *v = value);
    }

    /// Index and value of the smallest entry.
    pub fn argmin(&self) -> Option<(usize, f64)> {
        self.0
            .iter()
            .copied()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    pub fn segment(&self, start: usize, len: usize) -> VectorN {
        Self(self.0[start..start + len].to_vec())
    }

    pub fn set_segment(&mut self, start: usize, values: &VectorN) {
        self.0[start..start + values.len()].copy_from_slice(values);
    }
}

impl Deref for VectorN {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.0
    }
}

impl DerefMut for VectorN {
    fn deref_mut(&mut self) -> &mut [f64] {
        &mut self.0
    }
}

impl From<Vec<f64>> for VectorN {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

impl FromIterator<f64> for VectorN {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Row-major dense matrix.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatrixN {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl MatrixN {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m[(i, i)] = 1.0;
        }
        m
    }

    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut m = Self::zeros(rows, cols);
        for r in 0..rows {
            for c in 0..cols {
                m.data[r * cols + c] = f(r, c);
            }
        }
        m
    }

    /// Builds a matrix from its rows; all rows must share a length.
    pub fn from_rows(rows: &[VectorN]) -> Self {
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut m = Self::zeros(rows.len(), cols);
        for (r, row) in rows.iter().enumerate() {
            m.row_mut(r).copy_from_slice(row);
        }
        m
    }

    /// Builds a matrix whose columns are the given vectors.
    pub fn from_columns(columns: &[VectorN]) -> Self {
        let rows = columns.first().map(|c| c.len()).unwrap_or(0);
        Self::from_fn(rows, columns.len(), |r, c| columns[c][r])
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    pub fn row(&self, r: usize) -> &[f64] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn row_mut(&mut self, r: usize) -> &mut [f64] {
        &mut self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn column(&self, c: usize) -> VectorN {
        (0..self.rows).map(|r| self[(r, c)]).collect()
    }

    pub fn transpose(&self) -> MatrixN {
        Self::from_fn(self.cols, self.rows, |r, c| self[(c, r)])
    }

    pub fn mul_vec(&self, v: &VectorN) -> VectorN {
        debug_assert_eq!(self.cols, v.len());
        (0..self.rows)
            .map(|r| self.row(r).iter().zip(v.iter()).map(|(a, b)| a * b).sum())
            .collect()
    }

    pub fn mul(&self, other: &MatrixN) -> MatrixN {
        debug_assert_eq!(self.cols, other.rows);
        let mut out = MatrixN::zeros(self.rows, other.cols);
        for r in 0..self.rows {
            for k in 0..self.cols {
                let a = self[(r, k)];
                if a == 0.0 {
                    continue;
                }
                for c in 0..other.cols {
                    out.data[r * other.cols + c] += a * other[(k, c)];
                }
            }
        }
        out
    }

    pub fn sub(&self, other: &MatrixN) -> MatrixN {
        debug_assert_eq!((self.rows, self.cols), (other.rows, other.cols));
        MatrixN {
            rows: self.rows,
            cols: self.cols,
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(a, b)| a - b)
                .collect(),
        }
    }

    pub fn add_to_diagonal(&mut self, value: f64) {
        for i in 0..self.rows.min(self.cols) {
            self[(i, i)] += value;
        }
    }

    /// Copies `rows × cols` entries starting at `(r0, c0)`.
    pub fn block(&self, r0: usize, c0: usize, rows: usize, cols: usize) -> MatrixN {
        Self::from_fn(rows, cols, |r, c| self[(r0 + r, c0 + c)])
    }

    /// Writes `block` into this matrix with its top-left corner at `(r0, c0)`.
    pub fn set_block(&mut self, r0: usize, c0: usize, block: &MatrixN) {
        for r in 0..block.rows {
            for c in 0..block.cols {
                self[(r0 + r, c0 + c)] = block[(r, c)];
            }
        }
    }

    /// Picks the rows and columns named by the index lists.
    pub fn select(&self, rows: &[usize], cols: &[usize]) -> MatrixN {
        Self::from_fn(rows.len(), cols.len(), |r, c| self[(rows[r], cols[c])])
    }

    pub fn is_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    pub fn max_abs(&self) -> f64 {
        self.data.iter().fold(0.0, |acc, v| acc.max(v.abs()))
    }

    /// Solves `self * x = b` by LU factorisation with partial pivoting.
    /// Returns `None` when a pivot falls below `1e-14` times the largest entry.
    pub fn solve(&self, b: &VectorN) -> Option<VectorN> {
        let rhs = MatrixN::from_columns(std::slice::from_ref(b));
        self.solve_matrix(&rhs).map(|x| x.column(0))
    }

    /// Solves `self * X = B` column by column.
    pub fn solve_matrix(&self, b: &MatrixN) -> Option<MatrixN> {
        if !self.is_square() || self.rows != b.rows {
            return None;
        }
        let n = self.rows;
        let m = b.cols;
        let mut a = self.clone();
        let mut x = b.clone();
        let singular = 1e-14 * a.max_abs().max(1.0);

        for k in 0..n {
            let pivot_row = (k..n)
                .max_by(|&i, &j| a[(i, k)].abs().total_cmp(&a[(j, k)].abs()))
                .unwrap_or(k);
            if a[(pivot_row, k)].abs() <= singular {
                return None;
            }
            if pivot_row != k {
                a.swap_rows(k, pivot_row);
                x.swap_rows(k, pivot_row);
            }
            let pivot = a[(k, k)];
            for i in (k + 1)..n {
                let factor = a[(i, k)] / pivot;
                if factor == 0.0 {
                    continue;
                }
                for c in k..n {
                    let v = a[(k, c)];
                    a[(i, c)] -= factor * v;
                }
                for c in 0..m {
                    let v = x[(k, c)];
                    x[(i, c)] -= factor * v;
                }
            }
        }

        for c in 0..m {
            for k in (0..n).rev() {
                let mut sum = x[(k, c)];
                for j in (k + 1)..n {
                    sum -= a[(k, j)] * x[(j, c)];
                }
                x[(k, c)] = sum / a[(k, k)];
            }
        }
        Some(x)
    }

    pub fn swap_rows(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        for c in 0..self.cols {
            self.data.swap(a * self.cols + c, b * self.cols + c);
        }
    }
}

impl Index<(usize, usize)> for MatrixN {
    type Output = f64;

    fn index(&self, (r, c): (usize, usize)) -> &f64 {
        &self.data[r * self.cols + c]
    }
}

impl IndexMut<(usize, usize)> for MatrixN {
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut f64 {
        &mut self.data[r * self.cols + c]
    }
}

impl<I: SliceIndex<[f64]>> Index<I> for VectorN {
    type Output = I::Output;

    fn index(&self, index: I) -> &I::Output {
        &self.0[index]
    }
}

impl<I: SliceIndex<[f64]>> IndexMut<I> for VectorN {
    fn index_mut(&mut self, index: I) -> &mut I::Output {
        &mut self.0[index]
    }
}

use num::traits::Zero;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

/// Row-major 2D storage. Used both for symbol batches and for weight matrices.
///
/// `items.len() == rows() * cols()` always holds, including after deserialization.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, PartialOrd)]
#[serde(try_from = "MatrixParts<T>")]
pub struct Matrix<T> {
    nrows: usize,
    ncols: usize,
    items: Vec<T>,
}

// Unchecked wire form of `Matrix`.
#[derive(Deserialize)]
struct MatrixParts<T> {
    nrows: usize,
    ncols: usize,
    items: Vec<T>,
}

impl<T> TryFrom<MatrixParts<T>> for Matrix<T> {
    type Error = String;

    fn try_from(parts: MatrixParts<T>) -> Result<Self, Self::Error> {
        match parts.nrows.checked_mul(parts.ncols) {
            Some(n) if n == parts.items.len() => Ok(Matrix {
                nrows: parts.nrows,
                ncols: parts.ncols,
                items: parts.items,
            }),
            _ => Err(format!(
                "matrix of {}x{} cannot hold {} items",
                parts.nrows,
                parts.ncols,
                parts.items.len()
            )),
        }
    }
}

impl<T: Clone> Matrix<T> {
    pub fn replicate(item: T, rows: usize, cols: usize) -> Self {
        Self {
            nrows: rows,
            ncols: cols,
            items: vec![item; rows * cols],
        }
    }

    pub fn clone_from_slice(&mut self, slice: &[T]) {
        assert_eq!(slice.len(), self.items.len());
        self.items.clone_from_slice(slice);
    }

    pub fn rows(&self) -> usize {
        self.nrows
    }

    pub fn cols(&self) -> usize {
        self.ncols
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn at(&self, row: usize, col: usize) -> &T {
        &self.items[row * self.ncols + col]
    }

    #[inline]
    pub fn at_mut(&mut self, row: usize, col: usize) -> &mut T {
        &mut self.items[row * self.ncols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: T) {
        self.items[row * self.ncols + col] = value;
    }

    #[inline]
    pub fn row(&self, row: usize) -> &[T] {
        &self.items[row * self.ncols..(row + 1) * self.ncols]
    }

    #[inline]
    pub fn row_mut(&mut self, row: usize) -> &mut [T] {
        &mut self.items[row * self.ncols..(row + 1) * self.ncols]
    }

    /// Iterates rows in order. Yields `rows()` slices even when `cols()` is zero.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[T]> + '_ {
        (0..self.nrows).map(move |r| self.row(r))
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.items
    }
}

impl<T: Clone + Zero> Matrix<T> {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::replicate(T::zero(), rows, cols)
    }
}

impl Matrix<f64> {
    /// `out += self * v`, where `v.len() == cols()` and `out.len() == rows()`.
    #[inline]
    pub fn mul_vec_add(&self, v: &[f64], out: &mut [f64]) {
        debug_assert_eq!(v.len(), self.ncols);
        debug_assert_eq!(out.len(), self.nrows);
        for (r, o) in out.iter_mut().enumerate() {
            let row = self.row(r);
            let mut sum = 0.0;
            for c in 0..self.ncols {
                sum += row[c] * v[c];
            }
            *o += sum;
        }
    }

    /// `out += self^T * v`, where `v.len() == rows()` and `out.len() == cols()`.
    #[inline]
    pub fn transpose_mul_vec_add(&self, v: &[f64], out: &mut [f64]) {
        debug_assert_eq!(v.len(), self.nrows);
        debug_assert_eq!(out.len(), self.ncols);
        for r in 0..self.nrows {
            let vr = v[r];
            if vr == 0.0 {
                continue;
            }
            let row = self.row(r);
            for c in 0..self.ncols {
                out[c] += row[c] * vr;
            }
        }
    }

    /// `self += a b^T` (outer product accumulation).
    #[inline]
    pub fn add_outer(&mut self, a: &[f64], b: &[f64]) {
        debug_assert_eq!(a.len(), self.nrows);
        debug_assert_eq!(b.len(), self.ncols);
        for r in 0..self.nrows {
            let ar = a[r];
            if ar == 0.0 {
                continue;
            }
            let row = self.row_mut(r);
            for c in 0..row.len() {
                row[c] += ar * b[c];
            }
        }
    }
}

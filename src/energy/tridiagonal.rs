//! Tridiagonal systems for implicit column solves.

use crate::error::{IceError, Result};

/// A tridiagonal system `a[k] x[k-1] + b[k] x[k] + c[k] x[k+1] = r[k]`.
///
/// `a[0]` and `c[n-1]` are ignored.
#[derive(Clone, Debug, Default)]
pub struct TridiagonalSystem {
    pub a: Vec<f64>,
    pub b: Vec<f64>,
    pub c: Vec<f64>,
    pub r: Vec<f64>,
    gamma: Vec<f64>,
}

impl TridiagonalSystem {
    pub fn new(n: usize) -> Self {
        Self {
            a: vec![0.0; n],
            b: vec![0.0; n],
            c: vec![0.0; n],
            r: vec![0.0; n],
            gamma: vec![0.0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.b.len()
    }

    pub fn is_empty(&self) -> bool {
        self.b.is_empty()
    }

    /// Solve the first `n` equations into `x` (Thomas algorithm).
    pub fn solve(&mut self, n: usize, x: &mut [f64]) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        let pivot_error = |k: usize| IceError::NotConverged {
            component: format!("tridiagonal solve (zero pivot at row {})", k),
            iterations: 0,
        };
        let mut beta = self.b[0];
        if beta == 0.0 {
            return Err(pivot_error(0));
        }
        x[0] = self.r[0] / beta;
        for k in 1..n {
            self.gamma[k] = self.c[k - 1] / beta;
            beta = self.b[k] - self.a[k] * self.gamma[k];
            if beta == 0.0 {
                return Err(pivot_error(k));
            }
            x[k] = (self.r[k] - self.a[k] * x[k - 1]) / beta;
        }
        for k in (0..n - 1).rev() {
            x[k] -= self.gamma[k + 1] * x[k + 1];
        }
        Ok(())
    }
}

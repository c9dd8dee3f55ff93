//! Square-matrix helpers for propagator algebra.
//!
//! Propagator dimensions depend on the exchange topology and are only known at
//! runtime, so every composition checks that the operands agree.

use nalgebra::{DMatrix, DVector};

use crate::error::AppError;

/// `m^n` by repeated squaring. `m^0` is the identity.
pub fn matrix_power(m: &DMatrix<f64>, n: u32) -> DMatrix<f64> {
    let dim = m.nrows();
    let mut result = DMatrix::<f64>::identity(dim, dim);
    let mut base = m.clone();
    let mut e = n;
    while e > 0 {
        if e & 1 == 1 {
            result = &result * &base;
        }
        e >>= 1;
        if e > 0 {
            base = &base * &base;
        }
    }
    result
}

/// Apply a chain of propagators to a vector, right to left.
///
/// `chain = [A, B, C]` computes `A · B · C · v`, matching the way pulse
/// sequences are written (last element acts first).
pub fn apply_chain(chain: &[&DMatrix<f64>], v: &DVector<f64>) -> Result<DVector<f64>, AppError> {
    let mut out = v.clone();
    for m in chain.iter().rev() {
        if m.nrows() != m.ncols() || m.ncols() != out.len() {
            return Err(AppError::numerical(format!(
                "Propagator dimension mismatch: {}x{} applied to vector of length {}.",
                m.nrows(),
                m.ncols(),
                out.len()
            )));
        }
        out = *m * out;
    }
    Ok(out)
}

/// Check that a matrix is square with the expected dimension.
pub fn ensure_dim(m: &DMatrix<f64>, dim: usize, what: &str) -> Result<(), AppError> {
    if m.nrows() == dim && m.ncols() == dim {
        Ok(())
    } else {
        Err(AppError::numerical(format!(
            "Propagator '{what}' is {}x{}, expected {dim}x{dim}.",
            m.nrows(),
            m.ncols()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_power_matches_repeated_product() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 0.0, 1.0]);
        let p = matrix_power(&m, 5);
        assert_eq!(p, DMatrix::from_row_slice(2, 2, &[1.0, 5.0, 0.0, 1.0]));
        assert_eq!(matrix_power(&m, 0), DMatrix::identity(2, 2));
    }

    #[test]
    fn apply_chain_acts_right_to_left() {
        let a = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 1.0, 0.0]);
        let b = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 1.0]);
        let v = DVector::from_row_slice(&[1.0, 0.0]);
        // b first doubles x, then a swaps.
        let out = apply_chain(&[&a, &b], &v).unwrap();
        assert_eq!(out, DVector::from_row_slice(&[0.0, 2.0]));
    }

    #[test]
    fn apply_chain_rejects_mismatched_dimensions() {
        let a = DMatrix::<f64>::identity(3, 3);
        let v = DVector::from_row_slice(&[1.0, 0.0]);
        let err = apply_chain(&[&a], &v).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_NUMERICAL);
    }
}

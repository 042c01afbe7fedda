use crate::PfError;

/// Floating point type used throughout system
pub type Real = f64;

/// One tolerance for everything
#[derive(Clone, Copy, Debug)]
pub struct Tolerances {
    pub abs: Real,
    pub rel: Real,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-9,
            rel: 1e-9,
        }
    }
}

pub fn nearly_equal(a: Real, b: Real, tol: Tolerances) -> bool {
    let diff = (a - b).abs();
    if diff <= tol.abs {
        return true;
    }
    diff <= tol.rel * a.abs().max(b.abs())
}

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, PfError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(PfError::NonFinite { what, value: v })
    }
}

/// Reject values outside `[0, 1]`.
pub fn ensure_unit_interval(v: Real, what: &str) -> Result<Real, PfError> {
    if (0.0..=1.0).contains(&v) {
        Ok(v)
    } else {
        Err(PfError::OutOfRange {
            what: what.to_string(),
            value: v,
            expected: "[0, 1]",
        })
    }
}

/// Rescale factor that brings a summed demand back within `available`.
///
/// Returns 1 when the demand fits, otherwise `available / demand`.
pub fn rationing_factor(demand: Real, available: Real) -> Real {
    if demand > available && demand > 0.0 {
        (available / demand).max(0.0)
    } else {
        1.0
    }
}

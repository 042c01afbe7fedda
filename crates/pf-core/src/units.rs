// pf-core/src/units.rs

use uom::si::f64::Time as UomTime;
use uom::si::time::year;

/// Canonical time type. Model time is expressed in years.
pub type Time = UomTime;

#[inline]
pub fn years(v: f64) -> Time {
    Time::new::<year>(v)
}

#[inline]
pub fn in_years(t: Time) -> f64 {
    t.get::<year>()
}

/// Number of whole steps of length `dt` spanning `duration`, rounded to nearest.
///
/// Never returns zero: a residence shorter than half a step still occupies one bin.
pub fn steps_in(duration: Time, dt: Time) -> usize {
    let ratio = in_years(duration) / in_years(dt);
    (ratio.round() as usize).max(1)
}

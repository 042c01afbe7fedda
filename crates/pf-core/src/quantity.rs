//! Parameter values with a semantic format and a timescale.
//!
//! Probability and Number values are "per `timescale` years" and must be
//! converted to a per-step value before they can drive a flow. Proportions
//! are dimensionless and never time-scaled. Durations only define the bin
//! count of a timed compartment.

use crate::error::{PfError, PfResult};
use crate::numeric::{Real, ensure_finite, ensure_unit_interval};
use crate::units::{Time, in_years, steps_in, years};

/// Semantic format of a parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Format {
    Number,
    Probability,
    Proportion,
    Duration,
}

impl Format {
    /// Formats whose magnitude must lie in `[0, 1]`.
    pub fn is_bounded(self) -> bool {
        matches!(self, Format::Probability | Format::Proportion)
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Format::Number => "number",
            Format::Probability => "probability",
            Format::Proportion => "proportion",
            Format::Duration => "duration",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantity {
    pub magnitude: Real,
    pub format: Format,
    /// Period the magnitude refers to (1 year unless stated otherwise).
    pub timescale: Time,
}

impl Quantity {
    pub fn new(magnitude: Real, format: Format) -> Self {
        Self {
            magnitude,
            format,
            timescale: years(1.0),
        }
    }

    pub fn with_timescale(mut self, timescale: Time) -> Self {
        self.timescale = timescale;
        self
    }

    pub fn number(magnitude: Real) -> Self {
        Self::new(magnitude, Format::Number)
    }

    pub fn probability(magnitude: Real) -> Self {
        Self::new(magnitude, Format::Probability)
    }

    pub fn proportion(magnitude: Real) -> Self {
        Self::new(magnitude, Format::Proportion)
    }

    pub fn duration(magnitude: Real) -> Self {
        Self::new(magnitude, Format::Duration)
    }

    /// Check the magnitude against its format's declared range.
    ///
    /// `what` names the parameter in the error message.
    pub fn validate(&self, what: &str) -> PfResult<()> {
        ensure_finite(self.magnitude, "quantity magnitude")?;
        if in_years(self.timescale) <= 0.0 {
            return Err(PfError::InvalidArg {
                what: "timescale must be positive",
            });
        }
        if self.format.is_bounded() {
            ensure_unit_interval(self.magnitude, what)?;
        } else if self.magnitude < 0.0 {
            return Err(PfError::OutOfRange {
                what: what.to_string(),
                value: self.magnitude,
                expected: ">= 0",
            });
        }
        Ok(())
    }

    /// Probability of transition within one step of length `dt`.
    pub fn step_probability(&self, dt: Time) -> PfResult<Real> {
        if self.format != Format::Probability {
            return Err(PfError::InvalidArg {
                what: "step probability requires a probability quantity",
            });
        }
        let timescale = in_years(self.timescale);
        let annual = if timescale == 1.0 {
            self.magnitude
        } else {
            1.0 - (1.0 - self.magnitude).powf(1.0 / timescale)
        };
        Ok(1.0 - (1.0 - annual).powf(in_years(dt)))
    }

    /// Number of people moved within one step of length `dt`, uncapped.
    pub fn step_number(&self, dt: Time) -> PfResult<Real> {
        if self.format != Format::Number {
            return Err(PfError::InvalidArg {
                what: "step number requires a number quantity",
            });
        }
        Ok(self.magnitude / in_years(self.timescale) * in_years(dt))
    }

    /// Duration expressed as a span of model time.
    pub fn as_duration(&self) -> PfResult<Time> {
        if self.format != Format::Duration {
            return Err(PfError::InvalidArg {
                what: "duration requires a duration quantity",
            });
        }
        Ok(years(self.magnitude * in_years(self.timescale)))
    }

    /// Number of residence bins a duration occupies at step size `dt`.
    pub fn bin_count(&self, dt: Time) -> PfResult<usize> {
        Ok(steps_in(self.as_duration()?, dt))
    }

    /// Per-step flow amount given the population eligible for it.
    ///
    /// Proportions pass through unchanged. Numbers are not capped against
    /// `eligible`; the caller rations them. Durations do not produce a flow.
    pub fn to_timestep_amount(&self, dt: Time, eligible: Real) -> PfResult<Real> {
        match self.format {
            Format::Proportion => Ok(self.magnitude),
            Format::Probability => Ok(self.step_probability(dt)? * eligible),
            Format::Number => self.step_number(dt),
            Format::Duration => Err(PfError::InvalidArg {
                what: "duration quantities do not produce a flow amount",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::{Tolerances, nearly_equal};

    fn tol() -> Tolerances {
        Tolerances {
            abs: 1e-12,
            rel: 1e-9,
        }
    }

    #[test]
    fn probability_unit_step_is_unchanged() {
        let q = Quantity::probability(0.3);
        let amount = q.to_timestep_amount(years(1.0), 200.0).unwrap();
        assert!(nearly_equal(amount, 60.0, tol()));
    }

    #[test]
    fn probability_sub_year_step() {
        let q = Quantity::probability(0.75);
        let p = q.step_probability(years(0.5)).unwrap();
        assert!(nearly_equal(p, 0.5, tol()));
    }

    #[test]
    fn probability_timescale_is_annualized_first() {
        // 0.75 over two years is 0.5 per year
        let q = Quantity::probability(0.75).with_timescale(years(2.0));
        let p = q.step_probability(years(1.0)).unwrap();
        assert!(nearly_equal(p, 0.5, tol()));
    }

    #[test]
    fn number_scales_with_dt_and_timescale() {
        let q = Quantity::number(120.0);
        assert!(nearly_equal(q.step_number(years(0.25)).unwrap(), 30.0, tol()));

        let per_month = Quantity::number(10.0).with_timescale(years(1.0 / 12.0));
        assert!(nearly_equal(
            per_month.step_number(years(1.0)).unwrap(),
            120.0,
            tol()
        ));
    }

    #[test]
    fn number_is_not_capped() {
        let q = Quantity::number(290.0);
        let amount = q.to_timestep_amount(years(1.0), 90.0).unwrap();
        assert!(nearly_equal(amount, 290.0, tol()));
    }

    #[test]
    fn proportion_is_not_time_scaled() {
        let q = Quantity::proportion(0.4);
        assert_eq!(q.to_timestep_amount(years(0.1), 1000.0).unwrap(), 0.4);
    }

    #[test]
    fn duration_defines_bins() {
        let q = Quantity::duration(10.0);
        assert_eq!(q.bin_count(years(1.0)).unwrap(), 10);
        assert_eq!(q.bin_count(years(0.5)).unwrap(), 20);
        assert!(q.to_timestep_amount(years(1.0), 1.0).is_err());
    }

    #[test]
    fn out_of_range_rejected() {
        let err = Quantity::probability(1.2).validate("p_death").unwrap_err();
        assert!(matches!(err, PfError::OutOfRange { .. }));
        assert!(format!("{err}").contains("p_death"));
        assert!(Quantity::proportion(-0.1).validate("split").is_err());
        assert!(Quantity::number(-5.0).validate("n").is_err());
        assert!(Quantity::number(500.0).validate("n").is_ok());
    }
}

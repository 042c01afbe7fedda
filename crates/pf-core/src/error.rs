use thiserror::Error;

pub type PfResult<T> = Result<T, PfError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PfError {
    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Parameter out of range: {what} = {value} (expected {expected})")]
    OutOfRange {
        what: String,
        value: f64,
        expected: &'static str,
    },

    #[error("Invariant violated: {what}")]
    Invariant { what: String },
}

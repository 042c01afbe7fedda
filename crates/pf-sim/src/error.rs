//! Error types for simulation operations.

use pf_core::PfError;
use pf_graph::GraphError;
use thiserror::Error;

/// Errors encountered while stepping a model.
///
/// Runtime variants carry the index of the step being resolved and the
/// name of the offending compartment, junction or parameter.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Run step size {run} does not match the graph step size {graph}")]
    StepMismatch { run: f64, graph: f64 },

    #[error("Step {step}: compartment '{compartment}' would have negative size {value}")]
    NegativeSize {
        step: usize,
        compartment: String,
        value: f64,
    },

    #[error("Parameter '{parameter}' drives no transitions; source popsize is undefined")]
    SourcePopsizeUndefined { parameter: String },

    #[error("Step {step}: parameter '{parameter}' has no value at t={t}")]
    MissingParameter {
        step: usize,
        parameter: String,
        t: f64,
    },

    #[error("Step {step}: parameter '{parameter}' is out of range: {reason}")]
    ParameterOutOfRange {
        step: usize,
        parameter: String,
        reason: String,
    },

    #[error("Step {step}: junction '{junction}' received {inflow} but its outflow proportions sum to zero")]
    JunctionBlocked {
        step: usize,
        junction: String,
        inflow: f64,
    },

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Core error: {0}")]
    Core(#[from] PfError),
}

pub type SimResult<T> = Result<T, SimError>;

//! Per-step parameter evaluation.

use std::collections::HashMap;

use pf_core::ParamId;
use pf_graph::{Graph, Parameter, ParameterValue};

use crate::error::{SimError, SimResult};

/// Supplies parameter magnitudes at a point in model time.
///
/// This is the seam to an external evaluator. Magnitudes are in the
/// parameter's own format and timescale; conversion to per-step amounts
/// happens during resolution.
pub trait ParameterSource {
    /// Magnitude of `parameter` at time `t` (years), or `None` if unknown.
    fn magnitude(&self, parameter: &Parameter, t: f64) -> Option<f64>;
}

impl<F> ParameterSource for F
where
    F: Fn(&Parameter, f64) -> Option<f64>,
{
    fn magnitude(&self, parameter: &Parameter, t: f64) -> Option<f64> {
        self(parameter, t)
    }
}

/// Declared parameter values with optional per-parameter overrides.
///
/// Overrides replace the value built into the graph; this is how
/// `External` parameters get their values and how targetable parameters
/// are adjusted without rebuilding the topology.
#[derive(Debug, Clone, Default)]
pub struct ParameterTable {
    overrides: HashMap<ParamId, ParameterValue>,
}

impl ParameterTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, id: ParamId, value: ParameterValue) {
        self.overrides.insert(id, value);
    }

    pub fn get(&self, id: ParamId) -> Option<&ParameterValue> {
        self.overrides.get(&id)
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

impl ParameterSource for ParameterTable {
    fn magnitude(&self, parameter: &Parameter, t: f64) -> Option<f64> {
        self.overrides
            .get(&parameter.id)
            .unwrap_or(&parameter.value)
            .interpolate(t)
    }
}

/// Evaluate every link-driving parameter for one step.
///
/// Returns magnitudes indexed by parameter. Parameters that drive no link
/// are left at zero. Values are range-checked against their format.
pub fn evaluate_parameters<P: ParameterSource + ?Sized>(
    graph: &Graph,
    source: &P,
    step: usize,
    t: f64,
) -> SimResult<Vec<f64>> {
    let mut values = vec![0.0; graph.parameters().len()];
    for parameter in graph.parameters() {
        if graph.links_for_parameter(parameter.id).is_empty() {
            continue;
        }
        let value = source
            .magnitude(parameter, t)
            .ok_or_else(|| SimError::MissingParameter {
                step,
                parameter: parameter.name.clone(),
                t,
            })?;
        parameter
            .quantity(value)
            .validate(&parameter.name)
            .map_err(|e| SimError::ParameterOutOfRange {
                step,
                parameter: parameter.name.clone(),
                reason: e.to_string(),
            })?;
        values[parameter.id.idx()] = value;
    }
    Ok(values)
}

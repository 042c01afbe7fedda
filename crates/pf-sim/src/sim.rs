//! Simulation runner and result recording.

use pf_core::{CompartmentId, LinkId, ParamId, Tolerances, in_years, nearly_equal};
use pf_graph::Graph;

use crate::error::{SimError, SimResult};
use crate::params::{ParameterSource, evaluate_parameters};
use crate::resolve::{StepFlows, resolve_step, source_popsize};
use crate::state::ModelState;

/// Options for simulation runs.
#[derive(Clone, Debug)]
pub struct SimOptions {
    /// Start of the run (years)
    pub t_start: f64,
    /// End of the run (years)
    pub t_end: f64,
    /// Fixed time step (years); must match the step the graph was built for
    pub dt: f64,
    /// Maximum number of steps (safety limit)
    pub max_steps: usize,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            t_start: 2000.0,
            t_end: 2030.0,
            dt: 1.0,
            max_steps: 100_000,
        }
    }
}

/// Record of simulation results.
///
/// `states` has one entry per time point; `flows[i]` moved the model from
/// `states[i]` to `states[i + 1]`.
#[derive(Clone, Debug)]
pub struct SimRecord {
    /// Time points (years)
    pub t: Vec<f64>,
    pub states: Vec<ModelState>,
    pub flows: Vec<StepFlows>,
}

impl SimRecord {
    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    pub fn size(&self, compartment: CompartmentId, ti: usize) -> Option<f64> {
        self.states
            .get(ti)?
            .compartment(compartment)
            .map(|c| c.total_size())
    }

    pub fn bins(&self, compartment: CompartmentId, ti: usize) -> Option<&[f64]> {
        self.states.get(ti)?.compartment(compartment)?.bins()
    }

    /// Flow over `link` during step `ti` (from `t[ti]` to `t[ti + 1]`).
    pub fn flow(&self, link: LinkId, ti: usize) -> Option<f64> {
        self.flows.get(ti).map(|f| f.flow(link))
    }

    /// Size of a compartment at every time point.
    pub fn series(&self, compartment: CompartmentId) -> Vec<f64> {
        self.states.iter().map(|s| s.size(compartment)).collect()
    }

    pub fn source_popsize(&self, graph: &Graph, parameter: ParamId, ti: usize) -> SimResult<f64> {
        let state = self.states.get(ti).ok_or(SimError::InvalidArg {
            what: "time index out of range",
        })?;
        source_popsize(graph, state, parameter)
    }
}

/// Run a simulation from `t_start` to `t_end`.
pub fn run_sim<P: ParameterSource + ?Sized>(
    graph: &Graph,
    params: &P,
    opts: &SimOptions,
) -> SimResult<SimRecord> {
    if !opts.dt.is_finite() || opts.dt <= 0.0 {
        return Err(SimError::InvalidArg {
            what: "dt must be positive",
        });
    }
    if !opts.t_start.is_finite() || !opts.t_end.is_finite() || opts.t_end < opts.t_start {
        return Err(SimError::InvalidArg {
            what: "t_end must not precede t_start",
        });
    }
    if opts.max_steps == 0 {
        return Err(SimError::InvalidArg {
            what: "max_steps must be positive",
        });
    }
    let graph_dt = in_years(graph.dt());
    if !nearly_equal(opts.dt, graph_dt, Tolerances::default()) {
        return Err(SimError::StepMismatch {
            run: opts.dt,
            graph: graph_dt,
        });
    }

    // Step count from the span, so accumulated round-off can't add a step
    let wanted = ((opts.t_end - opts.t_start) / opts.dt).round() as usize;
    let steps = wanted.min(opts.max_steps);
    if steps < wanted {
        tracing::warn!(wanted, max_steps = opts.max_steps, "run truncated at max_steps");
    }

    tracing::info!(
        t_start = opts.t_start,
        t_end = opts.t_end,
        dt = opts.dt,
        steps,
        compartments = graph.compartments().len(),
        "starting simulation"
    );

    let mut state = ModelState::initial(graph, params, opts.t_start)?;
    let mut t_record = Vec::with_capacity(steps + 1);
    let mut states = Vec::with_capacity(steps + 1);
    let mut flows = Vec::with_capacity(steps);
    t_record.push(opts.t_start);

    for step in 0..steps {
        let t = opts.t_start + step as f64 * opts.dt;
        let values = evaluate_parameters(graph, params, step, t)?;
        let (step_flows, mut next) = resolve_step(graph, &state, &values, step)?;
        next.t = opts.t_start + (step + 1) as f64 * opts.dt;

        t_record.push(next.t);
        states.push(std::mem::replace(&mut state, next));
        flows.push(step_flows);
    }
    states.push(state);

    tracing::info!(steps, "simulation finished");

    Ok(SimRecord {
        t: t_record,
        states,
        flows,
    })
}

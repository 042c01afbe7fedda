//! Per-step link resolution.
//!
//! Each compartment's outflows are resolved independently from the state
//! at `t`: demands become fractions of the pool each link is eligible for,
//! and competing fractions are rationed so no pool is overdrawn. Junctions
//! then pass their inflow through, and only after every flow is known is
//! the state at `t + dt` assembled.

use pf_core::{
    CompartmentId, Format, LinkId, ParamId, Tolerances, in_years, rationing_factor,
};
use pf_graph::{Compartment, CompartmentKind, Eligibility, Graph, Link};
use rayon::prelude::*;

use crate::error::{SimError, SimResult};
use crate::junction;
use crate::state::{CompartmentState, ModelState};
use crate::timed;

/// Resolved flow over one link for one step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkFlow {
    /// People moved this step (not annualised).
    pub total: f64,
    /// Flow by source residence bin. Empty unless the link leaves a timed
    /// compartment or a junction attached to a duration group.
    pub by_bin: Vec<f64>,
}

/// Every link's resolved flow for one step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepFlows {
    pub links: Vec<LinkFlow>,
}

impl StepFlows {
    pub fn flow(&self, link: LinkId) -> f64 {
        self.links.get(link.idx()).map_or(0.0, |f| f.total)
    }

    pub fn by_bin(&self, link: LinkId) -> &[f64] {
        self.links.get(link.idx()).map_or(&[], |f| f.by_bin.as_slice())
    }

    pub fn inflow(&self, graph: &Graph, compartment: CompartmentId) -> f64 {
        graph.inflows(compartment).iter().map(|&l| self.flow(l)).sum()
    }

    pub fn outflow(&self, graph: &Graph, compartment: CompartmentId) -> f64 {
        graph.outflows(compartment).iter().map(|&l| self.flow(l)).sum()
    }
}

fn is_storage(kind: CompartmentKind) -> bool {
    matches!(kind, CompartmentKind::Ordinary | CompartmentKind::Timed { .. })
}

/// Pool a parameter's demand is shared across, or `None` if it drives no
/// link out of a stored population.
fn popsize(graph: &Graph, state: &ModelState, parameter: ParamId) -> Option<f64> {
    let links = graph.links_for_parameter(parameter);
    let mut sources: Vec<CompartmentId> = links
        .iter()
        .map(|&l| graph.links()[l.idx()].source)
        .filter(|&c| is_storage(graph.compartments()[c.idx()].kind))
        .collect();
    sources.sort();
    sources.dedup();
    if sources.is_empty() {
        return None;
    }

    let pool = sources
        .iter()
        .map(|&c| {
            // Only a compartment whose links all skip the final bin is counted without it
            let all_non_final = links
                .iter()
                .filter(|&&l| graph.links()[l.idx()].source == c)
                .all(|&l| graph.eligibility(l) == Eligibility::NonFinal);
            let eligibility = if all_non_final {
                Eligibility::NonFinal
            } else {
                Eligibility::Full
            };
            state.compartments[c.idx()].eligible(eligibility)
        })
        .sum();
    Some(pool)
}

/// Population a parameter's demand is disaggregated over at this state.
///
/// Sums each source compartment once. A compartment contributes its size
/// less its final bin when every link of this parameter leaving it is a
/// timed link, and its full size otherwise.
pub fn source_popsize(graph: &Graph, state: &ModelState, parameter: ParamId) -> SimResult<f64> {
    popsize(graph, state, parameter).ok_or_else(|| SimError::SourcePopsizeUndefined {
        parameter: graph
            .parameter(parameter)
            .map_or_else(|| parameter.to_string(), |p| p.name.clone()),
    })
}

/// Fraction of its eligible pool a link asks for this step, before rationing.
fn demand_fraction(
    graph: &Graph,
    values: &[f64],
    popsizes: &[Option<f64>],
    link: &Link,
) -> SimResult<f64> {
    let parameter = &graph.parameters()[link.parameter.idx()];
    let quantity = parameter.quantity(values[parameter.id.idx()]);
    match parameter.format {
        // Per unit of eligible population
        Format::Probability => Ok(quantity.to_timestep_amount(graph.dt(), 1.0)?),
        Format::Number => {
            let pool = popsizes[parameter.id.idx()].unwrap_or(0.0);
            if pool <= 0.0 {
                return Ok(0.0);
            }
            let siblings = graph
                .outflows(link.source)
                .iter()
                .filter(|&&l| graph.links()[l.idx()].parameter == parameter.id)
                .count()
                .max(1);
            Ok(quantity.to_timestep_amount(graph.dt(), pool)? / pool / siblings as f64)
        }
        Format::Proportion | Format::Duration => Ok(0.0),
    }
}

fn resolve_outflows(
    graph: &Graph,
    state: &ModelState,
    values: &[f64],
    popsizes: &[Option<f64>],
    compartment: &Compartment,
    step: usize,
) -> SimResult<Vec<(LinkId, LinkFlow)>> {
    let outflows = graph.outflows(compartment.id);
    if outflows.is_empty() {
        return Ok(Vec::new());
    }
    let link = move |l: LinkId| &graph.links()[l.idx()];

    match &state.compartments[compartment.id.idx()] {
        CompartmentState::Source => outflows
            .iter()
            .map(|&l| -> SimResult<(LinkId, LinkFlow)> {
                let parameter = &graph.parameters()[link(l).parameter.idx()];
                // Sources have no pool; the amount is never capped
                let amount = parameter
                    .quantity(values[parameter.id.idx()])
                    .to_timestep_amount(graph.dt(), 0.0)?;
                Ok((
                    l,
                    LinkFlow {
                        total: amount,
                        by_bin: Vec::new(),
                    },
                ))
            })
            .collect(),

        CompartmentState::Ordinary { size } => {
            let fractions = outflows
                .iter()
                .map(|&l| demand_fraction(graph, values, popsizes, link(l)))
                .collect::<SimResult<Vec<_>>>()?;
            let scale = rationing_factor(fractions.iter().sum(), 1.0);
            if scale < 1.0 {
                tracing::debug!(
                    step,
                    compartment = %compartment.name,
                    scale,
                    "rescaled competing outflows"
                );
            }
            Ok(outflows
                .iter()
                .zip(fractions)
                .map(|(&l, f)| {
                    (
                        l,
                        LinkFlow {
                            total: f * scale * size,
                            by_bin: Vec::new(),
                        },
                    )
                })
                .collect())
        }

        CompartmentState::Timed { bins } => {
            let Some(last) = bins.len().checked_sub(1) else {
                return Ok(Vec::new());
            };
            let flush = graph.flush_link(compartment.id);

            let mut competing = Vec::with_capacity(outflows.len());
            for &l in outflows.iter().filter(|&&l| Some(l) != flush) {
                let fraction = demand_fraction(graph, values, popsizes, link(l))?;
                competing.push((l, graph.eligibility(l), fraction));
            }

            // Non-final bins are contested by every link; the final bin only
            // by links eligible for the whole compartment.
            let non_final_scale =
                rationing_factor(competing.iter().map(|&(_, _, f)| f).sum(), 1.0);
            let final_scale = rationing_factor(
                competing
                    .iter()
                    .filter(|&&(_, e, _)| e == Eligibility::Full)
                    .map(|&(_, _, f)| f)
                    .sum(),
                1.0,
            );
            if non_final_scale < 1.0 || final_scale < 1.0 {
                tracing::debug!(
                    step,
                    compartment = %compartment.name,
                    non_final_scale,
                    final_scale,
                    "rescaled competing outflows"
                );
            }

            let mut resolved = Vec::with_capacity(outflows.len());
            let mut final_taken = 0.0;
            for (l, eligibility, fraction) in competing {
                let mut by_bin: Vec<f64> = bins
                    .iter()
                    .map(|b| fraction * non_final_scale * b)
                    .collect();
                by_bin[last] = if eligibility == Eligibility::Full {
                    fraction * final_scale * bins[last]
                } else {
                    0.0
                };
                final_taken += by_bin[last];
                resolved.push((
                    l,
                    LinkFlow {
                        total: by_bin.iter().sum(),
                        by_bin,
                    },
                ));
            }

            if let Some(flush) = flush {
                let mut by_bin = vec![0.0; bins.len()];
                by_bin[last] = (bins[last] - final_taken).max(0.0);
                resolved.push((
                    flush,
                    LinkFlow {
                        total: by_bin[last],
                        by_bin,
                    },
                ));
            }
            Ok(resolved)
        }

        CompartmentState::Sink { .. } | CompartmentState::Junction => Ok(Vec::new()),
    }
}

/// Reject sizes below zero beyond tolerance, then clamp round-off.
fn checked_size(value: f64, scale: f64, step: usize, compartment: &Compartment) -> SimResult<f64> {
    let tol = Tolerances::default();
    if value.is_nan() || value < -(tol.abs + tol.rel * scale.abs()) {
        return Err(SimError::NegativeSize {
            step,
            compartment: compartment.name.clone(),
            value,
        });
    }
    Ok(value.max(0.0))
}

fn apply(graph: &Graph, state: &ModelState, flows: &StepFlows, step: usize) -> SimResult<ModelState> {
    let compartments = graph
        .compartments()
        .iter()
        .zip(&state.compartments)
        .map(|(c, current)| -> SimResult<CompartmentState> {
            let inflow = flows.inflow(graph, c.id);
            match current {
                CompartmentState::Ordinary { size } => {
                    let next = size + inflow - flows.outflow(graph, c.id);
                    Ok(CompartmentState::Ordinary {
                        size: checked_size(next, size + inflow, step, c)?,
                    })
                }
                CompartmentState::Sink { size } => Ok(CompartmentState::Sink {
                    size: size + inflow,
                }),
                CompartmentState::Timed { bins } => {
                    let k = bins.len();
                    let mut outflow_by_bin = vec![0.0; k];
                    for &l in graph.outflows(c.id) {
                        for (acc, v) in outflow_by_bin.iter_mut().zip(flows.by_bin(l)) {
                            *acc += v;
                        }
                    }

                    let mut aged = vec![0.0; k];
                    let mut fresh = 0.0;
                    for &l in graph.inflows(c.id) {
                        if let Some(flow) = flows.links.get(l.idx()) {
                            timed::place_arrival(graph.arrival(l), flow, &mut aged, &mut fresh);
                        }
                    }

                    let scale = current.total_size() + inflow;
                    let bins = timed::advance(bins, &outflow_by_bin, &aged, fresh)
                        .into_iter()
                        .map(|v| checked_size(v, scale, step, c))
                        .collect::<SimResult<Vec<_>>>()?;
                    Ok(CompartmentState::Timed { bins })
                }
                CompartmentState::Source => Ok(CompartmentState::Source),
                CompartmentState::Junction => Ok(CompartmentState::Junction),
            }
        })
        .collect::<SimResult<Vec<_>>>()?;

    Ok(ModelState {
        t: state.t + in_years(graph.dt()),
        compartments,
    })
}

/// Resolve one step: `(state_t, parameters_t) -> (flows_t, state_t+1)`.
///
/// `values` are parameter magnitudes indexed by parameter, as returned by
/// [`evaluate_parameters`](crate::params::evaluate_parameters). `step` is
/// only used to label errors and logs.
pub fn resolve_step(
    graph: &Graph,
    state: &ModelState,
    values: &[f64],
    step: usize,
) -> SimResult<(StepFlows, ModelState)> {
    if values.len() != graph.parameters().len() {
        return Err(SimError::InvalidArg {
            what: "one parameter value per graph parameter is required",
        });
    }
    if state.compartments.len() != graph.compartments().len() {
        return Err(SimError::InvalidArg {
            what: "state does not match graph compartments",
        });
    }

    let popsizes: Vec<Option<f64>> = graph
        .parameters()
        .iter()
        .map(|p| match p.format {
            Format::Number => popsize(graph, state, p.id),
            _ => None,
        })
        .collect();

    let outflows = graph
        .compartments()
        .par_iter()
        .map(|c| resolve_outflows(graph, state, values, &popsizes, c, step))
        .collect::<SimResult<Vec<_>>>()?;

    let mut links = vec![LinkFlow::default(); graph.links().len()];
    for (l, flow) in outflows.into_iter().flatten() {
        links[l.idx()] = flow;
    }
    junction::pass_through(graph, values, &mut links, step)?;

    let flows = StepFlows { links };
    let next = apply(graph, state, &flows, step)?;
    Ok((flows, next))
}

//! Zero-storage junction pass-through.

use pf_core::{CompartmentId, LinkId};
use pf_graph::Graph;

use crate::error::{SimError, SimResult};
use crate::resolve::LinkFlow;

/// Share of a junction's inflow sent down each outflow link.
///
/// Shares are the outflow proportions normalised to sum to one. A junction
/// whose proportions sum to zero can only pass zero inflow.
fn shares(
    graph: &Graph,
    junction: CompartmentId,
    values: &[f64],
    inflow: f64,
    step: usize,
) -> SimResult<Vec<(LinkId, f64)>> {
    let outflows = graph.outflows(junction);
    let weight = |l: LinkId| values[graph.links()[l.idx()].parameter.idx()];
    let total: f64 = outflows.iter().map(|&l| weight(l)).sum();

    if total <= 0.0 {
        if inflow > 0.0 {
            return Err(SimError::JunctionBlocked {
                step,
                junction: graph.compartments()[junction.idx()].name.clone(),
                inflow,
            });
        }
        return Ok(outflows.iter().map(|&l| (l, 0.0)).collect());
    }
    Ok(outflows.iter().map(|&l| (l, weight(l) / total)).collect())
}

/// Junction seeds as they reach storing compartments at t0.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Seeds {
    /// Arrivals spread like any other starting size.
    pub spread: Vec<f64>,
    /// Arrivals through group-attached junctions, due to flush in the first
    /// step.
    pub final_bin: Vec<f64>,
}

/// Push junction seeds downstream once, returning the amount each
/// compartment receives.
pub(crate) fn distribute_seeds(graph: &Graph, values: &[f64]) -> SimResult<Seeds> {
    let n = graph.compartments().len();
    let mut carried = vec![0.0; n];
    let mut seeds = Seeds {
        spread: vec![0.0; n],
        final_bin: vec![0.0; n],
    };

    for &j in graph.junction_order() {
        let amount = graph.compartments()[j.idx()].initial + carried[j.idx()];
        if amount == 0.0 {
            continue;
        }
        let attached = graph.group_of(j).is_some();
        for (link, share) in shares(graph, j, values, amount, 0)? {
            let dest = graph.links()[link.idx()].dest;
            let kind = graph.compartments()[dest.idx()].kind;
            if kind.is_junction() {
                carried[dest.idx()] += amount * share;
            } else if attached && kind.is_timed() {
                seeds.final_bin[dest.idx()] += amount * share;
            } else {
                seeds.spread[dest.idx()] += amount * share;
            }
        }
    }
    Ok(seeds)
}

/// Resolve junction outflows for one step, upstream junctions first.
///
/// Attached junctions also split their inflow by residence bin so that
/// age-preserving arrivals downstream land in the right bin.
pub(crate) fn pass_through(
    graph: &Graph,
    values: &[f64],
    flows: &mut [LinkFlow],
    step: usize,
) -> SimResult<()> {
    for &j in graph.junction_order() {
        let bin_count = graph
            .group_of(j)
            .and_then(|g| graph.group(g))
            .map_or(0, |g| g.bin_count);

        let mut inflow = 0.0;
        let mut inflow_bins = vec![0.0; bin_count];
        for &l in graph.inflows(j) {
            let flow = &flows[l.idx()];
            inflow += flow.total;
            if flow.by_bin.len() == bin_count {
                for (acc, v) in inflow_bins.iter_mut().zip(&flow.by_bin) {
                    *acc += v;
                }
            }
        }

        for (link, share) in shares(graph, j, values, inflow, step)? {
            flows[link.idx()] = LinkFlow {
                total: inflow * share,
                by_bin: inflow_bins.iter().map(|v| v * share).collect(),
            };
        }

        tracing::trace!(
            junction = %graph.compartments()[j.idx()].name,
            inflow,
            "junction pass-through"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pf_core::{Format, years};
    use pf_graph::GraphBuilder;

    #[test]
    fn seeds_follow_chained_proportions() {
        let mut b = GraphBuilder::new();
        let quarter = b.add_constant("quarter", Format::Proportion, 0.25);
        let three_quarters = b.add_constant("three_quarters", Format::Proportion, 0.75);
        let all = b.add_constant("all", Format::Proportion, 1.0);
        let a = b.add_compartment("a");
        let c = b.add_compartment("c");
        let first = b.add_junction("first");
        let second = b.add_junction("second");
        b.add_link(first, a, quarter);
        b.add_link(first, second, three_quarters);
        b.add_link(second, c, all);
        b.set_initial(first, 100.0);
        b.set_initial(second, 20.0);
        let graph = b.build(years(1.0)).unwrap();

        let values: Vec<f64> = graph
            .parameters()
            .iter()
            .map(|p| p.value.interpolate(0.0).unwrap())
            .collect();
        let seeds = distribute_seeds(&graph, &values).unwrap();
        assert_eq!(seeds.spread[a.idx()], 25.0);
        assert_eq!(seeds.spread[c.idx()], 95.0);
        assert_eq!(seeds.spread[first.idx()], 0.0);
        assert!(seeds.final_bin.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn zero_weights_block_nonzero_inflow() {
        let mut b = GraphBuilder::new();
        let none = b.add_constant("none", Format::Proportion, 0.0);
        let a = b.add_compartment("a");
        let j = b.add_junction("j");
        b.add_link(j, a, none);
        b.set_initial(j, 10.0);
        let graph = b.build(years(1.0)).unwrap();

        let err = distribute_seeds(&graph, &[0.0]).unwrap_err();
        assert!(matches!(err, SimError::JunctionBlocked { step: 0, .. }));
    }
}

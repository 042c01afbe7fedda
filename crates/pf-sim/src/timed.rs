//! Residence-bin advance for timed compartments.

use pf_graph::Arrival;

use crate::resolve::LinkFlow;

/// Destination bin for flow leaving source bin `k` of `from` bins into a
/// compartment with `to` bins.
///
/// A longer destination keeps the remaining time until flush. A shorter
/// destination restarts everyone at bin 0.
pub fn remap_bin(k: usize, from: usize, to: usize) -> usize {
    if to >= from {
        to - from.saturating_sub(k)
    } else {
        0
    }
}

/// Route one inbound link's flow into a timed compartment.
///
/// Residence-preserving arrivals go to `aged` one bin past their source
/// bin, since they already spent this step at the source. Everything else
/// adds to `fresh`, which lands in bin 0.
///
/// Remapped arrivals age the same way: `remap_bin` gives the mapped bin at
/// `t` (bin 7 of 10 maps to bin 12 of 15), and the arrival is stored one bin
/// later (13) at `t + dt`.
pub(crate) fn place_arrival(arrival: Arrival, flow: &LinkFlow, aged: &mut [f64], fresh: &mut f64) {
    let k = aged.len();
    if k == 0 {
        return;
    }
    let last = k - 1;
    match arrival {
        Arrival::AgePreserving if flow.by_bin.len() == k => {
            for (bin, amount) in flow.by_bin.iter().enumerate() {
                aged[(bin + 1).min(last)] += amount;
            }
        }
        Arrival::Remap { from, to } if to == k && flow.by_bin.len() == from => {
            for (bin, amount) in flow.by_bin.iter().enumerate() {
                let dest = if to >= from {
                    (remap_bin(bin, from, to) + 1).min(last)
                } else {
                    0
                };
                aged[dest] += amount;
            }
        }
        _ => *fresh += flow.total,
    }
}

/// Advance bins one step.
///
/// `outflow_by_bin` holds everything leaving each bin this step, the flush
/// included, so the final bin is never carried forward.
pub(crate) fn advance(bins: &[f64], outflow_by_bin: &[f64], aged: &[f64], fresh: f64) -> Vec<f64> {
    let k = bins.len();
    let mut next = aged.to_vec();
    next.resize(k, 0.0);

    for i in (1..k).rev() {
        next[i] += bins[i - 1] - outflow_by_bin.get(i - 1).copied().unwrap_or(0.0);
    }
    if let Some(first) = next.first_mut() {
        *first += fresh;
    }
    next
}

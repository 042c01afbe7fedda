//! Compartment state at one time point.

use pf_core::CompartmentId;
use pf_graph::{CompartmentKind, Eligibility, Graph};

use crate::error::{SimError, SimResult};
use crate::junction;
use crate::params::{ParameterSource, evaluate_parameters};

/// Stored population of one compartment.
#[derive(Debug, Clone, PartialEq)]
pub enum CompartmentState {
    Ordinary { size: f64 },
    /// Residence-age bins; bin 0 is the newest arrivals, the last bin is flushed next.
    Timed { bins: Vec<f64> },
    /// Unlimited supply, reported as empty.
    Source,
    Sink { size: f64 },
    Junction,
}

impl CompartmentState {
    /// Logical size (sum over bins for timed compartments).
    pub fn total_size(&self) -> f64 {
        match self {
            CompartmentState::Ordinary { size } | CompartmentState::Sink { size } => *size,
            CompartmentState::Timed { bins } => bins.iter().sum(),
            CompartmentState::Source | CompartmentState::Junction => 0.0,
        }
    }

    pub fn bins(&self) -> Option<&[f64]> {
        match self {
            CompartmentState::Timed { bins } => Some(bins),
            _ => None,
        }
    }

    /// Population in the final residence bin.
    pub fn final_bin(&self) -> f64 {
        match self {
            CompartmentState::Timed { bins } => bins.last().copied().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Population a link of the given eligibility draws from.
    ///
    /// Unlimited and junction eligibility have no stored pool and report zero.
    pub fn eligible(&self, eligibility: Eligibility) -> f64 {
        match eligibility {
            Eligibility::Full => self.total_size(),
            Eligibility::NonFinal => self.total_size() - self.final_bin(),
            Eligibility::FinalResidual => self.final_bin(),
            Eligibility::Junction | Eligibility::Unlimited => 0.0,
        }
    }
}

/// State of every compartment at model time `t`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelState {
    pub t: f64,
    pub compartments: Vec<CompartmentState>,
}

impl ModelState {
    /// Seed the model at `t0`.
    ///
    /// Junction seeds are pushed downstream as one step's worth of inflow
    /// using the proportions at `t0`. Timed compartments then spread their
    /// starting size uniformly over all bins, the final bin included. Seeds
    /// arriving through a group-attached junction are placed in the final
    /// bin on top of that, so they flush in the first step.
    pub fn initial<P: ParameterSource + ?Sized>(
        graph: &Graph,
        params: &P,
        t0: f64,
    ) -> SimResult<Self> {
        let values = evaluate_parameters(graph, params, 0, t0)?;
        let seeds = junction::distribute_seeds(graph, &values)?;

        let compartments = graph
            .compartments()
            .iter()
            .map(|c| -> SimResult<CompartmentState> {
                let size = c.initial + seeds.spread[c.id.idx()];
                match c.kind {
                    CompartmentKind::Ordinary => Ok(CompartmentState::Ordinary { size }),
                    CompartmentKind::Timed { .. } => {
                        let k = graph.bin_count(c.id).ok_or(SimError::InvalidArg {
                            what: "timed compartment without a duration group",
                        })?;
                        let mut bins = vec![size / k as f64; k];
                        if let Some(last) = bins.last_mut() {
                            *last += seeds.final_bin[c.id.idx()];
                        }
                        Ok(CompartmentState::Timed { bins })
                    }
                    CompartmentKind::Source => Ok(CompartmentState::Source),
                    CompartmentKind::Sink => Ok(CompartmentState::Sink { size }),
                    CompartmentKind::Junction => Ok(CompartmentState::Junction),
                }
            })
            .collect::<SimResult<Vec<_>>>()?;

        tracing::debug!(
            t = t0,
            total = compartments.iter().map(|c| c.total_size()).sum::<f64>(),
            "initial state"
        );

        Ok(Self {
            t: t0,
            compartments,
        })
    }

    pub fn compartment(&self, id: CompartmentId) -> Option<&CompartmentState> {
        self.compartments.get(id.idx())
    }

    pub fn size(&self, id: CompartmentId) -> f64 {
        self.compartment(id).map_or(0.0, |c| c.total_size())
    }

    /// Sum of all stored population, sinks included.
    pub fn total(&self) -> f64 {
        self.compartments.iter().map(|c| c.total_size()).sum()
    }
}

//! Core topology data structures.

use pf_core::{CompartmentId, Format, GroupId, LinkId, ParamId, Quantity, Time};

/// Storage behaviour of a compartment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompartmentKind {
    /// Holds a scalar population; memoryless residence.
    Ordinary,
    /// Holds population by residence-age bin; flushed after `duration`.
    Timed { duration: ParamId },
    /// Unlimited supply (births, imports). Only number-driven outflows.
    Source,
    /// Accumulates inflow (deaths, exports). No outflows.
    Sink,
    /// Zero-storage node splitting one step's inflow by proportion.
    Junction,
}

impl CompartmentKind {
    pub fn is_junction(self) -> bool {
        matches!(self, CompartmentKind::Junction)
    }

    pub fn is_timed(self) -> bool {
        matches!(self, CompartmentKind::Timed { .. })
    }

    pub fn label(self) -> &'static str {
        match self {
            CompartmentKind::Ordinary => "ordinary",
            CompartmentKind::Timed { .. } => "timed",
            CompartmentKind::Source => "source",
            CompartmentKind::Sink => "sink",
            CompartmentKind::Junction => "junction",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Compartment {
    pub id: CompartmentId,
    pub name: String,
    pub population: String,
    pub kind: CompartmentKind,
    /// Size at t=0. For junctions this is a seed pushed downstream once.
    pub initial: f64,
}

/// Declared class of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkClass {
    /// Arrivals start a fresh residence clock.
    Ordinary,
    /// Between members of one duration group; residence age is preserved.
    Timed,
    /// Between compartments of different populations.
    Transfer,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub id: LinkId,
    pub name: String,
    pub source: CompartmentId,
    pub dest: CompartmentId,
    pub parameter: ParamId,
    pub class: LinkClass,
}

/// Which part of the source population a link draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    /// The whole compartment, final bin included.
    Full,
    /// Every bin except the final one.
    NonFinal,
    /// Whatever remains in the final bin after competing links.
    FinalResidual,
    /// A junction's pass-through share.
    Junction,
    /// A source compartment's unlimited supply.
    Unlimited,
}

/// Where flow arriving over a link lands in a timed destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// Residence age zero.
    Fresh,
    /// Same group: source bin `k` lands in bin `k + 1`.
    AgePreserving,
    /// Different bin counts: remaining time is re-expressed against `to` bins.
    Remap { from: usize, to: usize },
}

/// Time-varying value of a parameter as declared at build time.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Constant(f64),
    /// `(year, value)` points, sorted by year.
    Series(Vec<(f64, f64)>),
    /// Supplied per step by an external evaluator.
    External,
}

impl ParameterValue {
    pub fn is_constant(&self) -> bool {
        matches!(self, ParameterValue::Constant(_))
    }

    /// Every value known at build time.
    pub fn known_values(&self) -> Vec<f64> {
        match self {
            ParameterValue::Constant(v) => vec![*v],
            ParameterValue::Series(points) => points.iter().map(|&(_, v)| v).collect(),
            ParameterValue::External => Vec::new(),
        }
    }

    /// Linear interpolation with constant extrapolation.
    ///
    /// Returns `None` for external values.
    pub fn interpolate(&self, t: f64) -> Option<f64> {
        match self {
            ParameterValue::Constant(v) => Some(*v),
            ParameterValue::External => None,
            ParameterValue::Series(points) => {
                let (first, last) = (points.first()?, points.last()?);
                if t <= first.0 {
                    return Some(first.1);
                }
                if t >= last.0 {
                    return Some(last.1);
                }
                let upper = points.partition_point(|&(x, _)| x <= t);
                let (x0, y0) = points[upper - 1];
                let (x1, y1) = points[upper];
                if x1 == x0 {
                    return Some(y1);
                }
                Some(y0 + (y1 - y0) * (t - x0) / (x1 - x0))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub id: ParamId,
    pub name: String,
    pub format: Format,
    pub timescale: Time,
    pub value: ParameterValue,
    /// Value is a rate of change of another quantity. Not supported as a link driver.
    pub derivative: bool,
    /// Value may be overwritten by programs/optimization.
    pub targetable: bool,
}

impl Parameter {
    /// Wrap a magnitude in this parameter's format and timescale.
    pub fn quantity(&self, magnitude: f64) -> Quantity {
        Quantity::new(magnitude, self.format).with_timescale(self.timescale)
    }
}

/// Timed compartments sharing one flush (duration) parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct DurationGroup {
    pub id: GroupId,
    pub flush_parameter: ParamId,
    pub compartments: Vec<CompartmentId>,
    pub junctions: Vec<CompartmentId>,
    pub bin_count: usize,
}

/// The validated, immutable model topology compiled for one step size.
#[derive(Debug, Clone)]
pub struct Graph {
    pub(crate) dt: Time,
    pub(crate) parameters: Vec<Parameter>,
    pub(crate) compartments: Vec<Compartment>,
    pub(crate) links: Vec<Link>,
    pub(crate) groups: Vec<DurationGroup>,

    /// Compartment i's outflow links are out_links[out_offsets[i]..out_offsets[i+1]].
    pub(crate) out_offsets: Vec<usize>,
    pub(crate) out_links: Vec<LinkId>,
    pub(crate) in_offsets: Vec<usize>,
    pub(crate) in_links: Vec<LinkId>,

    /// Per compartment: the duration group it belongs to (timed) or is attached to (junction).
    pub(crate) membership: Vec<Option<GroupId>>,
    /// Per compartment: its flush link, if timed.
    pub(crate) flush_links: Vec<Option<LinkId>>,
    /// Per parameter: the links it drives.
    pub(crate) parameter_links: Vec<Vec<LinkId>>,
    /// Junctions ordered so that upstream junctions come first.
    pub(crate) junction_order: Vec<CompartmentId>,
}

impl Graph {
    /// Step size the graph was compiled for.
    pub fn dt(&self) -> Time {
        self.dt
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn compartments(&self) -> &[Compartment] {
        &self.compartments
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn groups(&self) -> &[DurationGroup] {
        &self.groups
    }

    pub fn parameter(&self, id: ParamId) -> Option<&Parameter> {
        self.parameters.get(id.idx())
    }

    pub fn compartment(&self, id: CompartmentId) -> Option<&Compartment> {
        self.compartments.get(id.idx())
    }

    pub fn link(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id.idx())
    }

    pub fn group(&self, id: GroupId) -> Option<&DurationGroup> {
        self.groups.get(id.idx())
    }

    /// Links leaving a compartment.
    pub fn outflows(&self, id: CompartmentId) -> &[LinkId] {
        let idx = id.idx();
        if idx >= self.compartments.len() {
            return &[];
        }
        &self.out_links[self.out_offsets[idx]..self.out_offsets[idx + 1]]
    }

    /// Links entering a compartment.
    pub fn inflows(&self, id: CompartmentId) -> &[LinkId] {
        let idx = id.idx();
        if idx >= self.compartments.len() {
            return &[];
        }
        &self.in_links[self.in_offsets[idx]..self.in_offsets[idx + 1]]
    }

    /// Duration group a timed compartment belongs to or a junction is attached to.
    pub fn group_of(&self, id: CompartmentId) -> Option<GroupId> {
        self.membership.get(id.idx()).copied().flatten()
    }

    /// Residence bins of a timed compartment.
    pub fn bin_count(&self, id: CompartmentId) -> Option<usize> {
        let compartment = self.compartment(id)?;
        if !compartment.kind.is_timed() {
            return None;
        }
        self.group_of(id)
            .and_then(|g| self.group(g))
            .map(|g| g.bin_count)
    }

    pub fn flush_link(&self, id: CompartmentId) -> Option<LinkId> {
        self.flush_links.get(id.idx()).copied().flatten()
    }

    pub fn is_flush(&self, link: LinkId) -> bool {
        self.link(link)
            .is_some_and(|l| self.flush_link(l.source) == Some(link))
    }

    pub fn links_for_parameter(&self, id: ParamId) -> &[LinkId] {
        self.parameter_links
            .get(id.idx())
            .map_or(&[], |links| links.as_slice())
    }

    pub fn junction_order(&self) -> &[CompartmentId] {
        &self.junction_order
    }

    /// Which part of the source population a link competes for.
    pub fn eligibility(&self, link: LinkId) -> Eligibility {
        let Some(l) = self.link(link) else {
            return Eligibility::Full;
        };
        let source_kind = self.compartments[l.source.idx()].kind;
        let dest_kind = self.compartments[l.dest.idx()].kind;
        match source_kind {
            CompartmentKind::Junction => Eligibility::Junction,
            CompartmentKind::Source => Eligibility::Unlimited,
            CompartmentKind::Timed { .. } => {
                if self.is_flush(link) {
                    Eligibility::FinalResidual
                } else if l.class == LinkClass::Timed
                    || (l.class == LinkClass::Transfer && dest_kind.is_timed())
                {
                    Eligibility::NonFinal
                } else {
                    Eligibility::Full
                }
            }
            CompartmentKind::Ordinary | CompartmentKind::Sink => Eligibility::Full,
        }
    }

    /// How flow over a link is placed in a timed destination.
    pub fn arrival(&self, link: LinkId) -> Arrival {
        let Some(l) = self.link(link) else {
            return Arrival::Fresh;
        };
        match l.class {
            LinkClass::Ordinary => Arrival::Fresh,
            LinkClass::Timed => Arrival::AgePreserving,
            LinkClass::Transfer => match (self.bin_count(l.source), self.bin_count(l.dest)) {
                (Some(from), Some(to)) => Arrival::Remap { from, to },
                _ => Arrival::Fresh,
            },
        }
    }
}

//! Incremental graph builder.

use pf_core::{CompartmentId, Format, LinkId, ParamId, Time, in_years, years};

use crate::error::{GraphError, GraphResult};
use crate::graph::{
    Compartment, CompartmentKind, Graph, Link, LinkClass, Parameter, ParameterValue,
};
use crate::validate;

const DEFAULT_POPULATION: &str = "default";

/// Builder for constructing a model topology incrementally.
///
/// Add parameters, compartments and links, then call `build(dt)` to
/// validate and freeze everything into an immutable `Graph`.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    parameters: Vec<Parameter>,
    compartments: Vec<Compartment>,
    links: Vec<Link>,
}

impl GraphBuilder {
    /// Create a new empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter and return its ID.
    pub fn add_parameter(
        &mut self,
        name: impl Into<String>,
        format: Format,
        value: ParameterValue,
    ) -> ParamId {
        let id = ParamId::from_index(self.parameters.len() as u32);
        self.parameters.push(Parameter {
            id,
            name: name.into(),
            format,
            timescale: years(1.0),
            value,
            derivative: false,
            targetable: false,
        });
        id
    }

    /// Convenience for a constant-valued parameter.
    pub fn add_constant(&mut self, name: impl Into<String>, format: Format, value: f64) -> ParamId {
        self.add_parameter(name, format, ParameterValue::Constant(value))
    }

    pub fn set_timescale(&mut self, id: ParamId, timescale: Time) {
        if let Some(p) = self.parameters.get_mut(id.idx()) {
            p.timescale = timescale;
        }
    }

    pub fn mark_derivative(&mut self, id: ParamId) {
        if let Some(p) = self.parameters.get_mut(id.idx()) {
            p.derivative = true;
        }
    }

    pub fn mark_targetable(&mut self, id: ParamId) {
        if let Some(p) = self.parameters.get_mut(id.idx()) {
            p.targetable = true;
        }
    }

    fn push_compartment(&mut self, name: String, kind: CompartmentKind) -> CompartmentId {
        let id = CompartmentId::from_index(self.compartments.len() as u32);
        self.compartments.push(Compartment {
            id,
            name,
            population: DEFAULT_POPULATION.to_string(),
            kind,
            initial: 0.0,
        });
        id
    }

    /// Add an ordinary compartment.
    pub fn add_compartment(&mut self, name: impl Into<String>) -> CompartmentId {
        self.push_compartment(name.into(), CompartmentKind::Ordinary)
    }

    /// Add a timed compartment whose residence is governed by `duration`.
    pub fn add_timed_compartment(
        &mut self,
        name: impl Into<String>,
        duration: ParamId,
    ) -> CompartmentId {
        self.push_compartment(name.into(), CompartmentKind::Timed { duration })
    }

    pub fn add_source(&mut self, name: impl Into<String>) -> CompartmentId {
        self.push_compartment(name.into(), CompartmentKind::Source)
    }

    pub fn add_sink(&mut self, name: impl Into<String>) -> CompartmentId {
        self.push_compartment(name.into(), CompartmentKind::Sink)
    }

    pub fn add_junction(&mut self, name: impl Into<String>) -> CompartmentId {
        self.push_compartment(name.into(), CompartmentKind::Junction)
    }

    /// Set the size at t=0 (a one-off seed for junctions).
    pub fn set_initial(&mut self, id: CompartmentId, value: f64) {
        if let Some(c) = self.compartments.get_mut(id.idx()) {
            c.initial = value;
        }
    }

    pub fn set_population(&mut self, id: CompartmentId, population: impl Into<String>) {
        if let Some(c) = self.compartments.get_mut(id.idx()) {
            c.population = population.into();
        }
    }

    /// Add an ordinary link.
    pub fn add_link(
        &mut self,
        source: CompartmentId,
        dest: CompartmentId,
        parameter: ParamId,
    ) -> LinkId {
        self.add_link_with_class(source, dest, parameter, LinkClass::Ordinary)
    }

    /// Add a residence-preserving link within a duration group.
    pub fn add_timed_link(
        &mut self,
        source: CompartmentId,
        dest: CompartmentId,
        parameter: ParamId,
    ) -> LinkId {
        self.add_link_with_class(source, dest, parameter, LinkClass::Timed)
    }

    /// Add a link between compartments of different populations.
    pub fn add_transfer(
        &mut self,
        source: CompartmentId,
        dest: CompartmentId,
        parameter: ParamId,
    ) -> LinkId {
        self.add_link_with_class(source, dest, parameter, LinkClass::Transfer)
    }

    pub fn add_link_with_class(
        &mut self,
        source: CompartmentId,
        dest: CompartmentId,
        parameter: ParamId,
        class: LinkClass,
    ) -> LinkId {
        let id = LinkId::from_index(self.links.len() as u32);
        let name = format!(
            "{}:{}:{}",
            self.compartment_name(source),
            self.compartment_name(dest),
            self.parameters
                .get(parameter.idx())
                .map_or("?", |p| p.name.as_str())
        );
        self.links.push(Link {
            id,
            name,
            source,
            dest,
            parameter,
            class,
        });
        id
    }

    fn compartment_name(&self, id: CompartmentId) -> &str {
        self.compartments
            .get(id.idx())
            .map_or("?", |c| c.name.as_str())
    }

    /// Validate the topology and compile it for step size `dt`.
    pub fn build(self, dt: Time) -> GraphResult<Graph> {
        let dt_years = in_years(dt);
        if !dt_years.is_finite() || dt_years <= 0.0 {
            return Err(GraphError::InvalidStep {
                reason: format!("dt must be a positive number of years, got {}", dt_years),
            });
        }

        validate::validate_structure(&self.parameters, &self.compartments, &self.links)?;
        validate::validate_links(&self.parameters, &self.compartments, &self.links)?;

        let (out_offsets, out_links) =
            Self::build_adjacency(self.compartments.len(), &self.links, |l| l.source);
        let (in_offsets, in_links) =
            Self::build_adjacency(self.compartments.len(), &self.links, |l| l.dest);

        let mut graph = Graph {
            dt,
            parameters: self.parameters,
            compartments: self.compartments,
            links: self.links,
            groups: Vec::new(),
            out_offsets,
            out_links,
            in_offsets,
            in_links,
            membership: Vec::new(),
            flush_links: Vec::new(),
            parameter_links: Vec::new(),
            junction_order: Vec::new(),
        };

        validate::resolve_duration_groups(&mut graph)?;
        validate::validate_timed_links(&graph)?;
        validate::validate_upstream_groups(&graph)?;
        validate::attach_junctions(&mut graph)?;
        validate::validate_flush_reentry(&graph)?;
        graph.junction_order = validate::junction_order(&graph)?;

        let mut parameter_links = vec![Vec::new(); graph.parameters.len()];
        for link in &graph.links {
            parameter_links[link.parameter.idx()].push(link.id);
        }
        graph.parameter_links = parameter_links;

        tracing::debug!(
            compartments = graph.compartments.len(),
            links = graph.links.len(),
            groups = graph.groups.len(),
            "built model graph"
        );
        for group in &graph.groups {
            tracing::debug!(
                parameter = %graph.parameters[group.flush_parameter.idx()].name,
                bins = group.bin_count,
                compartments = group.compartments.len(),
                junctions = group.junctions.len(),
                "duration group"
            );
        }

        Ok(graph)
    }

    /// Build compact adjacency lists keyed by one endpoint of each link.
    fn build_adjacency(
        n_compartments: usize,
        links: &[Link],
        endpoint: impl Fn(&Link) -> CompartmentId,
    ) -> (Vec<usize>, Vec<LinkId>) {
        let mut per_compartment: Vec<Vec<LinkId>> = vec![Vec::new(); n_compartments];
        for link in links {
            per_compartment[endpoint(link).idx()].push(link.id);
        }

        let mut offsets = Vec::with_capacity(n_compartments + 1);
        let mut flat = Vec::with_capacity(links.len());
        offsets.push(0);
        for list in per_compartment {
            flat.extend(list);
            offsets.push(flat.len());
        }
        (offsets, flat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_assigns_contiguous_ids() {
        let mut builder = GraphBuilder::new();
        let p = builder.add_constant("death", Format::Probability, 0.1);
        let a = builder.add_compartment("sus");
        let b = builder.add_sink("dead");
        let l = builder.add_link(a, b, p);

        assert_eq!(p.index(), 0);
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(l.index(), 0);
        assert_eq!(builder.links[0].name, "sus:dead:death");
    }

    #[test]
    fn builder_setters() {
        let mut builder = GraphBuilder::new();
        let p = builder.add_constant("n", Format::Number, 5.0);
        builder.set_timescale(p, years(0.5));
        builder.mark_targetable(p);
        let c = builder.add_compartment("c");
        builder.set_initial(c, 12.0);
        builder.set_population(c, "adults");

        assert!(builder.parameters[0].targetable);
        assert!((in_years(builder.parameters[0].timescale) - 0.5).abs() < 1e-12);
        assert_eq!(builder.compartments[0].initial, 12.0);
        assert_eq!(builder.compartments[0].population, "adults");
    }

    #[test]
    fn builder_build_simple() {
        let mut builder = GraphBuilder::new();
        let p = builder.add_constant("death", Format::Probability, 0.1);
        let a = builder.add_compartment("sus");
        let b = builder.add_sink("dead");
        let l = builder.add_link(a, b, p);

        let graph = builder.build(years(1.0)).unwrap();
        assert_eq!(graph.compartments().len(), 2);
        assert_eq!(graph.outflows(a), &[l]);
        assert_eq!(graph.inflows(b), &[l]);
        assert!(graph.outflows(b).is_empty());
        assert_eq!(graph.links_for_parameter(p), &[l]);
    }

    #[test]
    fn build_rejects_bad_dt() {
        let builder = GraphBuilder::new();
        assert!(matches!(
            builder.build(years(0.0)),
            Err(GraphError::InvalidStep { .. })
        ));
    }
}

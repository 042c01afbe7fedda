//! Topology validation logic.
//!
//! Everything here runs once at build time. A graph that passes is safe to
//! integrate: every timed compartment has exactly one flush link, every
//! duration group has one bin count, and every junction is either fully
//! attached to one group or not attached at all.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use pf_core::{CompartmentId, Format, GroupId, LinkId, ParamId, in_years};

use crate::error::{GraphError, GraphResult};
use crate::graph::{
    Compartment, CompartmentKind, DurationGroup, Graph, Link, LinkClass, Parameter,
    ParameterValue,
};

/// Validate references, names, parameter values and initial sizes.
pub(crate) fn validate_structure(
    parameters: &[Parameter],
    compartments: &[Compartment],
    links: &[Link],
) -> GraphResult<()> {
    // IDs must be contiguous and match their position
    for (i, p) in parameters.iter().enumerate() {
        if p.id.idx() != i {
            return Err(GraphError::InvalidRef {
                what: "parameter",
                index: p.id.idx(),
            });
        }
    }
    for (i, c) in compartments.iter().enumerate() {
        if c.id.idx() != i {
            return Err(GraphError::InvalidRef {
                what: "compartment",
                index: c.id.idx(),
            });
        }
    }
    for (i, l) in links.iter().enumerate() {
        if l.id.idx() != i {
            return Err(GraphError::InvalidRef {
                what: "link",
                index: l.id.idx(),
            });
        }
    }

    let mut names: HashSet<&str> = HashSet::new();
    for p in parameters {
        if !names.insert(p.name.as_str()) {
            return Err(GraphError::DuplicateName {
                what: "parameter",
                name: p.name.clone(),
            });
        }
    }

    names.clear();
    for c in compartments {
        if !names.insert(c.name.as_str()) {
            return Err(GraphError::DuplicateName {
                what: "compartment",
                name: c.name.clone(),
            });
        }
        if !c.initial.is_finite() || c.initial < 0.0 {
            return Err(GraphError::InvalidInitial {
                compartment: c.name.clone(),
                value: c.initial,
            });
        }
        if let CompartmentKind::Timed { duration } = c.kind {
            if duration.idx() >= parameters.len() {
                return Err(GraphError::InvalidRef {
                    what: "parameter",
                    index: duration.idx(),
                });
            }
        }
    }

    for link in links {
        for endpoint in [link.source, link.dest] {
            if endpoint.idx() >= compartments.len() {
                return Err(GraphError::InvalidRef {
                    what: "compartment",
                    index: endpoint.idx(),
                });
            }
        }
        if link.parameter.idx() >= parameters.len() {
            return Err(GraphError::InvalidRef {
                what: "parameter",
                index: link.parameter.idx(),
            });
        }
    }

    names.clear();
    for link in links {
        if !names.insert(link.name.as_str()) {
            return Err(GraphError::DuplicateName {
                what: "link",
                name: link.name.clone(),
            });
        }
    }

    for p in parameters {
        validate_parameter(p)?;
    }

    Ok(())
}

fn validate_parameter(p: &Parameter) -> GraphResult<()> {
    let invalid = |reason: String| GraphError::InvalidParameter {
        parameter: p.name.clone(),
        reason,
    };

    let timescale = in_years(p.timescale);
    if !timescale.is_finite() || timescale <= 0.0 {
        return Err(invalid(format!(
            "timescale must be positive, got {}",
            timescale
        )));
    }

    if let ParameterValue::Series(points) = &p.value {
        if points.is_empty() {
            return Err(invalid("time series has no points".to_string()));
        }
        if points.iter().any(|&(t, _)| !t.is_finite()) {
            return Err(invalid("time series has a non-finite year".to_string()));
        }
        if points.windows(2).any(|w| w[1].0 < w[0].0) {
            return Err(invalid("time series years are not sorted".to_string()));
        }
    }

    for v in p.value.known_values() {
        p.quantity(v)
            .validate(&p.name)
            .map_err(|e| invalid(e.to_string()))?;
    }

    Ok(())
}

/// Per-link legality: endpoints, parameter format and class.
pub(crate) fn validate_links(
    parameters: &[Parameter],
    compartments: &[Compartment],
    links: &[Link],
) -> GraphResult<()> {
    for link in links {
        let src = &compartments[link.source.idx()];
        let dst = &compartments[link.dest.idx()];
        let param = &parameters[link.parameter.idx()];
        let illegal = |reason: String| GraphError::IllegalLink {
            link: link.name.clone(),
            reason,
        };

        if link.source == link.dest {
            return Err(illegal("source and destination are the same".to_string()));
        }
        if src.kind == CompartmentKind::Sink {
            return Err(illegal(format!("sink '{}' cannot have outflows", src.name)));
        }
        if dst.kind == CompartmentKind::Source {
            return Err(illegal(format!(
                "source '{}' cannot receive inflow",
                dst.name
            )));
        }
        if param.derivative {
            return Err(illegal(format!(
                "derivative parameter '{}' cannot drive a transition",
                param.name
            )));
        }

        match param.format {
            Format::Duration => match src.kind {
                CompartmentKind::Timed { duration } if duration == link.parameter => {}
                CompartmentKind::Source | CompartmentKind::Sink | CompartmentKind::Junction => {
                    return Err(GraphError::InvalidDuration {
                        compartment: src.name.clone(),
                        reason: format!(
                            "duration parameter '{}' cannot be attached to a {} compartment",
                            param.name,
                            src.kind.label()
                        ),
                    });
                }
                _ => {
                    return Err(illegal(format!(
                        "duration parameter '{}' is not the duration of '{}'",
                        param.name, src.name
                    )));
                }
            },
            Format::Proportion => {
                if !src.kind.is_junction() {
                    return Err(illegal(format!(
                        "proportion parameter '{}' may only drive junction outflows",
                        param.name
                    )));
                }
            }
            Format::Number | Format::Probability => {
                if src.kind.is_junction() {
                    return Err(illegal(format!(
                        "junction outflows must use proportion parameters, '{}' is a {}",
                        param.name, param.format
                    )));
                }
            }
        }

        if src.kind == CompartmentKind::Source && param.format != Format::Number {
            return Err(illegal(format!(
                "source outflows must use number parameters, '{}' is a {}",
                param.name, param.format
            )));
        }

        match link.class {
            LinkClass::Transfer => {
                let storage = |c: &Compartment| {
                    matches!(
                        c.kind,
                        CompartmentKind::Ordinary | CompartmentKind::Timed { .. }
                    )
                };
                if !storage(src) || !storage(dst) {
                    return Err(illegal(
                        "transfers must connect ordinary or timed compartments".to_string(),
                    ));
                }
                if src.population == dst.population {
                    return Err(illegal(format!(
                        "transfer stays within population '{}'",
                        src.population
                    )));
                }
            }
            LinkClass::Ordinary | LinkClass::Timed => {
                if src.population != dst.population {
                    return Err(illegal(format!(
                        "links between populations '{}' and '{}' must be transfers",
                        src.population, dst.population
                    )));
                }
            }
        }
    }

    Ok(())
}

/// Derive duration groups and flush links from timed compartments.
pub(crate) fn resolve_duration_groups(graph: &mut Graph) -> GraphResult<()> {
    let n = graph.compartments.len();
    let mut membership: Vec<Option<GroupId>> = vec![None; n];
    let mut flush_links: Vec<Option<LinkId>> = vec![None; n];
    let mut groups: Vec<DurationGroup> = Vec::new();
    let mut by_parameter: HashMap<ParamId, GroupId> = HashMap::new();

    for comp in &graph.compartments {
        let CompartmentKind::Timed { duration } = comp.kind else {
            continue;
        };
        let param = &graph.parameters[duration.idx()];
        let invalid = |reason: String| GraphError::InvalidDuration {
            compartment: comp.name.clone(),
            reason,
        };

        if param.format != Format::Duration {
            return Err(invalid(format!(
                "parameter '{}' is a {}, expected a duration",
                param.name, param.format
            )));
        }
        if param.derivative {
            return Err(invalid(format!(
                "parameter '{}' is a derivative",
                param.name
            )));
        }
        if param.targetable {
            return Err(invalid(format!("parameter '{}' is targetable", param.name)));
        }
        let &ParameterValue::Constant(value) = &param.value else {
            return Err(invalid(format!(
                "parameter '{}' must be constant over the run",
                param.name
            )));
        };
        if value <= 0.0 {
            return Err(invalid(format!(
                "parameter '{}' must be positive, got {}",
                param.name, value
            )));
        }
        let bin_count = param
            .quantity(value)
            .bin_count(graph.dt)
            .map_err(|e| invalid(e.to_string()))?;

        let group_id = *by_parameter.entry(duration).or_insert_with(|| {
            let id = GroupId::from_index(groups.len() as u32);
            groups.push(DurationGroup {
                id,
                flush_parameter: duration,
                compartments: Vec::new(),
                junctions: Vec::new(),
                bin_count,
            });
            id
        });
        groups[group_id.idx()].compartments.push(comp.id);
        membership[comp.id.idx()] = Some(group_id);

        let flushes: Vec<LinkId> = graph
            .outflows(comp.id)
            .iter()
            .copied()
            .filter(|l| graph.links[l.idx()].parameter == duration)
            .collect();
        match flushes.len() {
            0 => {
                return Err(GraphError::MissingFlushLink {
                    compartment: comp.name.clone(),
                });
            }
            1 => {}
            count => {
                return Err(GraphError::MultipleFlushLinks {
                    compartment: comp.name.clone(),
                    count,
                });
            }
        }
        let flush = &graph.links[flushes[0].idx()];
        if flush.class != LinkClass::Ordinary {
            return Err(GraphError::IllegalLink {
                link: flush.name.clone(),
                reason: "flush links must be ordinary links".to_string(),
            });
        }
        flush_links[comp.id.idx()] = Some(flush.id);
    }

    for (idx, flush) in flush_links.iter().enumerate() {
        let Some(flush) = flush else { continue };
        let link = &graph.links[flush.idx()];
        if membership[link.dest.idx()].is_some() && membership[link.dest.idx()] == membership[idx]
        {
            let group = membership[idx].map_or(0, |g| g.idx());
            return Err(GraphError::SelfFlush {
                link: link.name.clone(),
                group: graph.parameters[groups[group].flush_parameter.idx()]
                    .name
                    .clone(),
            });
        }
    }

    graph.groups = groups;
    graph.membership = membership;
    graph.flush_links = flush_links;
    Ok(())
}

fn group_name(graph: &Graph, group: GroupId) -> String {
    graph
        .groups
        .get(group.idx())
        .map(|g| graph.parameters[g.flush_parameter.idx()].name.clone())
        .unwrap_or_else(|| group.to_string())
}

/// Timed links must stay inside one duration group.
pub(crate) fn validate_timed_links(graph: &Graph) -> GraphResult<()> {
    for link in &graph.links {
        if link.class != LinkClass::Timed {
            continue;
        }
        let src = &graph.compartments[link.source.idx()];
        let dst = &graph.compartments[link.dest.idx()];
        let member = |c: &Compartment| c.kind.is_timed() || c.kind.is_junction();
        if !member(src) || !member(dst) {
            return Err(GraphError::IllegalLink {
                link: link.name.clone(),
                reason: "timed links must connect timed compartments or junctions".to_string(),
            });
        }
        if src.kind.is_timed()
            && dst.kind.is_timed()
            && graph.membership[src.id.idx()] != graph.membership[dst.id.idx()]
        {
            return Err(GraphError::IllegalLink {
                link: link.name.clone(),
                reason: "timed links must stay within one duration group".to_string(),
            });
        }
    }
    Ok(())
}

/// A junction may carry people out of at most one duration group.
///
/// Inputs that come from a group are timed links and flush links leaving a
/// group member. Chains of junctions are followed upstream, so a junction
/// fed by two junctions each draining a different group is rejected too.
pub(crate) fn validate_upstream_groups(graph: &Graph) -> GraphResult<()> {
    for comp in graph.compartments.iter().filter(|c| c.kind.is_junction()) {
        let mut groups: BTreeSet<GroupId> = BTreeSet::new();
        let mut visited: HashSet<CompartmentId> = HashSet::from([comp.id]);
        let mut queue: VecDeque<CompartmentId> = VecDeque::from([comp.id]);
        while let Some(junction) = queue.pop_front() {
            for &l in graph.inflows(junction) {
                let link = &graph.links[l.idx()];
                let source = link.source;
                if graph.compartments[source.idx()].kind.is_junction() {
                    if visited.insert(source) {
                        queue.push_back(source);
                    }
                } else if link.class == LinkClass::Timed
                    || graph.flush_links[source.idx()] == Some(l)
                {
                    groups.extend(graph.membership[source.idx()]);
                }
            }
        }
        if groups.len() > 1 {
            return Err(GraphError::MultipleUpstreamGroups {
                junction: comp.name.clone(),
                groups: groups.iter().map(|&g| group_name(graph, g)).collect(),
            });
        }
    }
    Ok(())
}

/// Attach junctions to duration groups and enforce all-or-none membership.
///
/// A junction is attached to a group when any timed link connects it to a
/// member of that group. Attachment spreads across junction-to-junction
/// links, so a chain of junctions feeding a timed compartment is attached
/// as a whole.
pub(crate) fn attach_junctions(graph: &mut Graph) -> GraphResult<()> {
    let n = graph.compartments.len();
    let is_junction = |g: &Graph, id: CompartmentId| g.compartments[id.idx()].kind.is_junction();

    let mut candidates: Vec<BTreeSet<GroupId>> = vec![BTreeSet::new(); n];
    for link in &graph.links {
        if link.class != LinkClass::Timed {
            continue;
        }
        if is_junction(graph, link.dest) {
            if let Some(g) = graph.membership[link.source.idx()] {
                candidates[link.dest.idx()].insert(g);
            }
        }
        if is_junction(graph, link.source) {
            if let Some(g) = graph.membership[link.dest.idx()] {
                candidates[link.source.idx()].insert(g);
            }
        }
    }

    // Spread along junction chains until nothing changes
    let mut changed = true;
    while changed {
        changed = false;
        for link in &graph.links {
            if !is_junction(graph, link.source) || !is_junction(graph, link.dest) {
                continue;
            }
            let (s, d) = (link.source.idx(), link.dest.idx());
            let union: BTreeSet<GroupId> = candidates[s].union(&candidates[d]).copied().collect();
            if union.len() != candidates[s].len() || union.len() != candidates[d].len() {
                candidates[s] = union.clone();
                candidates[d] = union;
                changed = true;
            }
        }
    }

    let mut attachments: Vec<(CompartmentId, GroupId)> = Vec::new();
    for comp in &graph.compartments {
        if !comp.kind.is_junction() {
            continue;
        }
        let own = &candidates[comp.id.idx()];
        if own.is_empty() {
            continue;
        }

        let mut upstream: BTreeSet<GroupId> = BTreeSet::new();
        for &l in graph.inflows(comp.id) {
            let link = &graph.links[l.idx()];
            if is_junction(graph, link.source) {
                upstream.extend(candidates[link.source.idx()].iter().copied());
            } else if link.class == LinkClass::Timed {
                upstream.extend(graph.membership[link.source.idx()]);
            }
        }
        if upstream.len() > 1 {
            return Err(GraphError::MultipleUpstreamGroups {
                junction: comp.name.clone(),
                groups: upstream.iter().map(|&g| group_name(graph, g)).collect(),
            });
        }

        let group = upstream
            .iter()
            .next()
            .or_else(|| own.iter().next())
            .copied()
            .unwrap_or(GroupId::from_index(0));

        let incident = graph
            .inflows(comp.id)
            .iter()
            .map(|&l| (l, graph.links[l.idx()].source))
            .chain(
                graph
                    .outflows(comp.id)
                    .iter()
                    .map(|&l| (l, graph.links[l.idx()].dest)),
            );
        for (l, other) in incident {
            let link = &graph.links[l.idx()];
            let other_in_group = if is_junction(graph, other) {
                candidates[other.idx()].len() == 1 && candidates[other.idx()].contains(&group)
            } else {
                graph.membership[other.idx()] == Some(group)
            };
            if link.class != LinkClass::Timed || !other_in_group {
                return Err(GraphError::JunctionExclusivity {
                    junction: comp.name.clone(),
                    group: group_name(graph, group),
                    link: link.name.clone(),
                });
            }
        }

        attachments.push((comp.id, group));
    }

    for (junction, group) in attachments {
        graph.membership[junction.idx()] = Some(group);
        graph.groups[group.idx()].junctions.push(junction);
    }
    Ok(())
}

/// People flushed out of a group may not flow back into it through junctions.
pub(crate) fn validate_flush_reentry(graph: &Graph) -> GraphResult<()> {
    for comp in &graph.compartments {
        let (Some(flush), Some(group)) = (
            graph.flush_links[comp.id.idx()],
            graph.membership[comp.id.idx()],
        ) else {
            continue;
        };
        let flush = &graph.links[flush.idx()];
        if !graph.compartments[flush.dest.idx()].kind.is_junction() {
            continue;
        }

        let mut visited: HashSet<CompartmentId> = HashSet::from([flush.dest]);
        let mut queue: VecDeque<CompartmentId> = VecDeque::from([flush.dest]);
        while let Some(junction) = queue.pop_front() {
            for &l in graph.outflows(junction) {
                let dest = graph.links[l.idx()].dest;
                if graph.membership[dest.idx()] == Some(group) {
                    return Err(GraphError::FlushReentry {
                        link: flush.name.clone(),
                        group: group_name(graph, group),
                    });
                }
                if graph.compartments[dest.idx()].kind.is_junction() && visited.insert(dest) {
                    queue.push_back(dest);
                }
            }
        }
    }
    Ok(())
}

/// Order junctions so that every junction comes after the junctions feeding it.
pub(crate) fn junction_order(graph: &Graph) -> GraphResult<Vec<CompartmentId>> {
    let junctions: Vec<CompartmentId> = graph
        .compartments
        .iter()
        .filter(|c| c.kind.is_junction())
        .map(|c| c.id)
        .collect();

    for &j in &junctions {
        if graph.outflows(j).is_empty() {
            return Err(GraphError::JunctionWithoutOutflow {
                junction: graph.compartments[j.idx()].name.clone(),
            });
        }
    }

    let mut in_degree: HashMap<CompartmentId, usize> = junctions.iter().map(|&j| (j, 0)).collect();
    for &j in &junctions {
        for &l in graph.inflows(j) {
            if graph.compartments[graph.links[l.idx()].source.idx()]
                .kind
                .is_junction()
            {
                *in_degree.entry(j).or_default() += 1;
            }
        }
    }

    // Kahn's algorithm, seeded in ID order for determinism
    let mut queue: VecDeque<CompartmentId> = junctions
        .iter()
        .copied()
        .filter(|j| in_degree.get(j) == Some(&0))
        .collect();
    let mut order = Vec::with_capacity(junctions.len());

    while let Some(j) = queue.pop_front() {
        order.push(j);
        for &l in graph.outflows(j) {
            let dest = graph.links[l.idx()].dest;
            if let Some(deg) = in_degree.get_mut(&dest) {
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(dest);
                }
            }
        }
    }

    if order.len() != junctions.len() {
        let placed: HashSet<CompartmentId> = order.iter().copied().collect();
        return Err(GraphError::JunctionCycle {
            junctions: junctions
                .iter()
                .filter(|j| !placed.contains(j))
                .map(|j| graph.compartments[j.idx()].name.clone())
                .collect(),
        });
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pf_core::{Id, years};

    fn param(index: u32, name: &str, format: Format, value: ParameterValue) -> Parameter {
        Parameter {
            id: Id::from_index(index),
            name: name.into(),
            format,
            timescale: years(1.0),
            value,
            derivative: false,
            targetable: false,
        }
    }

    fn compartment(index: u32, name: &str, kind: CompartmentKind) -> Compartment {
        Compartment {
            id: Id::from_index(index),
            name: name.into(),
            population: "default".into(),
            kind,
            initial: 0.0,
        }
    }

    #[test]
    fn validate_empty_model() {
        assert!(validate_structure(&[], &[], &[]).is_ok());
    }

    #[test]
    fn validate_invalid_compartment_ref() {
        let params = vec![param(0, "p", Format::Probability, ParameterValue::Constant(0.1))];
        let comps = vec![compartment(0, "a", CompartmentKind::Ordinary)];
        let links = vec![Link {
            id: Id::from_index(0),
            name: "a:?:p".into(),
            source: Id::from_index(0),
            dest: Id::from_index(99),
            parameter: Id::from_index(0),
            class: LinkClass::Ordinary,
        }];
        let err = validate_structure(&params, &comps, &links).unwrap_err();
        assert_eq!(
            err,
            GraphError::InvalidRef {
                what: "compartment",
                index: 99
            }
        );
    }

    #[test]
    fn validate_duplicate_compartment_name() {
        let comps = vec![
            compartment(0, "a", CompartmentKind::Ordinary),
            compartment(1, "a", CompartmentKind::Sink),
        ];
        let err = validate_structure(&[], &comps, &[]).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateName { what: "compartment", .. }));
    }

    #[test]
    fn validate_series_out_of_range() {
        let params = vec![param(
            0,
            "p",
            Format::Probability,
            ParameterValue::Series(vec![(2000.0, 0.2), (2001.0, 1.4)]),
        )];
        let err = validate_structure(&params, &[], &[]).unwrap_err();
        assert!(matches!(err, GraphError::InvalidParameter { .. }));
    }

    #[test]
    fn validate_unsorted_series() {
        let params = vec![param(
            0,
            "n",
            Format::Number,
            ParameterValue::Series(vec![(2001.0, 2.0), (2000.0, 1.0)]),
        )];
        assert!(validate_structure(&params, &[], &[]).is_err());
    }

    #[test]
    fn validate_negative_initial() {
        let mut c = compartment(0, "a", CompartmentKind::Ordinary);
        c.initial = -1.0;
        let err = validate_structure(&[], &[c], &[]).unwrap_err();
        assert!(matches!(err, GraphError::InvalidInitial { .. }));
    }
}

//! Integration tests for pf-graph.

use pf_core::{Format, years};
use pf_graph::{
    Arrival, Eligibility, GraphBuilder, GraphError, IndexMap, LinkClass, ParameterValue,
};

/// sus -> vac (timed, 10y) -> sus, with vac -> dead competing.
fn vaccination_builder() -> GraphBuilder {
    let mut b = GraphBuilder::new();
    let duration = b.add_constant("vac_dur", Format::Duration, 10.0);
    let uptake = b.add_constant("uptake", Format::Probability, 0.1);
    let death = b.add_constant("death", Format::Probability, 0.02);
    let sus = b.add_compartment("sus");
    let vac = b.add_timed_compartment("vac", duration);
    let dead = b.add_sink("dead");
    b.add_link(sus, vac, uptake);
    b.add_link(vac, sus, duration);
    b.add_link(vac, dead, death);
    b
}

#[test]
fn timed_compartment_gets_group_and_flush() {
    let graph = vaccination_builder().build(years(1.0)).unwrap();
    let index = IndexMap::from_graph(&graph);
    let vac = index.compartment("vac").unwrap();
    let flush = index.link("vac:sus:vac_dur").unwrap();
    let death = index.link("vac:dead:death").unwrap();
    let uptake = index.link("sus:vac:uptake").unwrap();

    assert_eq!(graph.groups().len(), 1);
    assert_eq!(graph.groups()[0].compartments, vec![vac]);
    assert_eq!(graph.bin_count(vac), Some(10));
    assert_eq!(graph.flush_link(vac), Some(flush));
    assert!(graph.is_flush(flush));
    assert!(!graph.is_flush(death));

    assert_eq!(graph.eligibility(flush), Eligibility::FinalResidual);
    assert_eq!(graph.eligibility(death), Eligibility::Full);
    assert_eq!(graph.eligibility(uptake), Eligibility::Full);
    assert_eq!(graph.arrival(uptake), Arrival::Fresh);
}

#[test]
fn bin_count_follows_step_size() {
    let graph = vaccination_builder().build(years(0.25)).unwrap();
    let vac = IndexMap::from_graph(&graph).compartment("vac").unwrap();
    assert_eq!(graph.bin_count(vac), Some(40));
}

#[test]
fn missing_flush_link() {
    let mut b = GraphBuilder::new();
    let d = b.add_constant("d", Format::Duration, 3.0);
    let p = b.add_constant("p", Format::Probability, 0.1);
    let vac = b.add_timed_compartment("vac", d);
    let dead = b.add_sink("dead");
    b.add_link(vac, dead, p);

    let err = b.build(years(1.0)).unwrap_err();
    assert_eq!(
        err,
        GraphError::MissingFlushLink {
            compartment: "vac".into()
        }
    );
}

#[test]
fn multiple_flush_links() {
    let mut b = GraphBuilder::new();
    let d = b.add_constant("d", Format::Duration, 3.0);
    let vac = b.add_timed_compartment("vac", d);
    let sus = b.add_compartment("sus");
    let dead = b.add_sink("dead");
    b.add_link(vac, sus, d);
    b.add_link(vac, dead, d);

    let err = b.build(years(1.0)).unwrap_err();
    assert!(matches!(err, GraphError::MultipleFlushLinks { count: 2, .. }));
}

#[test]
fn self_flush_is_rejected() {
    let mut b = GraphBuilder::new();
    let d = b.add_constant("d", Format::Duration, 3.0);
    let first = b.add_timed_compartment("first", d);
    let second = b.add_timed_compartment("second", d);
    let sus = b.add_compartment("sus");
    b.add_link(first, second, d);
    b.add_link(second, sus, d);

    let err = b.build(years(1.0)).unwrap_err();
    assert_eq!(
        err,
        GraphError::SelfFlush {
            link: "first:second:d".into(),
            group: "d".into()
        }
    );
}

#[test]
fn non_constant_duration_is_rejected() {
    let mut b = GraphBuilder::new();
    let d = b.add_parameter(
        "d",
        Format::Duration,
        ParameterValue::Series(vec![(2000.0, 2.0), (2010.0, 4.0)]),
    );
    let vac = b.add_timed_compartment("vac", d);
    let sus = b.add_compartment("sus");
    b.add_link(vac, sus, d);

    let err = b.build(years(1.0)).unwrap_err();
    assert!(matches!(err, GraphError::InvalidDuration { .. }));
    assert!(err.to_string().contains("constant"));
}

#[test]
fn targetable_duration_is_rejected() {
    let mut b = GraphBuilder::new();
    let d = b.add_constant("d", Format::Duration, 2.0);
    b.mark_targetable(d);
    let vac = b.add_timed_compartment("vac", d);
    let sus = b.add_compartment("sus");
    b.add_link(vac, sus, d);

    let err = b.build(years(1.0)).unwrap_err();
    assert!(matches!(err, GraphError::InvalidDuration { .. }));
}

#[test]
fn proportion_outside_junction_is_rejected() {
    let mut b = GraphBuilder::new();
    let split = b.add_constant("split", Format::Proportion, 0.5);
    let sus = b.add_compartment("sus");
    let dead = b.add_sink("dead");
    b.add_link(sus, dead, split);

    let err = b.build(years(1.0)).unwrap_err();
    assert!(matches!(err, GraphError::IllegalLink { .. }));
}

#[test]
fn probability_out_of_junction_is_rejected() {
    let mut b = GraphBuilder::new();
    let p = b.add_constant("p", Format::Probability, 0.5);
    let j = b.add_junction("j");
    let dead = b.add_sink("dead");
    b.add_link(j, dead, p);

    assert!(matches!(
        b.build(years(1.0)),
        Err(GraphError::IllegalLink { .. })
    ));
}

#[test]
fn out_of_range_probability_is_rejected() {
    let mut b = GraphBuilder::new();
    let p = b.add_constant("p", Format::Probability, 1.5);
    let sus = b.add_compartment("sus");
    let dead = b.add_sink("dead");
    b.add_link(sus, dead, p);

    let err = b.build(years(1.0)).unwrap_err();
    assert!(matches!(err, GraphError::InvalidParameter { .. }));
}

#[test]
fn derivative_parameter_cannot_drive_link() {
    let mut b = GraphBuilder::new();
    let p = b.add_constant("p", Format::Number, 5.0);
    b.mark_derivative(p);
    let sus = b.add_compartment("sus");
    let dead = b.add_sink("dead");
    b.add_link(sus, dead, p);

    assert!(matches!(
        b.build(years(1.0)),
        Err(GraphError::IllegalLink { .. })
    ));
}

#[test]
fn source_outflows_must_be_numbers() {
    let mut b = GraphBuilder::new();
    let p = b.add_constant("p", Format::Probability, 0.5);
    let births = b.add_source("births");
    let sus = b.add_compartment("sus");
    b.add_link(births, sus, p);

    assert!(matches!(
        b.build(years(1.0)),
        Err(GraphError::IllegalLink { .. })
    ));
}

/// vac/vac_b/vac_c share one group; a junction splits timed flow from vac.
fn attached_junction_builder(exit_class: LinkClass) -> GraphBuilder {
    let mut b = GraphBuilder::new();
    let d = b.add_constant("d", Format::Duration, 5.0);
    let switch = b.add_constant("switch", Format::Probability, 0.2);
    let to_b = b.add_constant("to_b", Format::Proportion, 0.6);
    let to_c = b.add_constant("to_c", Format::Proportion, 0.4);
    let sus = b.add_compartment("sus");
    let vac = b.add_timed_compartment("vac", d);
    let vac_b = b.add_timed_compartment("vac_b", d);
    let vac_c = b.add_timed_compartment("vac_c", d);
    let j = b.add_junction("j");

    b.add_timed_link(vac, j, switch);
    b.add_timed_link(j, vac_b, to_b);
    b.add_link_with_class(j, vac_c, to_c, exit_class);
    b.add_link(vac, sus, d);
    b.add_link(vac_b, sus, d);
    b.add_link(vac_c, sus, d);
    b
}

#[test]
fn junction_attaches_to_group() {
    let graph = attached_junction_builder(LinkClass::Timed)
        .build(years(1.0))
        .unwrap();
    let index = IndexMap::from_graph(&graph);
    let vac = index.compartment("vac").unwrap();
    let j = index.compartment("j").unwrap();
    let into_j = index.link("vac:j:switch").unwrap();
    let out_of_j = index.link("j:vac_b:to_b").unwrap();

    assert_eq!(graph.group_of(j), graph.group_of(vac));
    assert_eq!(graph.groups()[0].junctions, vec![j]);
    assert_eq!(graph.groups()[0].compartments.len(), 3);
    assert_eq!(graph.eligibility(into_j), Eligibility::NonFinal);
    assert_eq!(graph.arrival(into_j), Arrival::AgePreserving);
    assert_eq!(graph.eligibility(out_of_j), Eligibility::Junction);
    assert_eq!(graph.junction_order(), &[j]);
}

#[test]
fn junction_exclusivity_violation() {
    let err = attached_junction_builder(LinkClass::Ordinary)
        .build(years(1.0))
        .unwrap_err();
    assert_eq!(
        err,
        GraphError::JunctionExclusivity {
            junction: "j".into(),
            group: "d".into(),
            link: "j:vac_c:to_c".into()
        }
    );
}

#[test]
fn junction_with_inputs_from_two_groups() {
    let mut b = GraphBuilder::new();
    let d1 = b.add_constant("d1", Format::Duration, 2.0);
    let d2 = b.add_constant("d2", Format::Duration, 4.0);
    let p = b.add_constant("p", Format::Probability, 0.1);
    let all = b.add_constant("all", Format::Proportion, 1.0);
    let sus = b.add_compartment("sus");
    let a = b.add_timed_compartment("a", d1);
    let c = b.add_timed_compartment("c", d2);
    let j = b.add_junction("j");
    b.add_link(a, sus, d1);
    b.add_link(c, sus, d2);
    b.add_timed_link(a, j, p);
    b.add_timed_link(c, j, p);
    b.add_timed_link(j, a, all);

    let err = b.build(years(1.0)).unwrap_err();
    assert_eq!(
        err,
        GraphError::MultipleUpstreamGroups {
            junction: "j".into(),
            groups: vec!["d1".into(), "d2".into()]
        }
    );
}

#[test]
fn junction_with_flush_inputs_from_two_groups() {
    let mut b = GraphBuilder::new();
    let d1 = b.add_constant("d1", Format::Duration, 2.0);
    let d2 = b.add_constant("d2", Format::Duration, 4.0);
    let all = b.add_constant("all", Format::Proportion, 1.0);
    let sus = b.add_compartment("sus");
    let a = b.add_timed_compartment("a", d1);
    let c = b.add_timed_compartment("c", d2);
    let j = b.add_junction("j");
    b.add_link(a, j, d1);
    b.add_link(c, j, d2);
    b.add_link(j, sus, all);

    let err = b.build(years(1.0)).unwrap_err();
    assert_eq!(
        err,
        GraphError::MultipleUpstreamGroups {
            junction: "j".into(),
            groups: vec!["d1".into(), "d2".into()]
        }
    );
}

#[test]
fn chained_junction_with_flush_inputs_from_two_groups() {
    let mut b = GraphBuilder::new();
    let d1 = b.add_constant("d1", Format::Duration, 2.0);
    let d2 = b.add_constant("d2", Format::Duration, 4.0);
    let all = b.add_constant("all", Format::Proportion, 1.0);
    let sus = b.add_compartment("sus");
    let a = b.add_timed_compartment("a", d1);
    let c = b.add_timed_compartment("c", d2);
    let upstream = b.add_junction("upstream");
    let merge = b.add_junction("merge");
    b.add_link(a, upstream, d1);
    b.add_link(upstream, merge, all);
    b.add_link(c, merge, d2);
    b.add_link(merge, sus, all);

    let err = b.build(years(1.0)).unwrap_err();
    assert!(matches!(
        err,
        GraphError::MultipleUpstreamGroups { junction, .. } if junction == "merge"
    ));
}

#[test]
fn flush_and_death_from_one_group_share_a_junction() {
    let mut b = GraphBuilder::new();
    let d = b.add_constant("d", Format::Duration, 3.0);
    let death = b.add_constant("death", Format::Probability, 0.1);
    let all = b.add_constant("all", Format::Proportion, 1.0);
    let sus = b.add_compartment("sus");
    let dead = b.add_sink("dead");
    let a = b.add_timed_compartment("a", d);
    let j = b.add_junction("j");
    b.add_link(a, j, d);
    b.add_link(a, j, death);
    b.add_link(sus, j, death);
    b.add_link(j, dead, all);

    let graph = b.build(years(1.0)).unwrap();
    assert_eq!(graph.group_of(j), None);
}

#[test]
fn flush_cannot_reenter_group() {
    let mut b = GraphBuilder::new();
    let d = b.add_constant("d", Format::Duration, 3.0);
    let back = b.add_constant("back", Format::Proportion, 1.0);
    let vac = b.add_timed_compartment("vac", d);
    let j = b.add_junction("j");
    b.add_link(vac, j, d);
    b.add_link(j, vac, back);

    let err = b.build(years(1.0)).unwrap_err();
    assert_eq!(
        err,
        GraphError::FlushReentry {
            link: "vac:j:d".into(),
            group: "d".into()
        }
    );
}

#[test]
fn flush_through_unattached_junction_is_allowed() {
    let mut b = GraphBuilder::new();
    let d = b.add_constant("d", Format::Duration, 3.0);
    let half = b.add_constant("half", Format::Proportion, 0.5);
    let vac = b.add_timed_compartment("vac", d);
    let sus = b.add_compartment("sus");
    let rec = b.add_compartment("rec");
    let j = b.add_junction("j");
    b.add_link(vac, j, d);
    b.add_link(j, sus, half);
    b.add_link(j, rec, half);

    let graph = b.build(years(1.0)).unwrap();
    assert_eq!(graph.group_of(j), None);
}

#[test]
fn junction_order_is_topological() {
    let mut b = GraphBuilder::new();
    let all = b.add_constant("all", Format::Proportion, 1.0);
    let sus = b.add_compartment("sus");
    let second = b.add_junction("second");
    let first = b.add_junction("first");
    b.add_link(first, second, all);
    b.add_link(second, sus, all);

    let graph = b.build(years(1.0)).unwrap();
    assert_eq!(graph.junction_order(), &[first, second]);
}

#[test]
fn junction_cycle_is_rejected() {
    let mut b = GraphBuilder::new();
    let all = b.add_constant("all", Format::Proportion, 1.0);
    let j1 = b.add_junction("j1");
    let j2 = b.add_junction("j2");
    b.add_link(j1, j2, all);
    b.add_link(j2, j1, all);

    let err = b.build(years(1.0)).unwrap_err();
    assert!(matches!(err, GraphError::JunctionCycle { .. }));
}

#[test]
fn junction_without_outflow_is_rejected() {
    let mut b = GraphBuilder::new();
    let p = b.add_constant("p", Format::Probability, 0.1);
    let sus = b.add_compartment("sus");
    let j = b.add_junction("j");
    b.add_link(sus, j, p);

    assert_eq!(
        b.build(years(1.0)).unwrap_err(),
        GraphError::JunctionWithoutOutflow {
            junction: "j".into()
        }
    );
}

#[test]
fn transfers_connect_populations() {
    let mut b = GraphBuilder::new();
    let d_child = b.add_constant("d_child", Format::Duration, 10.0);
    let d_adult = b.add_constant("d_adult", Format::Duration, 15.0);
    let age = b.add_constant("age", Format::Probability, 0.05);
    let child = b.add_timed_compartment("vac_child", d_child);
    let adult = b.add_timed_compartment("vac_adult", d_adult);
    let sus_child = b.add_compartment("sus_child");
    let sus_adult = b.add_compartment("sus_adult");
    for (c, pop) in [
        (child, "children"),
        (sus_child, "children"),
        (adult, "adults"),
        (sus_adult, "adults"),
    ] {
        b.set_population(c, pop);
    }
    b.add_link(child, sus_child, d_child);
    b.add_link(adult, sus_adult, d_adult);
    let transfer = b.add_transfer(child, adult, age);

    let graph = b.build(years(1.0)).unwrap();
    assert_eq!(graph.eligibility(transfer), Eligibility::NonFinal);
    assert_eq!(graph.arrival(transfer), Arrival::Remap { from: 10, to: 15 });
}

#[test]
fn transfer_within_population_is_rejected() {
    let mut b = GraphBuilder::new();
    let p = b.add_constant("p", Format::Probability, 0.1);
    let a = b.add_compartment("a");
    let c = b.add_compartment("c");
    b.add_transfer(a, c, p);

    assert!(matches!(
        b.build(years(1.0)),
        Err(GraphError::IllegalLink { .. })
    ));
}

#[test]
fn ordinary_link_across_populations_is_rejected() {
    let mut b = GraphBuilder::new();
    let p = b.add_constant("p", Format::Probability, 0.1);
    let a = b.add_compartment("a");
    let c = b.add_compartment("c");
    b.set_population(c, "other");
    b.add_link(a, c, p);

    assert!(matches!(
        b.build(years(1.0)),
        Err(GraphError::IllegalLink { .. })
    ));
}

#[test]
fn timed_link_between_groups_is_rejected() {
    let mut b = GraphBuilder::new();
    let d1 = b.add_constant("d1", Format::Duration, 2.0);
    let d2 = b.add_constant("d2", Format::Duration, 3.0);
    let p = b.add_constant("p", Format::Probability, 0.1);
    let sus = b.add_compartment("sus");
    let a = b.add_timed_compartment("a", d1);
    let c = b.add_timed_compartment("c", d2);
    b.add_link(a, sus, d1);
    b.add_link(c, sus, d2);
    b.add_timed_link(a, c, p);

    assert!(matches!(
        b.build(years(1.0)),
        Err(GraphError::IllegalLink { .. })
    ));
}

#[test]
fn duplicate_link_is_rejected() {
    let mut b = GraphBuilder::new();
    let p = b.add_constant("p", Format::Probability, 0.1);
    let a = b.add_compartment("a");
    let c = b.add_compartment("c");
    b.add_link(a, c, p);
    b.add_link(a, c, p);

    assert!(matches!(
        b.build(years(1.0)),
        Err(GraphError::DuplicateName { what: "link", .. })
    ));
}

//! Name lookups for graph objects.
//!
//! Models are authored by name; the engine works by ID. `IndexMap` provides
//! O(1) name -> ID lookup for parameters, compartments and links.

use std::collections::HashMap;

use pf_core::{CompartmentId, LinkId, ParamId};

use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;

#[derive(Debug, Clone, Default)]
pub struct IndexMap {
    parameters: HashMap<String, ParamId>,
    compartments: HashMap<String, CompartmentId>,
    links: HashMap<String, LinkId>,
}

impl IndexMap {
    /// Build an index map from a graph.
    pub fn from_graph(graph: &Graph) -> Self {
        Self {
            parameters: graph
                .parameters()
                .iter()
                .map(|p| (p.name.clone(), p.id))
                .collect(),
            compartments: graph
                .compartments()
                .iter()
                .map(|c| (c.name.clone(), c.id))
                .collect(),
            links: graph.links().iter().map(|l| (l.name.clone(), l.id)).collect(),
        }
    }

    pub fn parameter(&self, name: &str) -> GraphResult<ParamId> {
        self.parameters
            .get(name)
            .copied()
            .ok_or_else(|| not_found("parameter", name))
    }

    pub fn compartment(&self, name: &str) -> GraphResult<CompartmentId> {
        self.compartments
            .get(name)
            .copied()
            .ok_or_else(|| not_found("compartment", name))
    }

    /// Links are named `source:dest:parameter`.
    pub fn link(&self, name: &str) -> GraphResult<LinkId> {
        self.links
            .get(name)
            .copied()
            .ok_or_else(|| not_found("link", name))
    }

    pub fn num_parameters(&self) -> usize {
        self.parameters.len()
    }

    pub fn num_compartments(&self) -> usize {
        self.compartments.len()
    }

    pub fn num_links(&self) -> usize {
        self.links.len()
    }
}

fn not_found(what: &'static str, name: &str) -> GraphError {
    GraphError::NameNotFound {
        what,
        name: name.to_string(),
    }
}

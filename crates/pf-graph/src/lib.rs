//! pf-graph: model topology layer for popflow.
//!
//! Provides:
//! - Core topology data structures (Compartment, Link, Parameter, DurationGroup, Graph)
//! - Incremental graph builder with build-time legality checks
//! - Duration group resolution and junction attachment
//! - Name lookups for authoring tools
//!
//! # Example
//!
//! ```
//! use pf_core::{Format, years};
//! use pf_graph::GraphBuilder;
//!
//! let mut builder = GraphBuilder::new();
//! let duration = builder.add_constant("vac_duration", Format::Duration, 5.0);
//! let sus = builder.add_compartment("sus");
//! let vac = builder.add_timed_compartment("vac", duration);
//! let uptake = builder.add_constant("uptake", Format::Probability, 0.1);
//! builder.add_link(sus, vac, uptake);
//! builder.add_link(vac, sus, duration);
//! let graph = builder.build(years(1.0)).unwrap();
//!
//! assert_eq!(graph.groups().len(), 1);
//! assert_eq!(graph.bin_count(vac), Some(5));
//! ```

pub mod builder;
pub mod error;
pub mod graph;
pub mod indexing;
pub(crate) mod validate;

// Re-exports for ergonomics
pub use builder::GraphBuilder;
pub use error::{GraphError, GraphResult};
pub use graph::{
    Arrival, Compartment, CompartmentKind, DurationGroup, Eligibility, Graph, Link, LinkClass,
    Parameter, ParameterValue,
};
pub use indexing::IndexMap;

//! Topology construction and validation errors.

use pf_core::PfError;

pub type GraphResult<T> = Result<T, GraphError>;

/// Build-time errors. A graph that fails any of these never runs.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphError {
    /// An ID refers to an object that doesn't exist in this builder.
    InvalidRef { what: &'static str, index: usize },

    /// Two objects of the same kind share a name.
    DuplicateName { what: &'static str, name: String },

    /// A name lookup failed.
    NameNotFound { what: &'static str, name: String },

    /// A parameter value is malformed or outside its format's range.
    InvalidParameter { parameter: String, reason: String },

    /// A compartment's initial size is negative or not finite.
    InvalidInitial { compartment: String, value: f64 },

    /// A timed compartment's duration parameter is unusable.
    InvalidDuration { compartment: String, reason: String },

    /// A link is not legal for its endpoints, class or parameter format.
    IllegalLink { link: String, reason: String },

    /// A timed compartment has no flush link.
    MissingFlushLink { compartment: String },

    /// A timed compartment has more than one flush link.
    MultipleFlushLinks { compartment: String, count: usize },

    /// A flush link terminates inside its own duration group.
    SelfFlush { link: String, group: String },

    /// A junction mixes links that touch a duration group with links that don't.
    JunctionExclusivity {
        junction: String,
        group: String,
        link: String,
    },

    /// A junction receives timed or flush inputs from more than one duration group.
    MultipleUpstreamGroups { junction: String, groups: Vec<String> },

    /// Flow flushed out of a group can reach that group again through junctions.
    FlushReentry { link: String, group: String },

    /// A junction has nowhere to send its inflow.
    JunctionWithoutOutflow { junction: String },

    /// Junctions form a cycle and cannot be resolved within one step.
    JunctionCycle { junctions: Vec<String> },

    /// The step size is not usable.
    InvalidStep { reason: String },
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphError::InvalidRef { what, index } => {
                write!(f, "{} {} does not exist", what, index)
            }
            GraphError::DuplicateName { what, name } => {
                write!(f, "Duplicate {} name '{}'", what, name)
            }
            GraphError::NameNotFound { what, name } => {
                write!(f, "No {} named '{}'", what, name)
            }
            GraphError::InvalidParameter { parameter, reason } => {
                write!(f, "Parameter '{}' is invalid: {}", parameter, reason)
            }
            GraphError::InvalidInitial { compartment, value } => {
                write!(
                    f,
                    "Compartment '{}' has an invalid initial size {}",
                    compartment, value
                )
            }
            GraphError::InvalidDuration {
                compartment,
                reason,
            } => {
                write!(
                    f,
                    "Timed compartment '{}' has an invalid duration: {}",
                    compartment, reason
                )
            }
            GraphError::IllegalLink { link, reason } => {
                write!(f, "Link '{}' is not allowed: {}", link, reason)
            }
            GraphError::MissingFlushLink { compartment } => {
                write!(f, "Timed compartment '{}' has no flush link", compartment)
            }
            GraphError::MultipleFlushLinks { compartment, count } => {
                write!(
                    f,
                    "Timed compartment '{}' has {} flush links (expected 1)",
                    compartment, count
                )
            }
            GraphError::SelfFlush { link, group } => {
                write!(
                    f,
                    "Flush link '{}' terminates inside its own duration group '{}'",
                    link, group
                )
            }
            GraphError::JunctionExclusivity {
                junction,
                group,
                link,
            } => {
                write!(
                    f,
                    "Junction '{}' is attached to duration group '{}' but link '{}' is not a timed link within that group",
                    junction, group, link
                )
            }
            GraphError::MultipleUpstreamGroups { junction, groups } => {
                write!(
                    f,
                    "Junction '{}' receives timed or flush inputs from several duration groups: {}",
                    junction,
                    groups.join(", ")
                )
            }
            GraphError::FlushReentry { link, group } => {
                write!(
                    f,
                    "Flush link '{}' leads back into duration group '{}'",
                    link, group
                )
            }
            GraphError::JunctionWithoutOutflow { junction } => {
                write!(f, "Junction '{}' has no outflow links", junction)
            }
            GraphError::JunctionCycle { junctions } => {
                write!(f, "Junctions form a cycle: {}", junctions.join(" -> "))
            }
            GraphError::InvalidStep { reason } => {
                write!(f, "Invalid step size: {}", reason)
            }
        }
    }
}

impl std::error::Error for GraphError {}

impl From<GraphError> for PfError {
    fn from(err: GraphError) -> Self {
        PfError::Invariant {
            what: err.to_string(),
        }
    }
}

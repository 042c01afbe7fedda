//! pf-core: stable foundation for popflow.
//!
//! Contains:
//! - units (uom time types in years + constructors)
//! - numeric (Real + tolerances + float helpers)
//! - ids (stable compact IDs for topology objects)
//! - quantity (parameter values with format/timescale and per-step conversion)
//! - error (shared error types)

pub mod error;
pub mod ids;
pub mod numeric;
pub mod quantity;
pub mod units;

// Re-exports: nice ergonomics for downstream crates
pub use error::{PfError, PfResult};
pub use ids::*;
pub use numeric::*;
pub use quantity::{Format, Quantity};
pub use units::*;

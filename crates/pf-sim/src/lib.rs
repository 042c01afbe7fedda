//! Discrete-time stepping for popflow models.
//!
//! Provides:
//! - Per-step parameter evaluation behind the `ParameterSource` seam
//! - Competing-demand disaggregation with final-bin eligibility rules
//! - Zero-storage junction pass-through
//! - Timed compartment bin advance and cross-duration remapping
//! - Fixed-step run loop with per-step flow recording

pub mod error;
pub mod params;
pub mod resolve;
pub mod sim;
pub mod state;
pub mod timed;

// Internal modules
mod junction;

// Re-exports for public API
pub use error::{SimError, SimResult};
pub use params::{ParameterSource, ParameterTable, evaluate_parameters};
pub use resolve::{LinkFlow, StepFlows, resolve_step, source_popsize};
pub use sim::{SimOptions, SimRecord, run_sim};
pub use state::{CompartmentState, ModelState};
pub use timed::remap_bin;

//! pf-project: model file format, validation and compilation.

pub mod compile;
pub mod migrate;
pub mod schema;
pub mod validate;

pub use compile::{CompiledModel, compile_model};
pub use migrate::{LATEST_VERSION, migrate_to_latest};
pub use schema::*;
pub use validate::{ValidationError, validate_model};

pub type ProjectResult<T> = Result<T, ProjectError>;

#[derive(thiserror::Error, Debug)]
pub enum ProjectError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Migration error: {what}")]
    Migration { what: String },

    #[error("Model error: {0}")]
    Graph(#[from] pf_graph::GraphError),

    #[error("Simulation error: {0}")]
    Sim(#[from] pf_sim::SimError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub fn load_yaml(path: &std::path::Path) -> ProjectResult<ModelDef> {
    let content = std::fs::read_to_string(path)?;
    let mut model: ModelDef = serde_yaml::from_str(&content)?;
    model = migrate_to_latest(model)?;
    validate_model(&model)?;
    Ok(model)
}

pub fn save_yaml(path: &std::path::Path, model: &ModelDef) -> ProjectResult<()> {
    validate_model(model)?;
    let content = serde_yaml::to_string(model)?;
    std::fs::write(path, content)?;
    Ok(())
}

pub fn load_json(path: &std::path::Path) -> ProjectResult<ModelDef> {
    let content = std::fs::read_to_string(path)?;
    let mut model: ModelDef = serde_json::from_str(&content)?;
    model = migrate_to_latest(model)?;
    validate_model(&model)?;
    Ok(model)
}

pub fn save_json(path: &std::path::Path, model: &ModelDef) -> ProjectResult<()> {
    validate_model(model)?;
    let content = serde_json::to_string_pretty(model)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Load a model file, picking the format from its extension (`.json`, else
/// YAML).
pub fn load_model(path: &std::path::Path) -> ProjectResult<ModelDef> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => load_json(path),
        _ => load_yaml(path),
    }
}

/// Compile and run a model with its own settings.
pub fn run_model(model: &ModelDef) -> ProjectResult<pf_sim::SimRecord> {
    let compiled = compile_model(model)?;
    let record = pf_sim::run_sim(&compiled.graph, &compiled.parameters, &compiled.options)?;
    Ok(record)
}

//! Schema migration framework.

use crate::ProjectError;
use crate::schema::{ModelDef, ValueDef};

pub const LATEST_VERSION: u32 = 2;

pub fn migrate_to_latest(mut model: ModelDef) -> Result<ModelDef, ProjectError> {
    while model.version < LATEST_VERSION {
        model = migrate_one_version(model)?;
    }
    Ok(model)
}

fn migrate_one_version(model: ModelDef) -> Result<ModelDef, ProjectError> {
    match model.version {
        0 => migrate_v0_to_v1(model),
        1 => migrate_v1_to_v2(model),
        v => Err(ProjectError::Migration {
            what: format!("No migration path from version {}", v),
        }),
    }
}

fn migrate_v0_to_v1(mut model: ModelDef) -> Result<ModelDef, ProjectError> {
    model.version = 1;
    Ok(model)
}

/// Version 1 accepted series points in any order; version 2 requires them
/// sorted by time.
fn migrate_v1_to_v2(mut model: ModelDef) -> Result<ModelDef, ProjectError> {
    for parameter in &mut model.parameters {
        if let ValueDef::Series { points } = &mut parameter.value {
            if points.iter().any(|p| p.t.is_nan()) {
                return Err(ProjectError::Migration {
                    what: format!("series '{}' has a NaN time point", parameter.name),
                });
            }
            points.sort_by(|a, b| a.t.total_cmp(&b.t));
        }
    }

    model.version = 2;
    Ok(model)
}

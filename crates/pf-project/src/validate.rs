//! Model file validation.
//!
//! Catches file-level mistakes (duplicate names, dangling references,
//! malformed values) before compiling. Topology rules are enforced later by
//! the graph builder.

use crate::schema::{CompartmentKindDef, ModelDef, ParameterDef, SettingsDef, ValueDef};
use std::collections::HashSet;

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Duplicate name: {name} in {context}")]
    DuplicateName { name: String, context: String },

    #[error("Missing reference: {name} in {context}")]
    MissingReference { name: String, context: String },

    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

pub fn validate_model(model: &ModelDef) -> Result<(), ValidationError> {
    if model.version > crate::migrate::LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: model.version,
        });
    }

    let mut parameter_names = HashSet::new();
    for parameter in &model.parameters {
        if !parameter_names.insert(parameter.name.as_str()) {
            return Err(ValidationError::DuplicateName {
                name: parameter.name.clone(),
                context: "parameters".to_string(),
            });
        }
        validate_parameter(parameter)?;
    }

    let mut compartment_names = HashSet::new();
    for compartment in &model.compartments {
        if !compartment_names.insert(compartment.name.as_str()) {
            return Err(ValidationError::DuplicateName {
                name: compartment.name.clone(),
                context: "compartments".to_string(),
            });
        }
        if !compartment.initial.is_finite() || compartment.initial < 0.0 {
            return Err(ValidationError::InvalidValue {
                field: format!("compartment '{}' initial", compartment.name),
                value: compartment.initial.to_string(),
                reason: "must be a finite, non-negative size".to_string(),
            });
        }
        if let CompartmentKindDef::Timed { duration } = &compartment.kind
            && !parameter_names.contains(duration.as_str())
        {
            return Err(ValidationError::MissingReference {
                name: duration.clone(),
                context: format!("compartment '{}' duration", compartment.name),
            });
        }
    }

    for link in &model.links {
        let context = format!("link {} -> {}", link.from, link.to);
        for name in [&link.from, &link.to] {
            if !compartment_names.contains(name.as_str()) {
                return Err(ValidationError::MissingReference {
                    name: name.clone(),
                    context: context.clone(),
                });
            }
        }
        if !parameter_names.contains(link.parameter.as_str()) {
            return Err(ValidationError::MissingReference {
                name: link.parameter.clone(),
                context,
            });
        }
    }

    validate_settings(&model.settings)
}

fn validate_parameter(parameter: &ParameterDef) -> Result<(), ValidationError> {
    if !parameter.timescale.is_finite() || parameter.timescale <= 0.0 {
        return Err(ValidationError::InvalidValue {
            field: format!("parameter '{}' timescale", parameter.name),
            value: parameter.timescale.to_string(),
            reason: "must be a positive number of years".to_string(),
        });
    }

    match &parameter.value {
        ValueDef::Constant { value } if !value.is_finite() => Err(ValidationError::InvalidValue {
            field: format!("parameter '{}' value", parameter.name),
            value: value.to_string(),
            reason: "must be finite".to_string(),
        }),
        ValueDef::Series { points } => {
            let field = format!("parameter '{}' series", parameter.name);
            if points.is_empty() {
                return Err(ValidationError::InvalidValue {
                    field,
                    value: "[]".to_string(),
                    reason: "series needs at least one point".to_string(),
                });
            }
            if let Some(p) = points
                .iter()
                .find(|p| !p.t.is_finite() || !p.value.is_finite())
            {
                return Err(ValidationError::InvalidValue {
                    field,
                    value: format!("({}, {})", p.t, p.value),
                    reason: "points must be finite".to_string(),
                });
            }
            if let Some(w) = points.windows(2).find(|w| w[1].t <= w[0].t) {
                return Err(ValidationError::InvalidValue {
                    field,
                    value: format!("{} after {}", w[1].t, w[0].t),
                    reason: "time points must be strictly increasing".to_string(),
                });
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn validate_settings(settings: &SettingsDef) -> Result<(), ValidationError> {
    if !settings.dt.is_finite() || settings.dt <= 0.0 {
        return Err(ValidationError::InvalidValue {
            field: "settings.dt".to_string(),
            value: settings.dt.to_string(),
            reason: "must be a positive number of years".to_string(),
        });
    }
    if !settings.t_start.is_finite()
        || !settings.t_end.is_finite()
        || settings.t_end < settings.t_start
    {
        return Err(ValidationError::InvalidValue {
            field: "settings.t_end".to_string(),
            value: settings.t_end.to_string(),
            reason: format!("must be finite and not before t_start ({})", settings.t_start),
        });
    }
    if settings.max_steps == 0 {
        return Err(ValidationError::InvalidValue {
            field: "settings.max_steps".to_string(),
            value: "0".to_string(),
            reason: "must allow at least one step".to_string(),
        });
    }
    Ok(())
}

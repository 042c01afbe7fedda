//! Compile a validated model file into a runnable graph.

use std::collections::HashMap;

use pf_core::{CompartmentId, ParamId, years};
use pf_graph::{Graph, GraphBuilder, LinkClass, ParameterValue};
use pf_sim::{ParameterTable, SimOptions};

use crate::ProjectResult;
use crate::schema::{CompartmentKindDef, LinkClassDef, ModelDef, SettingsDef, ValueDef};
use crate::validate::{ValidationError, validate_model};

/// Everything needed to run a model file.
#[derive(Debug)]
pub struct CompiledModel {
    pub graph: Graph,
    /// Per-run overrides, empty after compilation. External parameters must
    /// be supplied here (or through another `ParameterSource`) before running.
    pub parameters: ParameterTable,
    pub options: SimOptions,
}

pub fn compile_model(model: &ModelDef) -> ProjectResult<CompiledModel> {
    validate_model(model)?;

    let mut builder = GraphBuilder::new();
    let mut params: HashMap<&str, ParamId> = HashMap::new();
    for def in &model.parameters {
        let value = match &def.value {
            ValueDef::Constant { value } => ParameterValue::Constant(*value),
            ValueDef::Series { points } => {
                ParameterValue::Series(points.iter().map(|p| (p.t, p.value)).collect())
            }
            ValueDef::External => ParameterValue::External,
        };
        let id = builder.add_parameter(def.name.clone(), def.format, value);
        builder.set_timescale(id, years(def.timescale));
        if def.derivative {
            builder.mark_derivative(id);
        }
        if def.targetable {
            builder.mark_targetable(id);
        }
        params.insert(def.name.as_str(), id);
    }

    let mut compartments: HashMap<&str, CompartmentId> = HashMap::new();
    for def in &model.compartments {
        let name = def.name.clone();
        let id = match &def.kind {
            CompartmentKindDef::Ordinary => builder.add_compartment(name),
            CompartmentKindDef::Timed { duration } => {
                builder.add_timed_compartment(name, lookup(&params, duration, &def.name)?)
            }
            CompartmentKindDef::Source => builder.add_source(name),
            CompartmentKindDef::Sink => builder.add_sink(name),
            CompartmentKindDef::Junction => builder.add_junction(name),
        };
        if let Some(population) = &def.population {
            builder.set_population(id, population.clone());
        }
        builder.set_initial(id, def.initial);
        compartments.insert(def.name.as_str(), id);
    }

    for def in &model.links {
        let context = format!("link {} -> {}", def.from, def.to);
        let class = match def.class {
            LinkClassDef::Ordinary => LinkClass::Ordinary,
            LinkClassDef::Timed => LinkClass::Timed,
            LinkClassDef::Transfer => LinkClass::Transfer,
        };
        builder.add_link_with_class(
            lookup(&compartments, &def.from, &context)?,
            lookup(&compartments, &def.to, &context)?,
            lookup(&params, &def.parameter, &context)?,
            class,
        );
    }

    let graph = builder.build(years(model.settings.dt))?;
    tracing::debug!(
        model = %model.name,
        parameters = graph.parameters().len(),
        compartments = graph.compartments().len(),
        links = graph.links().len(),
        groups = graph.groups().len(),
        "compiled model"
    );

    Ok(CompiledModel {
        graph,
        parameters: ParameterTable::new(),
        options: sim_options(&model.settings),
    })
}

fn sim_options(settings: &SettingsDef) -> SimOptions {
    SimOptions {
        t_start: settings.t_start,
        t_end: settings.t_end,
        dt: settings.dt,
        max_steps: settings.max_steps,
    }
}

fn lookup<T: Copy>(ids: &HashMap<&str, T>, name: &str, context: &str) -> ProjectResult<T> {
    ids.get(name).copied().ok_or_else(|| {
        ValidationError::MissingReference {
            name: name.to_string(),
            context: context.to_string(),
        }
        .into()
    })
}

//! Model file schema definitions.

use pf_core::Format;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelDef {
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<ParameterDef>,
    #[serde(default)]
    pub compartments: Vec<CompartmentDef>,
    #[serde(default)]
    pub links: Vec<LinkDef>,
    #[serde(default)]
    pub settings: SettingsDef,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParameterDef {
    pub name: String,
    pub format: Format,
    /// Years the magnitude refers to (Probability and Number only).
    #[serde(default = "default_timescale")]
    pub timescale: f64,
    pub value: ValueDef,
    #[serde(default, skip_serializing_if = "is_false")]
    pub derivative: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub targetable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValueDef {
    Constant { value: f64 },
    Series { points: Vec<SeriesPointDef> },
    /// Supplied at run time by an external evaluator.
    External,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SeriesPointDef {
    pub t: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompartmentDef {
    pub name: String,
    pub kind: CompartmentKindDef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population: Option<String>,
    #[serde(default)]
    pub initial: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompartmentKindDef {
    Ordinary,
    Timed {
        /// Name of the Duration-format parameter.
        duration: String,
    },
    Source,
    Sink,
    Junction,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkDef {
    pub from: String,
    pub to: String,
    pub parameter: String,
    #[serde(default)]
    pub class: LinkClassDef,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LinkClassDef {
    #[default]
    Ordinary,
    Timed,
    Transfer,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettingsDef {
    pub t_start: f64,
    pub t_end: f64,
    pub dt: f64,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

impl Default for SettingsDef {
    fn default() -> Self {
        Self {
            t_start: 2000.0,
            t_end: 2030.0,
            dt: 1.0,
            max_steps: default_max_steps(),
        }
    }
}

fn default_timescale() -> f64 {
    1.0
}

fn default_max_steps() -> usize {
    100_000
}

fn is_false(value: &bool) -> bool {
    !*value
}

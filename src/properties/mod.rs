//! Supported physical property kinds and their default workflows.
//!
//! Every kind the client knows about is a variant of [`PropertyKind`], and
//! each kind decides for itself which calculation layers it has a default
//! workflow for. A [`PropertyRegistry`] is handed to the options assembler so
//! tests can substitute a fake.

mod density;
mod dielectric;
mod mixing;
mod protocols;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::layers::CalculationLayer;
use crate::workflow::WorkflowSchema;

/// A physical property type the estimator knows how to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyKind {
    Density,
    DielectricConstant,
    EnthalpyOfMixing,
    ExcessMolarVolume,
}

impl PropertyKind {
    pub const ALL: [PropertyKind; 4] = [
        PropertyKind::Density,
        PropertyKind::DielectricConstant,
        PropertyKind::EnthalpyOfMixing,
        PropertyKind::ExcessMolarVolume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyKind::Density => "Density",
            PropertyKind::DielectricConstant => "DielectricConstant",
            PropertyKind::EnthalpyOfMixing => "EnthalpyOfMixing",
            PropertyKind::ExcessMolarVolume => "ExcessMolarVolume",
        }
    }

    /// The workflow this kind uses with `layer`, if it supports that layer.
    pub fn default_workflow(&self, layer: CalculationLayer) -> Option<WorkflowSchema> {
        match (self, layer) {
            (PropertyKind::Density, CalculationLayer::Simulation) => {
                Some(density::simulation_schema())
            }
            (PropertyKind::Density, CalculationLayer::Reweighting) => {
                Some(density::reweighting_schema())
            }
            (PropertyKind::DielectricConstant, CalculationLayer::Simulation) => {
                Some(dielectric::simulation_schema())
            }
            (PropertyKind::EnthalpyOfMixing, CalculationLayer::Simulation) => {
                Some(mixing::enthalpy_of_mixing_schema())
            }
            (PropertyKind::ExcessMolarVolume, CalculationLayer::Simulation) => {
                Some(mixing::excess_molar_volume_schema())
            }
            _ => None,
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PropertyKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown property type: {}", s))
    }
}

/// Lookup of supported property types and their per-layer defaults.
pub trait PropertyRegistry {
    /// Whether properties named `type_name` can be estimated.
    fn is_supported(&self, type_name: &str) -> bool;

    /// Default workflow for `type_name` on the layer named `layer`.
    ///
    /// `None` means the layer contributes nothing for this type.
    fn default_workflow(&self, type_name: &str, layer: &str) -> Option<WorkflowSchema>;
}

/// Registry backed by the built-in [`PropertyKind`] definitions.
#[derive(Debug, Clone)]
pub struct BuiltinRegistry {
    kinds: Vec<PropertyKind>,
}

impl BuiltinRegistry {
    /// A registry supporting only `kinds`.
    pub fn with_kinds(kinds: &[PropertyKind]) -> Self {
        Self {
            kinds: kinds.to_vec(),
        }
    }

    pub fn lookup(&self, type_name: &str) -> Option<PropertyKind> {
        let kind = type_name.parse::<PropertyKind>().ok()?;
        self.kinds.contains(&kind).then_some(kind)
    }

    pub fn kinds(&self) -> &[PropertyKind] {
        &self.kinds
    }
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::with_kinds(&PropertyKind::ALL)
    }
}

impl PropertyRegistry for BuiltinRegistry {
    fn is_supported(&self, type_name: &str) -> bool {
        self.lookup(type_name).is_some()
    }

    fn default_workflow(&self, type_name: &str, layer: &str) -> Option<WorkflowSchema> {
        let kind = self.lookup(type_name)?;
        let layer = layer.parse::<CalculationLayer>().ok()?;
        kind.default_workflow(layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_respects_registered_kinds() {
        let registry = BuiltinRegistry::with_kinds(&[PropertyKind::Density]);
        assert_eq!(registry.lookup("Density"), Some(PropertyKind::Density));
        assert_eq!(registry.lookup("DielectricConstant"), None);
        assert_eq!(registry.lookup("HeatCapacity"), None);
    }

    #[test]
    fn test_default_layers_per_kind() {
        let registry = BuiltinRegistry::default();

        let layers_for = |type_name: &str| -> Vec<&'static str> {
            CalculationLayer::DEFAULT_ORDER
                .iter()
                .filter(|layer| registry.default_workflow(type_name, layer.as_str()).is_some())
                .map(|layer| layer.as_str())
                .collect()
        };

        assert_eq!(layers_for("Density"), vec!["ReweightingLayer", "SimulationLayer"]);
        assert_eq!(layers_for("DielectricConstant"), vec!["SimulationLayer"]);
        assert_eq!(layers_for("EnthalpyOfMixing"), vec!["SimulationLayer"]);
        assert_eq!(layers_for("ExcessMolarVolume"), vec!["SimulationLayer"]);
    }

    #[test]
    fn test_unknown_layer_has_no_default() {
        let registry = BuiltinRegistry::default();
        assert!(registry.default_workflow("Density", "QuantumLayer").is_none());
    }

    #[test]
    fn test_every_default_workflow_validates() {
        for kind in PropertyKind::ALL {
            for layer in CalculationLayer::DEFAULT_ORDER {
                if let Some(schema) = kind.default_workflow(layer) {
                    assert_eq!(schema.property_type, kind.as_str());
                    assert_eq!(schema.validate_interfaces(), Ok(()), "{} / {}", kind, layer);
                }
            }
        }
    }
}

//! Estimation options and the per-property, per-layer workflow assembly.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::ClientError;
use crate::layers::CalculationLayer;
use crate::models::PhysicalProperty;
use crate::properties::PropertyRegistry;
use crate::workflow::WorkflowSchema;

/// Workflows keyed by property type name, then by calculation layer name.
pub type WorkflowSchemas = IndexMap<String, IndexMap<String, Option<WorkflowSchema>>>;

/// Options controlling how the server estimates a batch of properties.
///
/// `gradient_properties` is carried on the wire but not yet acted upon by
/// the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimationOptions {
    /// Layers the server may use, in the order it should attempt them.
    pub allowed_calculation_layers: Vec<String>,
    /// Workflows to use. Missing entries are filled in with defaults when a
    /// request is built; populated entries are never overwritten.
    pub workflow_schemas: WorkflowSchemas,
    /// Target uncertainty as a multiple of the experimental uncertainty.
    pub relative_uncertainty_tolerance: f64,
    /// Allow identical steps across workflows to be merged by the server.
    pub allow_protocol_merging: bool,
    pub gradient_properties: Vec<String>,
}

impl Default for EstimationOptions {
    fn default() -> Self {
        Self {
            allowed_calculation_layers: CalculationLayer::default_names(),
            workflow_schemas: IndexMap::new(),
            relative_uncertainty_tolerance: 1.0,
            allow_protocol_merging: true,
            gradient_properties: Vec::new(),
        }
    }
}

impl EstimationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layers(mut self, layers: &[CalculationLayer]) -> Self {
        self.allowed_calculation_layers = layers.iter().map(|l| l.as_str().to_string()).collect();
        self
    }

    pub fn with_layer_names<S: Into<String>>(mut self, layers: impl IntoIterator<Item = S>) -> Self {
        self.allowed_calculation_layers = layers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_relative_uncertainty_tolerance(mut self, tolerance: f64) -> Self {
        self.relative_uncertainty_tolerance = tolerance;
        self
    }

    pub fn with_protocol_merging(mut self, allow: bool) -> Self {
        self.allow_protocol_merging = allow;
        self
    }

    /// Supply a workflow for `property_type` on `layer` up front.
    pub fn with_workflow(mut self, property_type: &str, layer: &str, schema: WorkflowSchema) -> Self {
        self.workflow_schemas
            .entry(property_type.to_string())
            .or_default()
            .insert(layer.to_string(), Some(schema));
        self
    }

    /// Check the values a caller may have set by hand.
    pub fn validate(&self) -> Result<(), ClientError> {
        let tolerance = self.relative_uncertainty_tolerance;
        if !tolerance.is_finite() || tolerance <= 0.0 {
            return Err(ClientError::InvalidTolerance(tolerance));
        }
        Ok(())
    }
}

/// Fills [`EstimationOptions::workflow_schemas`] with registry defaults.
pub struct OptionsAssembler<'a> {
    registry: &'a dyn PropertyRegistry,
}

impl<'a> OptionsAssembler<'a> {
    pub fn new(registry: &'a dyn PropertyRegistry) -> Self {
        Self { registry }
    }

    /// Populate default workflows for every property type in `properties`.
    ///
    /// Types which already have a non-empty entry are left untouched. For the
    /// others, each allowed layer with a default workflow gets a validated
    /// copy of it; layers without a default are skipped. When protocol
    /// merging is disabled every step of each recorded workflow has its merge
    /// flag forced off.
    ///
    /// # Errors
    ///
    /// - [`ClientError::UnsupportedProperty`] if a property type is not
    ///   registered.
    /// - [`ClientError::InvalidWorkflow`] if a default workflow fails
    ///   interface validation.
    pub fn assemble<'p>(
        &self,
        properties: impl IntoIterator<Item = &'p PhysicalProperty>,
        options: &mut EstimationOptions,
    ) -> Result<(), ClientError> {
        let mut visited: HashSet<&str> = HashSet::new();

        for property in properties {
            let type_name = property.property_type.as_str();

            if !self.registry.is_supported(type_name) {
                return Err(ClientError::UnsupportedProperty(type_name.to_string()));
            }

            if !visited.insert(type_name) {
                continue;
            }

            if options
                .workflow_schemas
                .get(type_name)
                .is_some_and(|layers| !layers.is_empty())
            {
                debug!("Keeping caller supplied workflows for {}", type_name);
                continue;
            }

            let layers = self.default_layers(type_name, options)?;
            options
                .workflow_schemas
                .insert(type_name.to_string(), layers);
        }

        Ok(())
    }

    fn default_layers(
        &self,
        type_name: &str,
        options: &EstimationOptions,
    ) -> Result<IndexMap<String, Option<WorkflowSchema>>, ClientError> {
        let mut layers = IndexMap::new();

        for layer in &options.allowed_calculation_layers {
            let Some(mut workflow) = self.registry.default_workflow(type_name, layer) else {
                debug!("{} has no default workflow for {}", type_name, layer);
                continue;
            };

            workflow
                .validate_interfaces()
                .map_err(|source| ClientError::InvalidWorkflow {
                    property_type: type_name.to_string(),
                    layer: layer.clone(),
                    source,
                })?;

            if !options.allow_protocol_merging {
                workflow.disable_protocol_merging();
            }

            debug!("Using default {} workflow for {}", layer, type_name);
            layers.insert(layer.clone(), Some(workflow));
        }

        Ok(layers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Substance, ThermodynamicState};
    use crate::properties::BuiltinRegistry;
    use crate::workflow::{ProtocolPath, ProtocolSchema};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    /// Registry returning hand-written workflows for a fixed set of layers.
    #[derive(Default)]
    struct FakeRegistry {
        layers: HashMap<&'static str, Vec<&'static str>>,
    }

    impl FakeRegistry {
        fn with(mut self, type_name: &'static str, layers: &[&'static str]) -> Self {
            self.layers.insert(type_name, layers.to_vec());
            self
        }
    }

    impl PropertyRegistry for FakeRegistry {
        fn is_supported(&self, type_name: &str) -> bool {
            self.layers.contains_key(type_name)
        }

        fn default_workflow(&self, type_name: &str, layer: &str) -> Option<WorkflowSchema> {
            if !self.layers.get(type_name)?.iter().any(|l| *l == layer) {
                return None;
            }
            let mut schema = WorkflowSchema::new(&format!("{}{}", type_name, layer), type_name);
            schema.add_protocol(
                ProtocolSchema::new("group", "ProtocolGroup")
                    .with_child(ProtocolSchema::new("inner", "Step").with_outputs(&["value"])),
            );
            schema.final_value_source = Some(ProtocolPath::new("value", &["group", "inner"]));
            Some(schema)
        }
    }

    fn property(type_name: &str) -> PhysicalProperty {
        PhysicalProperty::new(
            type_name,
            Substance::pure("O"),
            ThermodynamicState::new(298.15, Some(1.0)),
            1.0,
            "dimensionless",
        )
    }

    #[test]
    fn test_defaults() {
        let options = EstimationOptions::default();
        assert_eq!(
            options.allowed_calculation_layers,
            vec!["SurrogateLayer", "ReweightingLayer", "SimulationLayer"]
        );
        assert_eq!(options.relative_uncertainty_tolerance, 1.0);
        assert!(options.allow_protocol_merging);
        assert!(options.workflow_schemas.is_empty());
        assert!(options.gradient_properties.is_empty());
    }

    #[test]
    fn test_validate_rejects_non_positive_tolerance() {
        for tolerance in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let options = EstimationOptions::new().with_relative_uncertainty_tolerance(tolerance);
            assert!(matches!(
                options.validate(),
                Err(ClientError::InvalidTolerance(_))
            ));
        }
        assert!(EstimationOptions::new()
            .with_relative_uncertainty_tolerance(0.1)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_density_gets_only_layers_with_defaults() {
        let registry = BuiltinRegistry::default();
        let assembler = OptionsAssembler::new(&registry);
        let mut options = EstimationOptions::default();

        assembler.assemble([&property("Density")], &mut options).unwrap();

        let layers: Vec<&str> = options.workflow_schemas["Density"]
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(layers, vec!["ReweightingLayer", "SimulationLayer"]);
    }

    #[test]
    fn test_layer_order_is_preserved() {
        let registry = FakeRegistry::default().with("Density", &["A", "B", "C"]);
        let assembler = OptionsAssembler::new(&registry);
        let mut options = EstimationOptions::new().with_layer_names(["C", "X", "A"]);

        assembler.assemble([&property("Density")], &mut options).unwrap();

        let layers: Vec<&str> = options.workflow_schemas["Density"]
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(layers, vec!["C", "A"]);
    }

    #[test]
    fn test_unsupported_type_fails() {
        let registry = BuiltinRegistry::with_kinds(&[]);
        let assembler = OptionsAssembler::new(&registry);
        let mut options = EstimationOptions::default();

        let result = assembler.assemble([&property("Density")], &mut options);
        assert!(matches!(
            result,
            Err(ClientError::UnsupportedProperty(name)) if name == "Density"
        ));
    }

    #[test]
    fn test_caller_supplied_workflows_are_kept() {
        let registry = BuiltinRegistry::default();
        let assembler = OptionsAssembler::new(&registry);
        let custom = WorkflowSchema::new("Custom", "Density");
        let mut options =
            EstimationOptions::default().with_workflow("Density", "SimulationLayer", custom.clone());

        assembler.assemble([&property("Density")], &mut options).unwrap();

        let layers = &options.workflow_schemas["Density"];
        assert_eq!(layers.len(), 1);
        assert_eq!(layers["SimulationLayer"], Some(custom));
    }

    #[test]
    fn test_empty_entry_is_filled() {
        let registry = BuiltinRegistry::default();
        let assembler = OptionsAssembler::new(&registry);
        let mut options = EstimationOptions::default();
        options
            .workflow_schemas
            .insert("Density".to_string(), IndexMap::new());

        assembler.assemble([&property("Density")], &mut options).unwrap();

        assert_eq!(options.workflow_schemas["Density"].len(), 2);
    }

    #[test]
    fn test_merging_disabled_everywhere() {
        let registry = BuiltinRegistry::default();
        let assembler = OptionsAssembler::new(&registry);
        let mut options = EstimationOptions::default().with_protocol_merging(false);
        let batch = [
            property("Density"),
            property("DielectricConstant"),
            property("EnthalpyOfMixing"),
        ];

        assembler.assemble(&batch, &mut options).unwrap();

        let workflows: Vec<&WorkflowSchema> = options
            .workflow_schemas
            .values()
            .flat_map(|layers| layers.values().flatten())
            .collect();
        assert_eq!(workflows.len(), 4);
        for workflow in workflows {
            assert!(workflow
                .walk_protocols()
                .iter()
                .all(|(_, step)| !step.allows_merging()));
        }
    }

    #[test]
    fn test_merging_left_alone_by_default() {
        let registry = FakeRegistry::default().with("Density", &["SimulationLayer"]);
        let assembler = OptionsAssembler::new(&registry);
        let mut options = EstimationOptions::default();

        assembler.assemble([&property("Density")], &mut options).unwrap();

        let workflow = options.workflow_schemas["Density"]["SimulationLayer"]
            .as_ref()
            .unwrap();
        assert!(workflow
            .walk_protocols()
            .iter()
            .all(|(_, step)| step.allows_merging()));
    }

    #[test]
    fn test_second_assembly_is_a_no_op() {
        let registry = BuiltinRegistry::default();
        let assembler = OptionsAssembler::new(&registry);
        let batch = [property("Density"), property("ExcessMolarVolume")];
        let mut options = EstimationOptions::default();

        assembler.assemble(&batch, &mut options).unwrap();
        let first = options.clone();
        assembler.assemble(&batch, &mut options).unwrap();

        assert_eq!(options, first);
    }
}

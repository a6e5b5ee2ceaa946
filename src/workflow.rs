//! Workflow schema model sent to the server for each property type and layer.
//!
//! The client does not execute workflows. It only builds the default
//! schemas, checks that their protocol inputs and outputs interconnect,
//! and toggles the per-protocol merge flag.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reserved protocol input controlling whether identical steps may be merged.
pub const ALLOW_MERGING_KEY: &str = ".allow_merging";

/// Pseudo-protocol id referring to the workflow's global inputs.
pub const GLOBAL_PROTOCOL: &str = "global";

/// Errors raised by [`WorkflowSchema::validate_interfaces`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("{protocol} references {path}, but no such protocol exists in the workflow")]
    DanglingReference { protocol: String, path: String },

    #[error("{protocol} references {path}, but the target protocol has no output named {output}")]
    UnknownOutput {
        protocol: String,
        path: String,
        output: String,
    },

    #[error("protocol {protocol} is part of a dependency cycle")]
    Cycle { protocol: String },

    #[error("malformed protocol path: {0}")]
    MalformedPath(String),
}

/// A reference to a property of a protocol, `"outer/inner.property"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProtocolPath {
    protocol_ids: Vec<String>,
    property_name: String,
}

impl ProtocolPath {
    pub fn new(property_name: &str, protocol_ids: &[&str]) -> Self {
        Self {
            protocol_ids: protocol_ids.iter().map(|id| id.to_string()).collect(),
            property_name: property_name.to_string(),
        }
    }

    /// A path to one of the workflow's global inputs.
    pub fn global(property_name: &str) -> Self {
        Self::new(property_name, &[GLOBAL_PROTOCOL])
    }

    pub fn property_name(&self) -> &str {
        &self.property_name
    }

    pub fn protocol_ids(&self) -> &[String] {
        &self.protocol_ids
    }

    pub fn is_global(&self) -> bool {
        self.protocol_ids.first().map(String::as_str) == Some(GLOBAL_PROTOCOL)
    }

    /// Fully qualified id of the protocol the path points at.
    pub fn target_protocol(&self) -> String {
        self.protocol_ids.join("/")
    }
}

impl fmt::Display for ProtocolPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.protocol_ids.join("/"), self.property_name)
    }
}

impl TryFrom<String> for ProtocolPath {
    type Error = WorkflowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let (protocols, property) = value
            .rsplit_once('.')
            .ok_or_else(|| WorkflowError::MalformedPath(value.clone()))?;

        if protocols.is_empty() || property.is_empty() {
            return Err(WorkflowError::MalformedPath(value));
        }

        let protocol_ids: Vec<String> = protocols.split('/').map(str::to_string).collect();
        if protocol_ids.iter().any(String::is_empty) {
            return Err(WorkflowError::MalformedPath(value));
        }

        Ok(Self {
            protocol_ids,
            property_name: property.to_string(),
        })
    }
}

impl From<ProtocolPath> for String {
    fn from(path: ProtocolPath) -> Self {
        path.to_string()
    }
}

/// A single protocol input: either a literal or a reference to another output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProtocolValue {
    Path {
        #[serde(rename = "@path")]
        path: ProtocolPath,
    },
    Literal(serde_json::Value),
}

impl From<ProtocolPath> for ProtocolValue {
    fn from(path: ProtocolPath) -> Self {
        ProtocolValue::Path { path }
    }
}

impl From<serde_json::Value> for ProtocolValue {
    fn from(value: serde_json::Value) -> Self {
        ProtocolValue::Literal(value)
    }
}

/// Comparison used by conditional groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionType {
    LessThan,
    GreaterThan,
}

/// A loop condition on a conditional group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub left_hand_value: ProtocolValue,
    pub right_hand_value: ProtocolValue,
    pub condition_type: ConditionType,
}

/// Serialized description of one workflow step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolSchema {
    pub id: String,
    #[serde(rename = "type")]
    pub protocol_type: String,
    #[serde(default)]
    pub inputs: IndexMap<String, ProtocolValue>,
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Child protocols, for group protocols only.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub protocols: IndexMap<String, ProtocolSchema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl ProtocolSchema {
    /// A new step which allows merging by default.
    pub fn new(id: &str, protocol_type: &str) -> Self {
        let mut inputs = IndexMap::new();
        inputs.insert(
            ALLOW_MERGING_KEY.to_string(),
            ProtocolValue::Literal(serde_json::Value::Bool(true)),
        );

        Self {
            id: id.to_string(),
            protocol_type: protocol_type.to_string(),
            inputs,
            outputs: Vec::new(),
            protocols: IndexMap::new(),
            conditions: Vec::new(),
        }
    }

    pub fn with_input(mut self, name: &str, value: impl Into<ProtocolValue>) -> Self {
        self.inputs.insert(name.to_string(), value.into());
        self
    }

    pub fn with_outputs(mut self, outputs: &[&str]) -> Self {
        self.outputs.extend(outputs.iter().map(|o| o.to_string()));
        self
    }

    pub fn with_child(mut self, child: ProtocolSchema) -> Self {
        self.protocols.insert(child.id.clone(), child);
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn allows_merging(&self) -> bool {
        !matches!(
            self.inputs.get(ALLOW_MERGING_KEY),
            Some(ProtocolValue::Literal(serde_json::Value::Bool(false)))
        )
    }

    fn disable_merging(&mut self) {
        self.inputs.insert(
            ALLOW_MERGING_KEY.to_string(),
            ProtocolValue::Literal(serde_json::Value::Bool(false)),
        );
        for child in self.protocols.values_mut() {
            child.disable_merging();
        }
    }

    fn references(&self) -> impl Iterator<Item = &ProtocolPath> {
        let inputs = self.inputs.values();
        let conditions = self
            .conditions
            .iter()
            .flat_map(|c| [&c.left_hand_value, &c.right_hand_value]);

        inputs.chain(conditions).filter_map(|value| match value {
            ProtocolValue::Path { path } => Some(path),
            ProtocolValue::Literal(_) => None,
        })
    }
}

/// The full set of steps needed to estimate one property type with one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSchema {
    pub id: String,
    pub property_type: String,
    #[serde(default)]
    pub protocols: IndexMap<String, ProtocolSchema>,
    #[serde(default)]
    pub final_value_source: Option<ProtocolPath>,
    #[serde(default)]
    pub final_uncertainty_source: Option<ProtocolPath>,
    #[serde(default)]
    pub final_coordinate_source: Option<ProtocolPath>,
    #[serde(default)]
    pub final_trajectory_source: Option<ProtocolPath>,
}

impl WorkflowSchema {
    pub fn new(id: &str, property_type: &str) -> Self {
        Self {
            id: id.to_string(),
            property_type: property_type.to_string(),
            protocols: IndexMap::new(),
            final_value_source: None,
            final_uncertainty_source: None,
            final_coordinate_source: None,
            final_trajectory_source: None,
        }
    }

    pub fn add_protocol(&mut self, protocol: ProtocolSchema) {
        self.protocols.insert(protocol.id.clone(), protocol);
    }

    /// Force every step, including grouped children, to refuse merging.
    pub fn disable_protocol_merging(&mut self) {
        for protocol in self.protocols.values_mut() {
            protocol.disable_merging();
        }
    }

    /// Visit every step, depth first, with its fully qualified id.
    pub fn walk_protocols(&self) -> Vec<(String, &ProtocolSchema)> {
        fn visit<'a>(
            prefix: Option<&str>,
            protocols: &'a IndexMap<String, ProtocolSchema>,
            out: &mut Vec<(String, &'a ProtocolSchema)>,
        ) {
            for (id, protocol) in protocols {
                let full_id = match prefix {
                    Some(prefix) => format!("{}/{}", prefix, id),
                    None => id.clone(),
                };
                out.push((full_id.clone(), protocol));
                visit(Some(&full_id), &protocol.protocols, out);
            }
        }

        let mut out = Vec::new();
        visit(None, &self.protocols, &mut out);
        out
    }

    /// Check that every reference resolves to a declared output and that the
    /// dependency graph between steps is acyclic.
    pub fn validate_interfaces(&self) -> Result<(), WorkflowError> {
        let steps: HashMap<String, &ProtocolSchema> = self.walk_protocols().into_iter().collect();

        let mut edges: HashMap<&str, Vec<String>> = HashMap::new();

        for (full_id, protocol) in &steps {
            let dependencies = edges.entry(full_id.as_str()).or_default();
            for path in protocol.references() {
                if path.is_global() {
                    continue;
                }
                let target = check_reference(&steps, full_id, path)?;
                // A group reading its own children is not a dependency.
                if !target.starts_with(&format!("{}/", full_id)) {
                    dependencies.push(target);
                }
            }
        }

        let final_sources = [
            &self.final_value_source,
            &self.final_uncertainty_source,
            &self.final_coordinate_source,
            &self.final_trajectory_source,
        ];
        for path in final_sources.into_iter().flatten() {
            if !path.is_global() {
                check_reference(&steps, &self.id, path)?;
            }
        }

        detect_cycles(&edges)
    }
}

fn check_reference(
    steps: &HashMap<String, &ProtocolSchema>,
    referrer: &str,
    path: &ProtocolPath,
) -> Result<String, WorkflowError> {
    let target = path.target_protocol();

    let protocol = steps
        .get(&target)
        .ok_or_else(|| WorkflowError::DanglingReference {
            protocol: referrer.to_string(),
            path: path.to_string(),
        })?;

    if !protocol.outputs.iter().any(|o| o == path.property_name()) {
        return Err(WorkflowError::UnknownOutput {
            protocol: referrer.to_string(),
            path: path.to_string(),
            output: path.property_name().to_string(),
        });
    }

    Ok(target)
}

fn detect_cycles(edges: &HashMap<&str, Vec<String>>) -> Result<(), WorkflowError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit(
        node: &str,
        edges: &HashMap<&str, Vec<String>>,
        marks: &mut HashMap<String, Mark>,
    ) -> Result<(), WorkflowError> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                return Err(WorkflowError::Cycle {
                    protocol: node.to_string(),
                })
            }
            None => {}
        }

        marks.insert(node.to_string(), Mark::Visiting);
        for next in edges.get(node).into_iter().flatten() {
            visit(next, edges, marks)?;
        }
        marks.insert(node.to_string(), Mark::Done);
        Ok(())
    }

    let mut marks = HashMap::new();
    let mut roots: Vec<&&str> = edges.keys().collect();
    roots.sort();

    for root in roots {
        visit(root, edges, &mut marks)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn two_step_workflow() -> WorkflowSchema {
        let mut schema = WorkflowSchema::new("TestSchema", "Density");
        schema.add_protocol(
            ProtocolSchema::new("build", "BuildCoordinatesPackmol")
                .with_input("substance", ProtocolPath::global("substance"))
                .with_outputs(&["coordinate_file_path"]),
        );
        schema.add_protocol(
            ProtocolSchema::new("simulate", "RunOpenMMSimulation")
                .with_input(
                    "input_coordinate_file",
                    ProtocolPath::new("coordinate_file_path", &["build"]),
                )
                .with_input("steps", json!(200))
                .with_outputs(&["trajectory_file_path"]),
        );
        schema.final_value_source = Some(ProtocolPath::new("trajectory_file_path", &["simulate"]));
        schema
    }

    #[test]
    fn test_protocol_path_string_form() {
        let path = ProtocolPath::new("value", &["converge", "extract"]);
        assert_eq!(path.to_string(), "converge/extract.value");
        assert_eq!(path.target_protocol(), "converge/extract");

        let parsed = ProtocolPath::try_from("converge/extract.value".to_string()).unwrap();
        assert_eq!(parsed, path);

        assert!(ProtocolPath::global("substance").is_global());
        assert!(ProtocolPath::try_from("no_property".to_string()).is_err());
        assert!(ProtocolPath::try_from("a//b.value".to_string()).is_err());
    }

    #[test]
    fn test_protocol_value_serialization() {
        let path: ProtocolValue = ProtocolPath::new("system", &["topology"]).into();
        let json = serde_json::to_value(&path).unwrap();
        assert_eq!(json, json!({"@path": "topology.system"}));

        let literal: ProtocolValue = json!({"steps": 5}).into();
        let back: ProtocolValue =
            serde_json::from_value(serde_json::to_value(&literal).unwrap()).unwrap();
        assert_eq!(back, literal);

        let back: ProtocolValue = serde_json::from_value(json).unwrap();
        assert_eq!(back, path);
    }

    #[test]
    fn test_valid_workflow_passes() {
        assert_eq!(two_step_workflow().validate_interfaces(), Ok(()));
    }

    #[test]
    fn test_dangling_reference_is_rejected() {
        let mut schema = two_step_workflow();
        schema.add_protocol(
            ProtocolSchema::new("analyse", "ExtractAverageStatistic")
                .with_input("statistics_path", ProtocolPath::new("statistics", &["missing"]))
                .with_outputs(&["value"]),
        );

        assert!(matches!(
            schema.validate_interfaces(),
            Err(WorkflowError::DanglingReference { protocol, .. }) if protocol == "analyse"
        ));
    }

    #[test]
    fn test_unknown_output_is_rejected() {
        let mut schema = two_step_workflow();
        schema.final_uncertainty_source = Some(ProtocolPath::new("uncertainty", &["simulate"]));

        assert!(matches!(
            schema.validate_interfaces(),
            Err(WorkflowError::UnknownOutput { output, .. }) if output == "uncertainty"
        ));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut schema = WorkflowSchema::new("Cyclic", "Density");
        schema.add_protocol(
            ProtocolSchema::new("a", "AddValues")
                .with_input("values", ProtocolPath::new("result", &["b"]))
                .with_outputs(&["result"]),
        );
        schema.add_protocol(
            ProtocolSchema::new("b", "AddValues")
                .with_input("values", ProtocolPath::new("result", &["a"]))
                .with_outputs(&["result"]),
        );

        assert!(matches!(
            schema.validate_interfaces(),
            Err(WorkflowError::Cycle { .. })
        ));
    }

    #[test]
    fn test_group_reading_its_children_is_not_a_cycle() {
        let mut schema = WorkflowSchema::new("Grouped", "Density");
        let group = ProtocolSchema::new("converge", "ConditionalGroup")
            .with_child(
                ProtocolSchema::new("extract", "ExtractAverageStatistic")
                    .with_outputs(&["value", "uncertainty"]),
            )
            .with_condition(Condition {
                left_hand_value: ProtocolPath::new("uncertainty", &["converge", "extract"]).into(),
                right_hand_value: ProtocolPath::global("target_uncertainty").into(),
                condition_type: ConditionType::LessThan,
            });
        schema.add_protocol(group);
        schema.final_value_source = Some(ProtocolPath::new("value", &["converge", "extract"]));

        assert_eq!(schema.validate_interfaces(), Ok(()));
    }

    #[test]
    fn test_disable_protocol_merging_reaches_children() {
        let mut schema = WorkflowSchema::new("Grouped", "Density");
        schema.add_protocol(
            ProtocolSchema::new("group", "ConditionalGroup")
                .with_child(ProtocolSchema::new("child", "RunOpenMMSimulation")),
        );
        assert!(schema.walk_protocols().iter().all(|(_, p)| p.allows_merging()));

        schema.disable_protocol_merging();

        let steps = schema.walk_protocols();
        assert_eq!(steps.len(), 2);
        assert!(steps.iter().all(|(_, p)| !p.allows_merging()));
    }
}

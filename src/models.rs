//! Data models exchanged with the property estimator server.
//!
//! These structs mirror the server's typed JSON objects. Objects which the
//! server needs to tell apart on the wire carry an `@type` tag.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Phase a property was measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyPhase {
    Solid,
    Liquid,
    Gas,
    /// Forward-compatible fallback for unknown phases
    #[serde(other)]
    Undefined,
}

/// Temperature (K) and pressure (atm) at which a property is defined.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThermodynamicState {
    pub temperature: f64,
    #[serde(default)]
    pub pressure: Option<f64>,
}

impl ThermodynamicState {
    pub fn new(temperature: f64, pressure: Option<f64>) -> Self {
        Self {
            temperature,
            pressure,
        }
    }
}

/// One molecular component of a substance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub smiles: String,
    pub mole_fraction: f64,
}

/// A pure compound or mixture.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Substance {
    pub components: Vec<Component>,
}

impl Substance {
    pub fn pure(smiles: &str) -> Self {
        Self {
            components: vec![Component {
                smiles: smiles.to_string(),
                mole_fraction: 1.0,
            }],
        }
    }

    pub fn with_component(mut self, smiles: &str, mole_fraction: f64) -> Self {
        self.components.push(Component {
            smiles: smiles.to_string(),
            mole_fraction,
        });
        self
    }

    /// Key used to group properties of the same substance in a data set.
    pub fn identifier(&self) -> String {
        let mut parts: Vec<String> = self
            .components
            .iter()
            .map(|c| format!("{}{{{:.6}}}", c.smiles, c.mole_fraction))
            .collect();
        parts.sort();
        parts.join("|")
    }
}

/// Where a property value came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum PropertySource {
    MeasurementSource {
        #[serde(default)]
        doi: Option<String>,
        #[serde(default)]
        reference: Option<String>,
    },
    CalculationSource {
        fidelity: String,
        #[serde(default)]
        provenance: serde_json::Value,
    },
}

/// A measured or estimated physical property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalProperty {
    pub id: String,
    /// Name of the property type, e.g. `Density`.
    #[serde(rename = "@type")]
    pub property_type: String,
    pub phase: PropertyPhase,
    pub thermodynamic_state: ThermodynamicState,
    pub substance: Substance,
    pub value: f64,
    #[serde(default)]
    pub uncertainty: Option<f64>,
    pub unit: String,
    #[serde(default)]
    pub source: Option<PropertySource>,
}

impl PhysicalProperty {
    /// Create a property with a fresh unique id.
    pub fn new(
        property_type: impl Into<String>,
        substance: Substance,
        thermodynamic_state: ThermodynamicState,
        value: f64,
        unit: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            property_type: property_type.into(),
            phase: PropertyPhase::Liquid,
            thermodynamic_state,
            substance,
            value,
            uncertainty: None,
            unit: unit.to_string(),
            source: None,
        }
    }

    pub fn with_uncertainty(mut self, uncertainty: f64) -> Self {
        self.uncertainty = Some(uncertainty);
        self
    }

    pub fn with_phase(mut self, phase: PropertyPhase) -> Self {
        self.phase = phase;
        self
    }

    pub fn with_source(mut self, source: PropertySource) -> Self {
        self.source = Some(source);
        self
    }
}

/// Properties grouped by substance, in insertion order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PropertyDataSet {
    pub properties: IndexMap<String, Vec<PhysicalProperty>>,
}

impl PropertyDataSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_property(&mut self, property: PhysicalProperty) {
        self.properties
            .entry(property.substance.identifier())
            .or_default()
            .push(property);
    }

    pub fn add_properties(&mut self, properties: impl IntoIterator<Item = PhysicalProperty>) {
        for property in properties {
            self.add_property(property);
        }
    }

    pub fn number_of_properties(&self) -> usize {
        self.properties.values().map(Vec::len).sum()
    }

    /// All properties, outer group order first, then insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &PhysicalProperty> {
        self.properties.values().flatten()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Force field parameters the server should estimate properties with.
///
/// The client treats the payload as opaque; `Null` counts as missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForceField(serde_json::Value);

impl ForceField {
    pub fn from_value(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Wrap the contents of an `.offxml` file.
    pub fn from_offxml(contents: impl Into<String>) -> Self {
        Self(serde_json::Value::String(contents.into()))
    }

    pub fn is_empty(&self) -> bool {
        match &self.0 {
            serde_json::Value::Null => true,
            serde_json::Value::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// An error reported by the server, either for a whole request or for a
/// single property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorException {
    #[serde(default)]
    pub directory: Option<String>,
    pub message: String,
}

impl fmt::Display for EstimatorException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.directory {
            Some(dir) => write!(f, "{} ({})", self.message, dir),
            None => f.write_str(&self.message),
        }
    }
}

/// Outcome of a finished estimation request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EstimationResult {
    pub id: String,
    #[serde(default)]
    pub estimated_properties: IndexMap<String, PhysicalProperty>,
    #[serde(default)]
    pub unsuccessful_properties: IndexMap<String, EstimatorException>,
}

/// Non-empty query responses: results or a request-level error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum ServerResponse {
    #[serde(rename = "PropertyEstimatorResult")]
    Result(EstimationResult),
    #[serde(rename = "PropertyEstimatorException")]
    Error(EstimatorException),
}

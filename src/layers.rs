//! Calculation layers the server may use to estimate a property.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A named estimation strategy. The client only orders and configures
/// layers; the server executes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalculationLayer {
    #[serde(rename = "SurrogateLayer")]
    Surrogate,
    #[serde(rename = "ReweightingLayer")]
    Reweighting,
    #[serde(rename = "SimulationLayer")]
    Simulation,
}

impl CalculationLayer {
    /// Attempt order used when the caller does not choose one.
    pub const DEFAULT_ORDER: [CalculationLayer; 3] = [
        CalculationLayer::Surrogate,
        CalculationLayer::Reweighting,
        CalculationLayer::Simulation,
    ];

    /// Name used on the wire and as the key in workflow schema maps.
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationLayer::Surrogate => "SurrogateLayer",
            CalculationLayer::Reweighting => "ReweightingLayer",
            CalculationLayer::Simulation => "SimulationLayer",
        }
    }

    pub fn default_names() -> Vec<String> {
        Self::DEFAULT_ORDER
            .iter()
            .map(|layer| layer.as_str().to_string())
            .collect()
    }
}

impl fmt::Display for CalculationLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CalculationLayer {
    type Err = String;

    /// Accepts the wire name (`SimulationLayer`) or the short form
    /// (`simulation`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        let short = lowered.strip_suffix("layer").unwrap_or(&lowered);
        match short {
            "surrogate" => Ok(CalculationLayer::Surrogate),
            "reweighting" => Ok(CalculationLayer::Reweighting),
            "simulation" => Ok(CalculationLayer::Simulation),
            _ => Err(format!("unknown calculation layer: {}", s)),
        }
    }
}

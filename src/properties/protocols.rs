//! Building blocks shared by the built-in default workflows.

use serde_json::json;

use crate::workflow::{Condition, ConditionType, ProtocolPath, ProtocolSchema, WorkflowSchema};

// Debug-sized run lengths; production settings come from caller schemas.
const EQUILIBRATION_STEPS: u64 = 2;
const EQUILIBRATION_OUTPUT_FREQUENCY: u64 = 2;
const PRODUCTION_STEPS: u64 = 200;
const PRODUCTION_OUTPUT_FREQUENCY: u64 = 20;
const CONVERGENCE_MAX_ITERATIONS: u64 = 1;

/// How the production trajectory of a simulation block is analysed.
#[derive(Debug, Clone, Copy)]
pub enum Analysis {
    /// Average a column of the statistics file, e.g. `Density`.
    Statistic(&'static str),
    /// Estimate the static dielectric constant from dipole fluctuations.
    Dielectric,
}

/// Ids of the interesting steps in a block added by [`add_simulation_block`].
#[derive(Debug, Clone)]
pub struct SimulationBlock {
    pub group_id: String,
    pub production_id: String,
    pub analysis_id: String,
}

impl SimulationBlock {
    pub fn analysis_output(&self, property: &str) -> ProtocolPath {
        ProtocolPath::new(property, &[&self.group_id, &self.analysis_id])
    }

    pub fn production_output(&self, property: &str) -> ProtocolPath {
        ProtocolPath::new(property, &[&self.group_id, &self.production_id])
    }
}

fn prefixed(prefix: &str, id: &str) -> String {
    format!("{}{}", prefix, id)
}

/// Add coordinate building, parameterisation, equilibration and a converged
/// production run of `substance` to `schema`.
///
/// All step ids are prefixed with `prefix` so several blocks can live in one
/// workflow.
pub fn add_simulation_block(
    schema: &mut WorkflowSchema,
    prefix: &str,
    substance: ProtocolPath,
    analysis: Analysis,
) -> SimulationBlock {
    let build_coordinates = prefixed(prefix, "build_coordinates");
    let build_topology = prefixed(prefix, "build_topology");
    let minimisation = prefixed(prefix, "energy_minimisation");
    let equilibration = prefixed(prefix, "npt_equilibration");
    let group = prefixed(prefix, "converge_uncertainty");
    let production = prefixed(prefix, "npt_production");
    let analysis_id = prefixed(prefix, "extract_value");

    schema.add_protocol(
        ProtocolSchema::new(&build_coordinates, "BuildCoordinatesPackmol")
            .with_input("substance", substance.clone())
            .with_outputs(&["coordinate_file_path"]),
    );

    schema.add_protocol(
        ProtocolSchema::new(&build_topology, "BuildSmirnoffTopology")
            .with_input("force_field_path", ProtocolPath::global("force_field_path"))
            .with_input(
                "coordinate_file_path",
                ProtocolPath::new("coordinate_file_path", &[&build_coordinates]),
            )
            .with_input("substance", substance)
            .with_outputs(&["system"]),
    );

    schema.add_protocol(
        ProtocolSchema::new(&minimisation, "RunEnergyMinimisation")
            .with_input(
                "input_coordinate_file",
                ProtocolPath::new("coordinate_file_path", &[&build_coordinates]),
            )
            .with_input("system", ProtocolPath::new("system", &[&build_topology]))
            .with_outputs(&["output_coordinate_file"]),
    );

    schema.add_protocol(
        simulation(&equilibration, EQUILIBRATION_STEPS, EQUILIBRATION_OUTPUT_FREQUENCY)
            .with_input(
                "input_coordinate_file",
                ProtocolPath::new("output_coordinate_file", &[&minimisation]),
            )
            .with_input("system", ProtocolPath::new("system", &[&build_topology])),
    );

    let production_step = simulation(&production, PRODUCTION_STEPS, PRODUCTION_OUTPUT_FREQUENCY)
        .with_input(
            "input_coordinate_file",
            ProtocolPath::new("output_coordinate_file", &[&equilibration]),
        )
        .with_input("system", ProtocolPath::new("system", &[&build_topology]));

    let analysis_step = match analysis {
        Analysis::Statistic(statistic) => {
            ProtocolSchema::new(&analysis_id, "ExtractAverageStatistic")
                .with_input("statistics_type", json!(statistic))
                .with_input(
                    "statistics_path",
                    ProtocolPath::new("statistics_file_path", &[&group, &production]),
                )
        }
        Analysis::Dielectric => ProtocolSchema::new(&analysis_id, "ExtractAverageDielectric")
            .with_input(
                "input_coordinate_file",
                ProtocolPath::new("output_coordinate_file", &[&group, &production]),
            )
            .with_input(
                "trajectory_path",
                ProtocolPath::new("trajectory_file_path", &[&group, &production]),
            )
            .with_input("system", ProtocolPath::new("system", &[&build_topology]))
            .with_input(
                "thermodynamic_state",
                ProtocolPath::global("thermodynamic_state"),
            ),
    }
    .with_outputs(&[
        "value",
        "uncertainty",
        "equilibration_index",
        "statistical_inefficiency",
    ]);

    schema.add_protocol(
        ProtocolSchema::new(&group, "ConditionalGroup")
            .with_input("max_iterations", json!(CONVERGENCE_MAX_ITERATIONS))
            .with_child(production_step)
            .with_child(analysis_step)
            .with_condition(Condition {
                left_hand_value: ProtocolPath::new("uncertainty", &[&group, &analysis_id]).into(),
                right_hand_value: ProtocolPath::global("target_uncertainty").into(),
                condition_type: ConditionType::LessThan,
            }),
    );

    SimulationBlock {
        group_id: group,
        production_id: production,
        analysis_id,
    }
}

/// Subsample the production trajectory of `block` so it only contains
/// uncorrelated frames. Returns the id of the new step.
pub fn add_uncorrelated_trajectory(
    schema: &mut WorkflowSchema,
    prefix: &str,
    block: &SimulationBlock,
) -> String {
    let id = prefixed(prefix, "extract_traj");

    schema.add_protocol(
        ProtocolSchema::new(&id, "ExtractUncorrelatedTrajectoryData")
            .with_input(
                "statistical_inefficiency",
                block.analysis_output("statistical_inefficiency"),
            )
            .with_input("equilibration_index", block.analysis_output("equilibration_index"))
            .with_input(
                "input_coordinate_file",
                block.production_output("output_coordinate_file"),
            )
            .with_input(
                "input_trajectory_path",
                block.production_output("trajectory_file_path"),
            )
            .with_outputs(&["output_trajectory_path"]),
    );

    id
}

fn simulation(id: &str, steps: u64, output_frequency: u64) -> ProtocolSchema {
    ProtocolSchema::new(id, "RunOpenMMSimulation")
        .with_input("ensemble", json!("NPT"))
        .with_input("steps", json!(steps))
        .with_input("output_frequency", json!(output_frequency))
        .with_input(
            "thermodynamic_state",
            ProtocolPath::global("thermodynamic_state"),
        )
        .with_outputs(&[
            "output_coordinate_file",
            "trajectory_file_path",
            "statistics_file_path",
        ])
}

/// `result = value * multiplier`
pub fn multiply_value(id: &str, value: ProtocolPath, multiplier: ProtocolPath) -> ProtocolSchema {
    ProtocolSchema::new(id, "MultiplyValue")
        .with_input("value", value)
        .with_input("multiplier", multiplier)
        .with_outputs(&["result"])
}

/// `result = value_b - value_a`
pub fn subtract_values(id: &str, value_a: ProtocolPath, value_b: ProtocolPath) -> ProtocolSchema {
    ProtocolSchema::new(id, "SubtractValues")
        .with_input("value_a", value_a)
        .with_input("value_b", value_b)
        .with_outputs(&["result"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_ids() {
        assert_eq!(prefixed("", "extract_traj"), "extract_traj");
        assert_eq!(prefixed("mixture_", "extract_traj"), "mixture_extract_traj");
    }

    #[test]
    fn test_block_ids_carry_prefix() {
        let mut schema = WorkflowSchema::new("Test", "Density");
        let block = add_simulation_block(
            &mut schema,
            "component_0_",
            ProtocolPath::global("substance"),
            Analysis::Statistic("Density"),
        );

        assert_eq!(block.group_id, "component_0_converge_uncertainty");
        assert_eq!(
            block.analysis_output("value").to_string(),
            "component_0_converge_uncertainty/component_0_extract_value.value"
        );
        assert!(schema.protocols.contains_key("component_0_build_coordinates"));
        assert_eq!(schema.validate_interfaces(), Ok(()));
    }
}

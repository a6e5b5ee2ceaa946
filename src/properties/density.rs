//! Default workflows for mass density.

use serde_json::json;

use super::protocols::{add_simulation_block, add_uncorrelated_trajectory, Analysis};
use crate::workflow::{ProtocolPath, ProtocolSchema, WorkflowSchema};

const PROPERTY_TYPE: &str = "Density";

/// Run a converged NPT simulation and average the instantaneous density.
pub fn simulation_schema() -> WorkflowSchema {
    let mut schema = WorkflowSchema::new("DensitySchema", PROPERTY_TYPE);

    let block = add_simulation_block(
        &mut schema,
        "",
        ProtocolPath::global("substance"),
        Analysis::Statistic("Density"),
    );
    let extract_traj = add_uncorrelated_trajectory(&mut schema, "", &block);

    schema.final_value_source = Some(block.analysis_output("value"));
    schema.final_uncertainty_source = Some(block.analysis_output("uncertainty"));
    schema.final_coordinate_source = Some(block.production_output("output_coordinate_file"));
    schema.final_trajectory_source = Some(ProtocolPath::new(
        "output_trajectory_path",
        &[&extract_traj],
    ));

    schema
}

/// Reweight stored simulation data generated with a different parameter set
/// to the target force field using MBAR.
pub fn reweighting_schema() -> WorkflowSchema {
    let mut schema = WorkflowSchema::new("DensityReweightingSchema", PROPERTY_TYPE);

    schema.add_protocol(
        ProtocolSchema::new("unpack_data", "UnpackStoredSimulationData")
            .with_input("simulation_data_path", ProtocolPath::global("full_system_data"))
            .with_outputs(&[
                "coordinate_file_path",
                "trajectory_file_path",
                "statistics_file_path",
                "force_field_path",
            ]),
    );

    let topology = |id: &str, force_field: ProtocolPath| {
        ProtocolSchema::new(id, "BuildSmirnoffTopology")
            .with_input("force_field_path", force_field)
            .with_input(
                "coordinate_file_path",
                ProtocolPath::new("coordinate_file_path", &["unpack_data"]),
            )
            .with_input("substance", ProtocolPath::global("substance"))
            .with_outputs(&["system"])
    };
    schema.add_protocol(topology(
        "build_reference_system",
        ProtocolPath::new("force_field_path", &["unpack_data"]),
    ));
    schema.add_protocol(topology(
        "build_target_system",
        ProtocolPath::global("force_field_path"),
    ));

    let reduced_potential = |id: &str, system: &str| {
        ProtocolSchema::new(id, "CalculateReducedPotentialOpenMM")
            .with_input("system", ProtocolPath::new("system", &[system]))
            .with_input(
                "thermodynamic_state",
                ProtocolPath::global("thermodynamic_state"),
            )
            .with_input(
                "coordinate_file_path",
                ProtocolPath::new("coordinate_file_path", &["unpack_data"]),
            )
            .with_input(
                "trajectory_file_path",
                ProtocolPath::new("trajectory_file_path", &["unpack_data"]),
            )
            .with_outputs(&["reduced_potentials"])
    };
    schema.add_protocol(reduced_potential(
        "reduced_reference_potential",
        "build_reference_system",
    ));
    schema.add_protocol(reduced_potential(
        "reduced_target_potential",
        "build_target_system",
    ));

    schema.add_protocol(
        ProtocolSchema::new("extract_densities", "ExtractUncorrelatedStatisticsData")
            .with_input("statistics_type", json!("Density"))
            .with_input(
                "input_statistics_path",
                ProtocolPath::new("statistics_file_path", &["unpack_data"]),
            )
            .with_outputs(&["uncorrelated_values"]),
    );

    schema.add_protocol(
        ProtocolSchema::new("mbar", "ReweightWithMBARProtocol")
            .with_input(
                "reference_reduced_potentials",
                ProtocolPath::new("reduced_potentials", &["reduced_reference_potential"]),
            )
            .with_input(
                "target_reduced_potentials",
                ProtocolPath::new("reduced_potentials", &["reduced_target_potential"]),
            )
            .with_input(
                "reference_observables",
                ProtocolPath::new("uncorrelated_values", &["extract_densities"]),
            )
            .with_input("required_effective_samples", json!(50))
            .with_outputs(&["value", "uncertainty"]),
    );

    schema.final_value_source = Some(ProtocolPath::new("value", &["mbar"]));
    schema.final_uncertainty_source = Some(ProtocolPath::new("uncertainty", &["mbar"]));

    schema
}

//! Default workflow for the static dielectric constant.

use super::protocols::{add_simulation_block, add_uncorrelated_trajectory, Analysis};
use crate::workflow::{ProtocolPath, WorkflowSchema};

pub fn simulation_schema() -> WorkflowSchema {
    let mut schema = WorkflowSchema::new("DielectricConstantSchema", "DielectricConstant");

    let block = add_simulation_block(
        &mut schema,
        "",
        ProtocolPath::global("substance"),
        Analysis::Dielectric,
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

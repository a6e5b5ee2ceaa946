//! Default workflows for excess mixing properties of binary mixtures.
//!
//! Both enthalpy of mixing and excess molar volume are estimated as
//!
//! ```text
//! excess = mixture - x_0 * pure_0 - x_1 * pure_1
//! ```
//!
//! where each term comes from its own converged simulation.

use serde_json::json;

use super::protocols::{
    add_simulation_block, multiply_value, subtract_values, Analysis, SimulationBlock,
};
use crate::workflow::{ProtocolPath, ProtocolSchema, WorkflowSchema};

const COMPONENT_COUNT: usize = 2;

pub fn enthalpy_of_mixing_schema() -> WorkflowSchema {
    excess_property_schema("EnthalpyOfMixing", "Enthalpy")
}

pub fn excess_molar_volume_schema() -> WorkflowSchema {
    excess_property_schema("ExcessMolarVolume", "Volume")
}

fn excess_property_schema(property_type: &str, statistic: &'static str) -> WorkflowSchema {
    let mut schema = WorkflowSchema::new(&format!("{}Schema", property_type), property_type);

    let mixture = add_simulation_block(
        &mut schema,
        "mixture_",
        ProtocolPath::global("substance"),
        Analysis::Statistic(statistic),
    );

    let mut running_total = mixture.analysis_output("value");

    for index in 0..COMPONENT_COUNT {
        let prefix = format!("component_{}_", index);
        let extract_id = format!("extract_component_{}", index);

        schema.add_protocol(
            ProtocolSchema::new(&extract_id, "ExtractSubstanceComponent")
                .with_input("substance", ProtocolPath::global("substance"))
                .with_input("component_index", json!(index))
                .with_outputs(&["substance", "mole_fraction"]),
        );

        let component: SimulationBlock = add_simulation_block(
            &mut schema,
            &prefix,
            ProtocolPath::new("substance", &[&extract_id]),
            Analysis::Statistic(statistic),
        );

        let weighted_id = format!("weight_component_{}", index);
        schema.add_protocol(multiply_value(
            &weighted_id,
            component.analysis_output("value"),
            ProtocolPath::new("mole_fraction", &[&extract_id]),
        ));

        let subtract_id = format!("subtract_component_{}", index);
        schema.add_protocol(subtract_values(
            &subtract_id,
            ProtocolPath::new("result", &[&weighted_id]),
            running_total,
        ));

        running_total = ProtocolPath::new("result", &[&subtract_id]);
    }

    schema.final_value_source = Some(running_total);
    schema.final_coordinate_source = Some(mixture.production_output("output_coordinate_file"));

    schema
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schemas_are_valid() {
        assert_eq!(enthalpy_of_mixing_schema().validate_interfaces(), Ok(()));
        assert_eq!(excess_molar_volume_schema().validate_interfaces(), Ok(()));
    }

    #[test]
    fn test_final_value_is_last_subtraction() {
        let schema = excess_molar_volume_schema();
        assert_eq!(
            schema.final_value_source.unwrap().to_string(),
            "subtract_component_1.result"
        );
        assert!(schema.protocols.contains_key("mixture_converge_uncertainty"));
        assert!(schema.protocols.contains_key("component_0_build_coordinates"));
        assert!(schema.protocols.contains_key("component_1_build_coordinates"));
    }
}

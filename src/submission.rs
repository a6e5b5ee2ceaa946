//! The payload sent with a `Submission` frame.

use serde::{Deserialize, Serialize};

use crate::client::ClientError;
use crate::models::{ForceField, PhysicalProperty, PropertyDataSet};
use crate::options::{EstimationOptions, OptionsAssembler};

/// Properties, force field and fully assembled options for one request.
///
/// Built once per estimation request and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    properties: Vec<PhysicalProperty>,
    force_field: ForceField,
    options: EstimationOptions,
}

impl Submission {
    /// Flatten `data_set` and fill in any missing default workflows.
    ///
    /// Properties keep the data set's iteration order: substance groups in
    /// insertion order, then properties within each group.
    ///
    /// # Errors
    ///
    /// Fails before any I/O if the force field is missing, the options are
    /// invalid, or a property type has no registered definition.
    pub fn build(
        data_set: &PropertyDataSet,
        force_field: ForceField,
        mut options: EstimationOptions,
        assembler: &OptionsAssembler<'_>,
    ) -> Result<Self, ClientError> {
        if force_field.is_empty() {
            return Err(ClientError::MissingForceField);
        }
        options.validate()?;

        let properties: Vec<PhysicalProperty> = data_set.iter().cloned().collect();
        assembler.assemble(&properties, &mut options)?;

        Ok(Self {
            properties,
            force_field,
            options,
        })
    }

    pub fn properties(&self) -> &[PhysicalProperty] {
        &self.properties
    }

    pub fn force_field(&self) -> &ForceField {
        &self.force_field
    }

    pub fn options(&self) -> &EstimationOptions {
        &self.options
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, ClientError> {
        serde_json::to_vec(self).map_err(ClientError::Serialization)
    }
}

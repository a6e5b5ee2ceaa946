//! Property Estimator Client Library
//!
//! Submit batches of physical property estimation requests to a running
//! property estimator server and collect the results:
//!
//! - `client` - Client facade, request handles and retrieval modes
//! - `ipc` - Length-prefixed TCP framing and the one-connection-per-request policy
//! - `options` - Estimation options and default workflow assembly
//! - `properties` - Supported property kinds and their default workflows
//! - `models` - Data models exchanged with the server
//!
//! # Example
//!
//! ```ignore
//! use propertyestimator_client::{ConnectionOptions, ForceField, PropertyEstimatorClient};
//!
//! let client = PropertyEstimatorClient::new(ConnectionOptions::default())?;
//! let handle = client
//!     .request_estimate(&data_set, ForceField::from_offxml(offxml), None)
//!     .await?
//!     .ok_or_else(|| anyhow::anyhow!("server unreachable"))?;
//!
//! let response = handle.results(true, 5.0).await?;
//! ```

pub mod client;
pub mod config;
pub mod ipc;
pub mod layers;
pub mod models;
pub mod options;
pub mod properties;
pub mod submission;
pub mod workflow;

pub use client::{ClientError, EstimateResponse, PropertyEstimatorClient, RequestHandle};
pub use config::{ClientConfig, ConnectionOptions};
pub use layers::CalculationLayer;
pub use models::{
    EstimationResult, EstimatorException, ForceField, PhysicalProperty, PropertyDataSet,
    Substance, ThermodynamicState,
};
pub use options::{EstimationOptions, OptionsAssembler};
pub use properties::{BuiltinRegistry, PropertyKind, PropertyRegistry};
pub use submission::Submission;

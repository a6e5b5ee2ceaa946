//! Client facade for submitting estimation requests and retrieving results.
//!
//! # Request lifecycle
//!
//! ```text
//! request_estimate ──► RequestHandle ──► query ──┬─► Pending ──► (sleep, query again)
//!                                                └─► Completed / Failed
//! ```
//!
//! A transport failure while querying is indistinguishable from a pending
//! request. A transport failure while submitting yields no handle at all.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ConnectionOptions;
use crate::ipc::{
    exchange, perform, report_failure, IpcError, MessageType, ProtocolError, MAX_MESSAGE_SIZE,
};
use crate::models::{
    EstimationResult, EstimatorException, ForceField, PropertyDataSet, ServerResponse,
};
use crate::options::{EstimationOptions, OptionsAssembler};
use crate::properties::{BuiltinRegistry, PropertyRegistry};
use crate::submission::Submission;
use crate::workflow::WorkflowError;

/// Errors surfaced to callers of the client.
///
/// Everything except [`ClientError::Decode`] and an oversized reply
/// ([`ClientError::Protocol`]) is raised before any network I/O takes place.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("The address of the server which will run these calculations must be given")]
    MissingServerAddress,

    #[error("Both a data set and a force field must be present to compute physical properties")]
    MissingForceField,

    #[error("The property estimator does not support {0} properties")]
    UnsupportedProperty(String),

    #[error("Polling interval must be a non-negative number of seconds, got {0}")]
    InvalidPollingInterval(f64),

    #[error("Relative uncertainty tolerance must be a positive number, got {0}")]
    InvalidTolerance(f64),

    #[error("The default {layer} workflow for {property_type} is invalid: {source}")]
    InvalidWorkflow {
        property_type: String,
        layer: String,
        #[source]
        source: WorkflowError,
    },

    #[error("Failed to serialize submission: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("Failed to decode server response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Outcome of a single query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EstimateResponse {
    /// No answer yet, or the server could not be reached.
    Pending,
    Completed(EstimationResult),
    /// The server rejected the request as a whole.
    Failed(EstimatorException),
}

impl EstimateResponse {
    pub fn is_pending(&self) -> bool {
        matches!(self, EstimateResponse::Pending)
    }

    pub fn into_result(self) -> Option<EstimationResult> {
        match self {
            EstimateResponse::Completed(result) => Some(result),
            _ => None,
        }
    }
}

impl From<ServerResponse> for EstimateResponse {
    fn from(response: ServerResponse) -> Self {
        match response {
            ServerResponse::Result(result) => EstimateResponse::Completed(result),
            ServerResponse::Error(error) => EstimateResponse::Failed(error),
        }
    }
}

type SharedRegistry = Arc<dyn PropertyRegistry + Send + Sync>;

struct ClientInner {
    connection: ConnectionOptions,
    registry: SharedRegistry,
}

/// Talks to a single property estimator server.
///
/// Cloning is cheap; clones share the same connection settings and registry.
/// Each submit or query opens its own TCP connection.
#[derive(Clone)]
pub struct PropertyEstimatorClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for PropertyEstimatorClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyEstimatorClient")
            .field("connection", &self.inner.connection)
            .finish_non_exhaustive()
    }
}

impl PropertyEstimatorClient {
    /// Create a client using the built-in property definitions.
    pub fn new(connection: ConnectionOptions) -> Result<Self, ClientError> {
        Self::with_registry(connection, Arc::new(BuiltinRegistry::default()))
    }

    /// Create a client resolving default workflows through `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::MissingServerAddress`] if the address is empty.
    pub fn with_registry(
        connection: ConnectionOptions,
        registry: SharedRegistry,
    ) -> Result<Self, ClientError> {
        connection.validate()?;
        Ok(Self {
            inner: Arc::new(ClientInner {
                connection,
                registry,
            }),
        })
    }

    pub fn connection(&self) -> &ConnectionOptions {
        &self.inner.connection
    }

    pub fn server_address(&self) -> &str {
        &self.inner.connection.server_address
    }

    pub fn server_port(&self) -> u16 {
        self.inner.connection.server_port
    }

    /// Build the submission without sending it.
    ///
    /// `None` options means [`EstimationOptions::default`].
    pub fn build_submission(
        &self,
        data_set: &PropertyDataSet,
        force_field: ForceField,
        options: Option<EstimationOptions>,
    ) -> Result<Submission, ClientError> {
        let assembler = OptionsAssembler::new(self.inner.registry.as_ref());
        Submission::build(
            data_set,
            force_field,
            options.unwrap_or_default(),
            &assembler,
        )
    }

    /// Request that the server estimates every property in `data_set`.
    ///
    /// Returns `Ok(None)` if the server could not be reached or did not hand
    /// back a request id. No handle exists in that case.
    pub async fn request_estimate(
        &self,
        data_set: &PropertyDataSet,
        force_field: ForceField,
        options: Option<EstimationOptions>,
    ) -> Result<Option<RequestHandle>, ClientError> {
        let submission = self.build_submission(data_set, force_field, options)?;
        self.submit(&submission).await
    }

    /// Send an already built submission.
    pub async fn submit(&self, submission: &Submission) -> Result<Option<RequestHandle>, ClientError> {
        let payload = submission.to_payload()?;
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::TooLarge(payload.len()).into());
        }

        info!(
            "Submitting {} properties to {}:{}",
            submission.properties().len(),
            self.server_address(),
            self.server_port()
        );

        let Some(response) = perform(
            self.server_address(),
            self.server_port(),
            MessageType::Submission,
            &payload,
        )
        .await
        else {
            warn!("The server did not return a request id");
            return Ok(None);
        };

        let request_id: String = serde_json::from_slice(&response).map_err(ClientError::Decode)?;
        info!("Received estimation request id: {}", request_id);

        Ok(Some(RequestHandle::new(request_id, self)))
    }

    /// Issue exactly one query for `request_id`.
    ///
    /// Transport failures read as [`EstimateResponse::Pending`]. A reply
    /// declaring more than [`MAX_MESSAGE_SIZE`] bytes is an error instead.
    pub async fn query(&self, request_id: &str) -> Result<EstimateResponse, ClientError> {
        let (address, port) = (self.server_address(), self.server_port());
        let response =
            match exchange(address, port, MessageType::Query, request_id.as_bytes()).await {
                Ok(response) => response,
                Err(IpcError::Protocol(ProtocolError::TooLarge(size))) => {
                    return Err(ProtocolError::TooLarge(size).into());
                }
                Err(e) => {
                    report_failure(address, port, &e);
                    None
                }
            };

        match response {
            None => Ok(EstimateResponse::Pending),
            Some(bytes) => {
                let decoded: ServerResponse =
                    serde_json::from_slice(&bytes).map_err(ClientError::Decode)?;
                Ok(decoded.into())
            }
        }
    }

    /// Query until the server returns something other than "pending".
    ///
    /// Sleeps `polling_interval` seconds before every query, skipping the
    /// sleep when the interval is zero. There is no overall deadline.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidPollingInterval`] before any I/O if the
    /// interval is negative, not finite, or too long to sleep for.
    pub async fn wait_for_estimate(
        &self,
        request_id: &str,
        polling_interval: f64,
    ) -> Result<EstimateResponse, ClientError> {
        let interval = polling_duration(polling_interval)?;
        let mut attempts: u64 = 0;

        loop {
            if !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }

            attempts += 1;
            let response = self.query(request_id).await?;
            if !response.is_pending() {
                info!(
                    "Request {} resolved after {} queries",
                    request_id, attempts
                );
                return Ok(response);
            }

            debug!("Request {} still pending (attempt {})", request_id, attempts);
        }
    }

    /// Retrieve results either with one query or by waiting for them.
    pub async fn retrieve_estimate(
        &self,
        request_id: &str,
        synchronous: bool,
        polling_interval: f64,
    ) -> Result<EstimateResponse, ClientError> {
        if synchronous {
            self.wait_for_estimate(request_id, polling_interval).await
        } else {
            self.query(request_id).await
        }
    }
}

fn polling_duration(polling_interval: f64) -> Result<Duration, ClientError> {
    if !polling_interval.is_finite() || polling_interval < 0.0 {
        return Err(ClientError::InvalidPollingInterval(polling_interval));
    }
    Duration::try_from_secs_f64(polling_interval)
        .map_err(|_| ClientError::InvalidPollingInterval(polling_interval))
}

/// Reference to an estimation request running on a server.
///
/// Serializes to `{"id", "server_address", "server_port"}` so it can be
/// stored and used to collect results later, possibly from another process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestHandle {
    id: String,
    server_address: String,
    server_port: u16,
    #[serde(skip)]
    client: Weak<ClientInner>,
}

impl RequestHandle {
    fn new(id: String, client: &PropertyEstimatorClient) -> Self {
        Self {
            id,
            server_address: client.server_address().to_string(),
            server_port: client.server_port(),
            client: Arc::downgrade(&client.inner),
        }
    }

    /// A handle not tied to any live client.
    pub fn detached(id: &str, connection: &ConnectionOptions) -> Self {
        Self {
            id: id.to_string(),
            server_address: connection.server_address.clone(),
            server_port: connection.server_port,
            client: Weak::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn server_address(&self) -> &str {
        &self.server_address
    }

    pub fn server_port(&self) -> u16 {
        self.server_port
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// The client that created this handle, or a new one pointed at the
    /// handle's server if that client is gone.
    pub fn client(&self) -> Result<PropertyEstimatorClient, ClientError> {
        if let Some(inner) = self.client.upgrade() {
            return Ok(PropertyEstimatorClient { inner });
        }

        debug!(
            "No live client for request {}, connecting to {}:{} directly",
            self.id, self.server_address, self.server_port
        );
        PropertyEstimatorClient::new(ConnectionOptions::new(
            &self.server_address,
            self.server_port,
        )?)
    }

    /// Retrieve the results of this request.
    ///
    /// With `synchronous` set, polls every `polling_interval` seconds until
    /// the server answers. Otherwise performs a single query.
    pub async fn results(
        &self,
        synchronous: bool,
        polling_interval: f64,
    ) -> Result<EstimateResponse, ClientError> {
        if synchronous {
            polling_duration(polling_interval)?;
        }
        self.client()?
            .retrieve_estimate(&self.id, synchronous, polling_interval)
            .await
    }
}

impl PartialEq for RequestHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.server_address == other.server_address
            && self.server_port == other.server_port
    }
}

impl Eq for RequestHandle {}

impl fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EstimateRequest id: {} server_address: {} server_port: {}",
            self.id, self.server_address, self.server_port
        )
    }
}

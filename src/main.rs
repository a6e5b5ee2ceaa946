//! propest - command line front end for a property estimator server.
//!
//! Submits a data set for estimation and writes out a request handle, or
//! queries a previously written handle for results.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use propertyestimator_client::{
    ClientConfig, EstimationOptions, ForceField, PropertyDataSet, PropertyEstimatorClient,
    RequestHandle,
};

#[derive(Parser, Debug)]
#[command(name = "propest", version, about = "Property estimator client")]
struct Cli {
    /// Client config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    server_address: Option<String>,

    #[arg(long, global = true)]
    server_port: Option<u16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a data set for estimation
    Submit(SubmitArgs),
    /// Retrieve the results of a submitted request
    Query(QueryArgs),
}

#[derive(Args, Debug)]
struct SubmitArgs {
    /// Data set JSON file
    #[arg(long)]
    data_set: PathBuf,

    /// Force field file (.offxml or JSON)
    #[arg(long)]
    force_field: PathBuf,

    /// Allowed calculation layer, in priority order. Repeatable.
    #[arg(long = "layer")]
    layers: Vec<String>,

    /// Relative uncertainty tolerance
    #[arg(long)]
    tolerance: Option<f64>,

    /// Prevent the server from merging identical workflow steps
    #[arg(long)]
    no_merging: bool,

    /// Write the request handle here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// Request handle JSON written by `submit`
    #[arg(long)]
    request: PathBuf,

    /// Poll until the server returns a result
    #[arg(long)]
    wait: bool,

    /// Seconds between polls, overriding the configured interval
    #[arg(long, allow_negative_numbers = true)]
    interval: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "propertyestimator_client=info,propest=info".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(address) = cli.server_address {
        config.connection.server_address = address;
    }
    if let Some(port) = cli.server_port {
        config.connection.server_port = port;
    }

    match cli.command {
        Command::Submit(args) => submit(&config, args).await,
        Command::Query(args) => query(&config, args).await,
    }
}

async fn submit(config: &ClientConfig, args: SubmitArgs) -> Result<()> {
    let contents = std::fs::read_to_string(&args.data_set)
        .with_context(|| format!("Failed to read data set {}", args.data_set.display()))?;
    let data_set = PropertyDataSet::from_json(&contents)
        .with_context(|| format!("Failed to parse data set {}", args.data_set.display()))?;
    let force_field = load_force_field(&args.force_field)?;

    let mut options = EstimationOptions::default().with_protocol_merging(!args.no_merging);
    if !args.layers.is_empty() {
        options = options.with_layer_names(args.layers);
    }
    if let Some(tolerance) = args.tolerance {
        options = options.with_relative_uncertainty_tolerance(tolerance);
    }

    let client = PropertyEstimatorClient::new(config.connection.clone())?;
    info!(
        "Requesting estimates for {} properties",
        data_set.number_of_properties()
    );

    let handle = client
        .request_estimate(&data_set, force_field, Some(options))
        .await?
        .with_context(|| {
            format!(
                "No request id received from {}:{}",
                client.server_address(),
                client.server_port()
            )
        })?;

    let json = handle.to_json()?;
    match args.output {
        Some(path) => {
            std::fs::write(&path, &json)
                .with_context(|| format!("Failed to write request handle {}", path.display()))?;
            info!("{} written to {}", handle, path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}

async fn query(config: &ClientConfig, args: QueryArgs) -> Result<()> {
    let contents = std::fs::read_to_string(&args.request)
        .with_context(|| format!("Failed to read request handle {}", args.request.display()))?;
    let handle = RequestHandle::from_json(&contents)
        .with_context(|| format!("Failed to parse request handle {}", args.request.display()))?;

    let interval = args.interval.unwrap_or(config.polling_interval);
    info!("Retrieving results for {}", handle);

    let response = handle.results(args.wait, interval).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}

/// Read a force field, accepting either JSON or raw `.offxml` contents.
fn load_force_field(path: &Path) -> Result<ForceField> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read force field {}", path.display()))?;

    let force_field = match serde_json::from_str::<serde_json::Value>(&contents) {
        Ok(value) => ForceField::from_value(value),
        Err(_) => ForceField::from_offxml(contents),
    };
    Ok(force_field)
}

//! SOAP/WSDL command line tool.
//!
//! Run with: `soap-wsdl describe --wsdl service.wsdl`

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use soap_wsdl::{
    Client, InterfaceModel, OutboundRequest, SoapConfig, SoapError, Transport, TransportResponse,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Inspect WSDL documents and build SOAP request envelopes.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "soap.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every service, port and operation with its message shapes
    Describe {
        /// WSDL file
        #[arg(short, long)]
        wsdl: PathBuf,
    },
    /// Print the request envelope and headers for an operation call
    Envelope {
        /// WSDL file
        #[arg(short, long)]
        wsdl: PathBuf,

        /// Operation name
        #[arg(short, long)]
        operation: String,

        /// Arguments as JSON
        #[arg(short, long, default_value = "{}")]
        args: String,

        /// Endpoint URL (selects the port when several bindings exist)
        #[arg(short, long)]
        endpoint: Option<String>,
    },
}

/// Transport for commands that only build requests.
struct Unconnected;

#[async_trait]
impl Transport for Unconnected {
    async fn send(&self, request: OutboundRequest) -> soap_wsdl::Result<TransportResponse> {
        Err(SoapError::Transport(format!(
            "no transport configured for {}",
            request.url
        )))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = args.log_level.parse().unwrap_or(Level::WARN);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    // Load configuration
    let config = if args.config.exists() {
        let content = tokio::fs::read_to_string(&args.config)
            .await
            .context("Failed to read config file")?;
        SoapConfig::from_yaml(&content).context("Failed to parse config file")?
    } else {
        info!(path = %args.config.display(), "Config file not found, using defaults");
        SoapConfig::default()
    };

    match args.command {
        Command::Describe { wsdl } => {
            let model = load_model(&wsdl, &config)?;
            let description = serde_json::to_string_pretty(&model.describe_services())
                .context("Failed to render description")?;
            println!("{}", description);
        }
        Command::Envelope {
            wsdl,
            operation,
            args: call_args,
            endpoint,
        } => {
            let model = load_model(&wsdl, &config)?;
            let call_args: serde_json::Value =
                serde_json::from_str(&call_args).context("Arguments are not valid JSON")?;

            let mut client = Client::new(Arc::new(model), config, Arc::new(Unconnected));
            if let Some(endpoint) = endpoint {
                client = client.with_endpoint(endpoint);
            }
            let request = client
                .build_request(&operation, &call_args)
                .with_context(|| format!("Failed to build request for '{}'", operation))?;

            println!("POST {}", request.url);
            let mut headers: Vec<_> = request.headers.iter().collect();
            headers.sort();
            for (name, value) in headers {
                println!("{}: {}", name, value);
            }
            println!();
            println!("{}", request.body);
        }
    }

    Ok(())
}

fn load_model(path: &Path, config: &SoapConfig) -> Result<InterfaceModel> {
    let model = InterfaceModel::open(path, &config.wsdl)
        .with_context(|| format!("Failed to load WSDL {}", path.display()))?;
    info!(
        location = %model.location(),
        services = model.services().len(),
        "Interface model loaded"
    );
    Ok(model)
}

//! Zentinel SOAP client binary.
//!
//! Run with: `zentinel-soap-call --config client.yaml --action ns:GetFoo --param Id=42`

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;
use zentinel_soap_client::transport::TransportOptions;
use zentinel_soap_client::{
    ClientConfig, NamespaceHooks, SoapAction, SoapError, SoapService, UreqTransport,
};

/// Call a SOAP service from the command line.
///
/// The endpoint, namespaces and method table come from the configuration
/// file; the action and its parameters from the command line.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "client.yaml")]
    config: PathBuf,

    /// Qualified name of the action element (e.g. "ns:GetFoo")
    #[arg(short, long, conflicts_with = "method")]
    action: Option<String>,

    /// Method name resolved through the configured method table
    #[arg(short, long)]
    method: Option<String>,

    /// Child element of the action, as Name=Value (repeatable)
    #[arg(short, long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// SOAPAction header: "auto", "none" or a literal value (overrides config)
    #[arg(long)]
    soap_action: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn parse_param(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected Name=Value, got '{}'", raw))
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
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

    info!("Starting Zentinel SOAP client v{}", env!("CARGO_PKG_VERSION"));
    info!("Config file: {}", args.config.display());

    // Load configuration
    let content = std::fs::read_to_string(&args.config).context("Failed to read config file")?;
    let config = ClientConfig::from_yaml(&content).context("Failed to parse config file")?;
    let endpoint = config
        .endpoint_config()
        .context("Invalid endpoint configuration")?;

    info!(
        uri = %endpoint.uri(),
        version = endpoint.version().number(),
        methods = config.methods.len(),
        "Configuration loaded"
    );

    let service = SoapService::new(endpoint, UreqTransport::new())
        .with_hooks(NamespaceHooks::new(config.namespaces.clone()))
        .with_transport_options(TransportOptions::from(&config.transport))
        .with_methods(config.methods.clone());

    let soap_action: SoapAction = args
        .soap_action
        .as_deref()
        .unwrap_or(&config.soap_action)
        .parse()
        .unwrap_or_default();

    let action = match (&args.action, &args.method) {
        (Some(action), _) => action.clone(),
        (None, Some(method)) => service
            .methods()
            .get(method)
            .map(String::from)
            .with_context(|| format!("Method '{}' is not in the method table", method))?,
        (None, None) => bail!("Either --action or --method is required"),
    };

    let params = args.params;
    let result = service.invoke_with(Some(&action), &soap_action, |element| {
        for (name, value) in &params {
            element.add_value(name, value.as_str());
        }
    });

    match result {
        Ok(Some(response)) => {
            info!(status = response.status(), "Call succeeded");
            match response.document() {
                Some(document) => println!("{}", document.to_pretty_text()?),
                None => println!("{}", response.body_text()),
            }
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(SoapError::Fault(fault)) => {
            error!(code = %fault.code(), reason = %fault.reason(), "SOAP fault");
            bail!("{}", fault)
        }
        Err(e) => {
            error!(code = %e.kind().as_str(), "Call failed: {}", e);
            Err(e).context(format!("Calling '{}' failed", action))
        }
    }
}

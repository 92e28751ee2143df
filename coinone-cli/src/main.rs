//! Coinone Command Line Interface
//!
//! Calls one API endpoint and prints the result.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coinone_client::{ApiClient, ClientConfig, Params};
use secrecy::ExposeSecret;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "coinone", about = "Coinone REST API client", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (credentials come from the environment otherwise)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Call an API endpoint
    Call {
        /// Endpoint path
        #[arg(default_value = "/v2/account/balance")]
        path: String,
        /// Query parameter for a public call (key=value); none makes a signed call
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
        /// Decode the result as JSON and pretty-print it
        #[arg(long)]
        json: bool,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create example configuration
    Init {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate configuration
    Validate,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected key=value, got {raw}"))
}

fn load_config(path: Option<&PathBuf>) -> Result<ClientConfig> {
    match path {
        Some(path) => ClientConfig::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => ClientConfig::from_env().context("Failed to read configuration from the environment"),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "coinone={log_level},coinone_client={log_level},coinone_http={log_level}"
        ))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Call { path, params, json } => {
            let config = load_config(cli.config.as_ref())?;
            debug!("Loaded configuration: {:?}", config);
            let client = ApiClient::new(config)?;

            let params: Params = params.into_iter().collect();
            let params = (!params.is_empty()).then_some(&params);

            let result = if json {
                let value: serde_json::Value = client.call_json(&path, params)?;
                serde_json::to_string_pretty(&value)?
            } else {
                client.call(&path, params)?
            };
            println!("Result : {result}");
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let config = load_config(cli.config.as_ref())?;
                println!("API URL: {}", config.api_url);
                println!("Access key set: {}", !config.access_key.expose_secret().is_empty());
                println!("Secret key set: {}", !config.secret_key.expose_secret().is_empty());
                println!("Read timeout: {} ms", config.read_timeout_ms);
                match &config.proxy {
                    Some(proxy) => println!("Proxy: {proxy}"),
                    None => println!("Proxy: none"),
                }
                println!("Ignore close errors: {}", config.ignore_close_errors);
            }
            ConfigAction::Init { output } => {
                let path = output.unwrap_or_else(ClientConfig::default_config_path);
                ClientConfig::default()
                    .save_to_file(&path)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Wrote example configuration to {}", path.display());
                println!("Configuration written to {}", path.display());
            }
            ConfigAction::Validate => {
                let config = load_config(cli.config.as_ref())?;
                config.validate()?;
                if !config.has_credentials() {
                    anyhow::bail!("Configuration has no API credentials");
                }
                println!("Configuration is valid");
            }
        },
    }

    Ok(())
}

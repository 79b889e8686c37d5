//! # rmirpc CLI Entry Point
//!
//! Main binary for the rmirpc remote invocation system.
//!
//! ## Usage
//!
//! ```bash
//! # Start a registry server with the demo services
//! rmirpc serve -b 127.0.0.1:1099
//!
//! # Resolve a name
//! rmirpc lookup 127.0.0.1:1099 PriceCalculator
//!
//! # List bound names
//! rmirpc list 127.0.0.1:1099
//!
//! # Make a call (outputs raw JSON)
//! rmirpc call 127.0.0.1:1099 PriceCalculator calculateSellingPrice -a '[100, 15]'
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;
use rmirpc_cli::{parse_registry_addr, services, BIND_ENV};
use rmirpc_client::{Client, ClientConfig};
use rmirpc_server::config::DEFAULT_BIND_ADDR;
use rmirpc_server::{Registry, Server, ServerConfig};

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// rmirpc - remote invocation over a named service registry
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Lookup(LookupArgs),
    List(ListArgs),
    Call(CallArgs),
}

/// Arguments for running a registry server.
///
/// The server binds `PriceCalculator` and `Calc` before accepting
/// connections and answers the built-in `_registry` service.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// start a registry server with the demo services bound
struct ServeArgs {
    /// address to listen on
    ///
    /// Falls back to the RMIRPC_BIND environment variable, then to
    /// 127.0.0.1:1099.
    #[argh(option, short = 'b')]
    bind: Option<String>,

    /// host:port to hand out in lookup results instead of the listening
    /// address
    #[argh(option, long = "advertise")]
    advertise: Option<String>,

    /// largest accepted frame payload in bytes
    #[argh(option, long = "max-frame-size")]
    max_frame_size: Option<usize>,

    /// requests one connection may have running at once
    #[argh(option, long = "max-in-flight")]
    max_in_flight: Option<usize>,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "lookup")]
/// resolve a service name to a remote reference
struct LookupArgs {
    /// registry address (host:port)
    #[argh(positional)]
    registry: String,

    /// service name
    #[argh(positional)]
    service: String,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "list")]
/// list the names bound at a registry
struct ListArgs {
    /// registry address (host:port)
    #[argh(positional)]
    registry: String,
}

/// Arguments for making a single call.
///
/// Outputs the result as raw JSON on stdout. Errors go to stderr with a
/// non-zero exit code.
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// invoke a method on a bound service
struct CallArgs {
    /// registry address (host:port)
    #[argh(positional)]
    registry: String,

    /// service name
    #[argh(positional)]
    service: String,

    /// method name
    #[argh(positional)]
    method: String,

    /// JSON array with the call arguments, `[]` by default
    #[argh(option, short = 'a', long = "args", default = "\"[]\".into()")]
    args: String,

    /// call timeout in milliseconds
    #[argh(option, long = "timeout-ms", default = "30000")]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Client commands print JSON for piping; keep stdout free of logs.
    if matches!(cli.command, Commands::Serve(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Lookup(args) => run_lookup(args).await,
        Commands::List(args) => run_list(args).await,
        Commands::Call(args) => run_call(args).await,
    }
}

fn server_config(args: ServeArgs) -> ServerConfig {
    let bind = args
        .bind
        .or_else(|| std::env::var(BIND_ENV).ok())
        .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());

    let mut config = ServerConfig::new().with_bind_addr(bind);
    if let Some(endpoint) = args.advertise {
        config = config.with_advertised_endpoint(endpoint);
    }
    if let Some(size) = args.max_frame_size {
        config = config.with_max_frame_size(size);
    }
    if let Some(limit) = args.max_in_flight {
        config = config.with_max_in_flight(limit);
    }
    config
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = server_config(args);
    config.validate().map_err(|e| anyhow::anyhow!("Invalid server configuration: {}", e))?;

    let registry = Arc::new(Registry::new());
    services::bind_demo_services(&registry)?;
    tracing::info!(services = ?registry.list(), "Demo services bound");

    let server = Server::bind(config, registry).await?;
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}

async fn connect(registry: &str, config: ClientConfig) -> Result<Client> {
    let (host, port) = parse_registry_addr(registry)?;
    Ok(Client::with_config(host, port, config).await?)
}

async fn run_lookup(args: LookupArgs) -> Result<()> {
    let client = connect(&args.registry, ClientConfig::default()).await?;
    let reference = client.lookup(&args.service).await?;
    println!("{}", serde_json::to_string(&reference)?);
    Ok(())
}

async fn run_list(args: ListArgs) -> Result<()> {
    let client = connect(&args.registry, ClientConfig::default()).await?;
    let names = client.list().await?;
    println!("{}", serde_json::to_string(&names)?);
    Ok(())
}

/// Executes the `call` subcommand.
///
/// # Errors
///
/// Returns an error if:
/// - The args string is not a JSON array
/// - The registry cannot be reached
/// - The call itself fails, remotely or in transport
async fn run_call(args: CallArgs) -> Result<()> {
    let call_args: Vec<serde_json::Value> = serde_json::from_str(&args.args)
        .map_err(|e| anyhow::anyhow!("Invalid JSON array in args: {}", e))?;

    let config = ClientConfig::new().with_call_timeout(Duration::from_millis(args.timeout_ms));
    let client = connect(&args.registry, config).await?;
    let result = client.call(&args.service, &args.method, call_args).await?;

    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

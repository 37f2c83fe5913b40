//! windrose - Live Weather Telemetry Fusion Binary
//!
//! A standalone binary that discovers a local weather station, fuses its two
//! telemetry channels, and serves the merged state over a web dashboard.

use clap::{Args, Parser, Subcommand};
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use windrose::{
    start_web_server, AppState, Broadcaster, DeviceLocator, LinkConfig, Supervisor, WebConfig,
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_WEB_PORT, DISCOVERY_WINDOW_SECS, SERVICE_TYPE,
};

#[derive(Parser)]
#[command(name = "windrose")]
#[command(about = "🌬 windrose - live weather telemetry fusion")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = "Discovers a WeatherLink-Live-style station on the local network, \
fuses its HTTP and UDP telemetry channels, and streams merged weather state to a web dashboard")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Web server bind address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Web server port
    #[arg(short, long, default_value_t = DEFAULT_WEB_PORT)]
    port: u16,

    /// HTTP snapshot poll interval in seconds
    #[arg(short = 'i', long, default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    poll_interval: u64,

    /// DNS-SD service type to browse for
    #[arg(long, default_value = SERVICE_TYPE)]
    service_type: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the telemetry pipeline and web server (default)
    Serve(ServeArgs),

    /// Probe the network once for a weather device and exit
    Discover(DiscoverArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Static files directory with a custom dashboard (optional)
    #[arg(long)]
    static_dir: Option<String>,

    /// Disable CORS headers
    #[arg(long)]
    no_cors: bool,

    /// Maximum WebSocket connections
    #[arg(long, default_value_t = 100)]
    max_connections: usize,
}

#[derive(Args)]
struct DiscoverArgs {
    /// How many seconds to wait for an advertisement
    #[arg(short, long, default_value_t = DISCOVERY_WINDOW_SECS)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;
    print_banner();

    match &cli.command {
        Some(Commands::Serve(args)) => serve_command(&cli, args).await?,
        Some(Commands::Discover(args)) => discover_command(&cli, args).await?,
        None => {
            let serve_args = ServeArgs {
                static_dir: None,
                no_cors: false,
                max_connections: 100,
            };
            serve_command(&cli, &serve_args).await?;
        }
    }

    Ok(())
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

fn print_banner() {
    println!("🌬 windrose - live weather telemetry fusion");
    println!("   Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
}

async fn serve_command(cli: &Cli, args: &ServeArgs) -> anyhow::Result<()> {
    info!("Starting windrose telemetry pipeline...");

    let link_config = LinkConfig::default()
        .with_service_type(cli.service_type.clone())
        .with_poll_interval(Duration::from_secs(cli.poll_interval.max(1)));

    let web_config = WebConfig::new(&cli.host, cli.port)
        .with_static_path(args.static_dir.clone())
        .with_cors(!args.no_cors)
        .with_max_websocket_connections(args.max_connections);

    info!("Web server configuration:");
    info!("  - Bind address: {}:{}", cli.host, cli.port);
    info!("  - CORS enabled: {}", !args.no_cors);
    info!("  - Max WebSocket connections: {}", args.max_connections);
    info!("  - Poll interval: {}s", cli.poll_interval);
    info!("  - Service type: {}", cli.service_type);

    let broadcaster = Broadcaster::new(web_config.broadcast_capacity)
        .with_client_limit(web_config.max_websocket_connections);
    let supervisor = Supervisor::new(link_config, broadcaster.clone())?;
    let state = AppState {
        broadcaster,
        station: supervisor.state(),
    };

    tokio::spawn(supervisor.run());

    info!("Starting web server...");
    start_web_server(web_config, state).await?;

    Ok(())
}

async fn discover_command(cli: &Cli, args: &DiscoverArgs) -> anyhow::Result<()> {
    println!(
        "Browsing for {} ({}s window)...",
        cli.service_type, args.timeout
    );

    let window = Duration::from_secs(args.timeout.max(1));
    match DeviceLocator::probe(&cli.service_type, window).await? {
        Some(handle) => {
            println!("Weather device found:");
            println!("  Name:    {}", handle.name);
            println!("  Address: {}", handle.address);
            println!("  Port:    {}", handle.port);
        }
        None => {
            println!("No weather device found within {}s", args.timeout);
            std::process::exit(1);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["windrose", "--port", "9090"]).unwrap();
        assert_eq!(cli.port, 9090);
    }

    #[test]
    fn test_default_values() {
        let cli = Cli::try_parse_from(["windrose"]).unwrap();
        assert_eq!(cli.port, DEFAULT_WEB_PORT);
        assert_eq!(cli.poll_interval, DEFAULT_POLL_INTERVAL_SECS);
        assert_eq!(cli.host, "0.0.0.0");
        assert_eq!(cli.service_type, SERVICE_TYPE);
    }

    #[test]
    fn test_discover_subcommand() {
        let cli = Cli::try_parse_from(["windrose", "discover", "--timeout", "3"]).unwrap();
        match cli.command {
            Some(Commands::Discover(args)) => assert_eq!(args.timeout, 3),
            _ => panic!("expected discover subcommand"),
        }
    }
}

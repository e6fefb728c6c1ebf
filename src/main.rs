use anyhow::Result;
use clap::{Parser, ValueEnum};
use scrape_exporter::truenas::TrueNasClient;
use scrape_exporter::{collectors, config::Config, scrape::CollectorRegistry, server};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/Default.toml")]
    config: String,

    /// Default TrueNAS host for /metrics (overrides config)
    #[arg(long, env = "TRUENAS_HOST")]
    truenas_host: Option<String>,

    /// TrueNAS API key (overrides config)
    #[arg(long, env = "TRUENAS_API_KEY")]
    truenas_api_key: Option<String>,

    /// Port to listen on for metrics (overrides config)
    #[arg(short, long, env = "EXPORTER_PORT")]
    port: Option<u16>,

    /// Address to bind to (overrides config)
    #[arg(short, long, env = "EXPORTER_ADDR")]
    addr: Option<String>,

    /// Enable a collector; repeatable (e.g. --collector dataset)
    #[arg(long = "collector", value_name = "NAME")]
    enable: Vec<String>,

    /// Disable a collector; repeatable
    #[arg(long = "no-collector", value_name = "NAME")]
    disable: Vec<String>,

    /// Only run collectors that were explicitly enabled
    #[arg(long)]
    disable_default_collectors: bool,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, env = "LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_format);

    info!("Starting exporter v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = Config::load(&args.config)?;

    // Override with CLI arguments if provided
    if let Some(host) = args.truenas_host {
        config.truenas.host = host;
    }
    if let Some(api_key) = args.truenas_api_key {
        config.truenas.api_key = secrecy::SecretString::new(api_key.into());
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }
    for name in args.enable {
        config.collectors.insert(name, true);
    }
    for name in args.disable {
        config.collectors.insert(name, false);
    }
    config.exporter.disable_default_collectors |= args.disable_default_collectors;
    config.validate()?;

    info!("Configuration loaded successfully");
    info!("Default TrueNAS host: {}", config.truenas.host);

    let registry = Arc::new(CollectorRegistry::new());
    registry.register_session_client(TrueNasClient::new(config.truenas.clone()));
    collectors::register_all(&registry)?;

    for (name, enabled) in &config.collectors {
        registry.set_enabled(name, *enabled)?;
    }
    registry.set_disable_defaults(config.exporter.disable_default_collectors);

    info!(
        "Metrics endpoint: http://{}:{}/metrics",
        config.server.addr, config.server.port
    );

    // Start the metrics server
    if let Err(e) = server::start(config, registry).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

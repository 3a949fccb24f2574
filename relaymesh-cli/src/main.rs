use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use relaymesh_core::config::{Config, EdgeConfig};
use relaymesh_core::logging::init_logging_with_config;
use relaymesh_core::shutdown::wait_for_signal;
use relaymesh_core::{Controller, RelayClient, Router};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "relaymesh")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Override the log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the topology controller
    Controller {
        /// Address to listen on
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Static link as NAME:NAME:WEIGHT (repeatable)
        #[arg(long = "edge", value_parser = parse_edge)]
        edges: Vec<EdgeConfig>,
    },

    /// Run a relay router
    Router {
        /// Router name, unique across the network
        #[arg(long)]
        name: Option<String>,

        /// Address to listen on
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// Controller address (host:port)
        #[arg(long)]
        controller: Option<String>,
    },

    /// Ask a router to send a message or file
    Send {
        /// Router to hand the request to (host:port)
        #[arg(long, default_value = "127.0.0.1:8080")]
        router: String,

        /// Destination router name
        destination: String,

        /// Message text, or the file name when --file is given
        message: Option<String>,

        /// Send this file's contents
        #[arg(long)]
        file: Option<String>,

        /// Keep the connection open and print deliveries until interrupted
        #[arg(long)]
        follow: bool,
    },
}

fn parse_edge(value: &str) -> Result<EdgeConfig, String> {
    let parts: Vec<&str> = value.split(':').collect();
    let [a, b, weight] = parts.as_slice() else {
        return Err(format!("expected NAME:NAME:WEIGHT, got '{}'", value));
    };
    let weight = weight
        .parse::<i64>()
        .map_err(|e| format!("invalid weight '{}': {}", weight, e))?;
    Ok(EdgeConfig::new(*a, *b, weight))
}

fn expand_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path).with_context(|| format!("expanding '{}'", path))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => {
            let path = expand_path(path)?;
            Config::from_file(&path)
                .with_context(|| format!("loading config from {}", path.display()))?
        }
        None => Config::default(),
    };
    config.apply_env()?;

    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }

    match &args.command {
        Command::Controller { bind, edges } => {
            if let Some(bind) = bind {
                config.controller.bind_address = *bind;
            }
            config.controller.edges.extend(edges.iter().cloned());
        }
        Command::Router {
            name,
            bind,
            controller,
        } => {
            if let Some(name) = name {
                config.router.name = name.clone();
            }
            if let Some(bind) = bind {
                config.router.bind_address = *bind;
            }
            if let Some(controller) = controller {
                config.router.controller_address = controller.clone();
            }
        }
        Command::Send { .. } => {}
    }

    config.router.routes_dir = expand_path(&config.router.routes_dir.to_string_lossy())?;
    config.router.received_dir = expand_path(&config.router.received_dir.to_string_lossy())?;

    config.validate()?;
    Ok(config)
}

fn install_metrics(config: &Config) -> Result<()> {
    if !config.metrics.enabled {
        return Ok(());
    }
    PrometheusBuilder::new()
        .with_http_listener(config.metrics.bind_address)
        .install()
        .context("installing Prometheus exporter")?;
    relaymesh_core::metrics::init_metrics();
    info!(address = %config.metrics.bind_address, "Prometheus exporter listening");
    Ok(())
}

async fn run_controller(config: Config) -> Result<()> {
    let controller = Controller::new(config.controller)?;
    let addr = controller.start_server().await?;
    info!(address = %addr, "Controller running, press Ctrl+C to stop");

    wait_for_signal().await?;
    controller.stop().await;
    Ok(())
}

async fn run_router(config: Config) -> Result<()> {
    let router = Router::new(config.router)?;
    let addr = router.start_server().await?;
    router
        .connect_to_controller()
        .await
        .context("connecting to controller")?;
    info!(node = %router.name(), address = %addr, "Router running, press Ctrl+C to stop");

    wait_for_signal().await?;
    router.stop().await;
    Ok(())
}

async fn run_send(
    config: &Config,
    router: &str,
    destination: &str,
    message: Option<String>,
    file: Option<String>,
    follow: bool,
) -> Result<()> {
    let mut client = RelayClient::connect(router, config.router.connect_timeout).await?;

    match (file, message) {
        (Some(file), message) => {
            let path = expand_path(&file)?;
            let contents = tokio::fs::read(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let name = match message {
                Some(name) => name,
                None => path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .context("file has no name")?,
            };
            client.send_file(destination, &name, &contents).await?;
            info!(destination, file = %path.display(), bytes = contents.len(), "File handed to router");
        }
        (None, Some(message)) => {
            client.send_message(destination, &message).await?;
            info!(destination, "Message handed to router");
        }
        (None, None) if follow => {}
        (None, None) => bail!("nothing to send: give a message or --file"),
    }

    if follow {
        loop {
            tokio::select! {
                delivery = client.receive() => match delivery? {
                    Some(delivery) => match delivery.file {
                        Some(path) => println!("{} (saved to {})", delivery.message, path.display()),
                        None => println!("{}", delivery.message),
                    },
                    None => {
                        warn!(router, "Router closed the connection");
                        break;
                    }
                },
                signal = wait_for_signal() => {
                    signal?;
                    break;
                }
            }
        }
    }

    client.close().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    init_logging_with_config(config.logging.to_log_config()?)?;
    install_metrics(&config)?;

    match args.command {
        Command::Controller { .. } => run_controller(config).await,
        Command::Router { .. } => run_router(config).await,
        Command::Send {
            router,
            destination,
            message,
            file,
            follow,
        } => run_send(&config, &router, &destination, message, file, follow).await,
    }
}

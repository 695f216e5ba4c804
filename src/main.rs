use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::runtime::Builder;

use sdn_routing::algorithms::Algorithm;
use sdn_routing::client;
use sdn_routing::config::{ControllerConfig, NetworkConfig, RouterConfig};
use sdn_routing::control_server::ControlServer;
use sdn_routing::protocol::{Cipher, SharedKeyCipher};
use sdn_routing::router::Router;

const DEFAULT_KEY: &str = "sdn-routing-preshared-key";

#[derive(Parser)]
#[command(name = "sdn", about = "Centralized routing controller and store-and-forward routers")]
struct Cli {
    /// Static network description (ports, node ids, links)
    #[arg(long, global = true, default_value = "network.json")]
    network: PathBuf,

    /// Pre-shared key protecting every message
    #[arg(long, global = true, default_value = DEFAULT_KEY)]
    key: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the controller
    Controller {
        #[arg(long, default_value_t = 8888)]
        port: u16,

        #[arg(long, value_enum, default_value_t = Algorithm::Dijkstra)]
        algorithm: Algorithm,

        #[arg(long, default_value = "state")]
        state_dir: PathBuf,

        /// Seconds between liveness cycles
        #[arg(long, default_value_t = 10)]
        probe_interval: u64,

        /// Seconds a router gets to answer a probe
        #[arg(long, default_value_t = 2)]
        probe_timeout: u64,
    },
    /// Run a router and register it with the controller
    Router {
        #[arg(long)]
        name: String,

        #[arg(long, default_value = "127.0.0.1:8888")]
        controller: SocketAddr,

        #[arg(long, default_value = "state")]
        state_dir: PathBuf,
    },
    /// Ask a router to stop serving
    Shutdown {
        #[arg(long)]
        router: String,
    },
    /// Print the controller's current topology as JSON
    Topology {
        #[arg(long, default_value = "127.0.0.1:8888")]
        controller: SocketAddr,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let network = Arc::new(NetworkConfig::load(&cli.network)?);
    let cipher: Arc<dyn Cipher> = Arc::new(SharedKeyCipher::from_passphrase(&cli.key));

    let rt = Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(async {
        match cli.command {
            Command::Controller { port, algorithm, state_dir, probe_interval, probe_timeout } => {
                env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

                let config = ControllerConfig {
                    port,
                    algorithm,
                    probe_interval: Duration::from_secs(probe_interval),
                    probe_timeout: Duration::from_secs(probe_timeout),
                    state_dir,
                    ..ControllerConfig::default()
                };
                let server = ControlServer::bind(config, network, cipher).await?;
                server.start().await?;
            }
            Command::Router { name, controller, state_dir } => {
                tracing_subscriber::fmt().init();

                let mut config = RouterConfig::new(name, controller);
                config.state_dir = state_dir;
                let router = Router::bind(config, network, cipher).await?;
                router.start().await?;
            }
            Command::Shutdown { router } => {
                tracing_subscriber::fmt().init();

                let addr = network
                    .router_addr(&router)
                    .with_context(|| format!("router {} is not in the network description", router))?;
                client::shutdown_router(addr, cipher.as_ref()).await?;
                println!("Shutdown sent to {}", router);
            }
            Command::Topology { controller } => {
                tracing_subscriber::fmt().init();

                let topology = client::query_topology(controller, cipher.as_ref()).await?;
                println!("{}", serde_json::to_string_pretty(&topology)?);
            }
        }
        Ok(())
    })
}

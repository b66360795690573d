use clap::Parser;
use log::info;
use server::network::Server;
use shared::SimConfig;
use std::path::PathBuf;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Tick rate (updates per second)
    #[clap(short, long)]
    tick_rate: Option<u32>,
    /// Number of food pellets kept in the world
    #[clap(long)]
    food_target: Option<usize>,
    /// Side length of the square world
    #[clap(long)]
    world_size: Option<u16>,
    /// Maximum number of concurrent clients
    #[clap(short, long, default_value = "64")]
    max_clients: usize,
    /// JSON file with simulation parameters
    #[clap(short, long)]
    config: Option<PathBuf>,
}

impl Args {
    /// File values first, then command line overrides.
    fn sim_config(&self) -> Result<SimConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => SimConfig::from_json_file(path)?,
            None => SimConfig::default(),
        };
        if let Some(tick_rate) = self.tick_rate {
            config.tick_rate = tick_rate;
        }
        if let Some(food_target) = self.food_target {
            config.food_target = food_target;
        }
        if let Some(world_size) = self.world_size {
            config.world_size = world_size;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();
    let config = args.sim_config()?;
    let address = format!("{}:{}", args.host, args.port);

    info!(
        "Starting server on {} (world {}, {} Hz, food {})",
        address, config.world_size, config.tick_rate, config.food_target
    );

    let mut server = Server::bind(&address, config, args.max_clients).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}

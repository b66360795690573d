use clap::Parser;
use client::network::{Client, ClientOptions};
use log::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket URL of the server
    #[arg(short = 's', long, default_value = "ws://127.0.0.1:8080")]
    server: String,

    /// Display name, truncated to 16 characters by the server
    #[arg(short = 'n', long, default_value = "player")]
    name: String,

    /// Constant steering rate in radians per second
    #[arg(long, default_value = "0.0", allow_hyphen_values = true)]
    steer: f32,

    /// Hold boost the whole time
    #[arg(short = 'b', long)]
    boost: bool,

    /// Request a new snake automatically after dying
    #[arg(short = 'r', long)]
    auto_respawn: bool,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting client...");
    info!("Connecting to: {}", args.server);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }

    let options = ClientOptions {
        auto_respawn: args.auto_respawn,
        steer_rate: args.steer,
        boost: args.boost,
        fake_ping_ms: args.fake_ping,
    };
    let mut client = Client::connect(&args.server, &args.name, options).await?;

    tokio::select! {
        result = client.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, disconnecting");
            client.close().await?;
        }
    }

    Ok(())
}

use clap::Parser;
use client::network::Client;
use log::info;
use shared::Role;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:3001")]
    server: String,

    /// Role to connect as: admin, public or player
    #[arg(short = 'r', long, default_value = "public")]
    role: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let role: Role = args.role.parse()?;

    info!("Starting client...");
    info!("Connecting to: {} as {}", args.server, role);

    let mut client = Client::new(&args.server, role);
    client.run().await;

    Ok(())
}

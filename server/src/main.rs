use clap::Parser;
use log::info;
use server::game::Game;
use server::network::{self, GameCommand};
use server::sessions::SessionRegistry;
use tokio::sync::mpsc;

/// Main-method of the application.
/// Parses command-line arguments, then runs the HTTP/WebSocket front end
/// and the game loop as separate tasks.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "3001")]
        port: u16,
        /// Seconds between fund price ticks
        #[clap(short, long, default_value = "5")]
        tick_secs: u64,
    }

    let args = Args::parse();
    let tick_secs = args.tick_secs;

    // Bounded channel between connection handlers and the game loop
    let (cmd_tx, cmd_rx) = mpsc::channel::<GameCommand>(1000);

    let address = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Server listening on {}", address);

    // Spawn network thread
    let server_handle = tokio::spawn(async move {
        if let Err(e) = network::serve(listener, cmd_tx).await {
            eprintln!("Failed to run HTTP server: {}", e);
        }
    });

    // Spawn game loop thread
    let game_handle = tokio::spawn(async move {
        network::run_game_loop(Game::new(), SessionRegistry::new(), cmd_rx, tick_secs).await;
    });

    // Handle shutdown gracefully
    tokio::select! {
        result = server_handle => {
            if let Err(e) = result {
                eprintln!("Network task panicked: {}", e);
            }
        }
        result = game_handle => {
            if let Err(e) = result {
                eprintln!("Game loop task panicked: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}

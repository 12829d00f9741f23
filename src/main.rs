use clap::Parser;
use tracing_subscriber::EnvFilter;

use tsr_goalseek::api::{Cli, Command, run_cli, run_http_server};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { port } => {
            if let Err(e) = run_http_server(port).await {
                eprintln!("Server error: {e}");
                std::process::exit(1);
            }
        }
        Command::Run(args) => {
            if let Err(e) = run_cli(&args) {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
    }
}

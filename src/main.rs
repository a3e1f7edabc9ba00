use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = eeg_prep::Cli::parse();
    if let Err(e) = eeg_prep::run(cli).await {
        eprintln!("[ERROR] {e:#}");
        std::process::exit(1);
    }
}

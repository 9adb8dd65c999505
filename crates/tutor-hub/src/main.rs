#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use dotenvy::dotenv;
#[cfg(feature = "cli")]
use tutor_hub::{config::Config, run_server, ConversationDatabase};

#[cfg(feature = "cli")]
#[derive(Debug, Parser)]
#[command(name = "tutor-hub", version, about = "Tutoring backend with durable conversation archives")]
struct Cli {
    /// Directory holding conversations/, archived/ and index.json
    #[arg(long)]
    data_root: Option<std::path::PathBuf>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Rebuild index.json from the per-session files, then exit
    #[arg(long)]
    rebuild_index: bool,
}

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let mut cfg = Config::from_env()?;
    if let Some(data_root) = cli.data_root {
        cfg.data_root = data_root;
    }
    if let Some(host) = cli.host {
        cfg.api_host = host;
    }
    if let Some(port) = cli.port {
        cfg.api_port = port;
    }

    if cli.rebuild_index {
        tutor_hub::telemetry::init_tracing("info");
        let db = ConversationDatabase::open(&cfg.data_root)?;
        let index = db.rebuild_index()?;
        println!(
            "Rebuilt index at {}: {} active, {} archived",
            db.index.path().display(),
            index.active.len(),
            index.archived.len()
        );
        return Ok(());
    }

    println!("Starting tutor-hub on {}:{}", cfg.api_host, cfg.api_port);
    run_server(cfg).await
}

#[cfg(not(feature = "cli"))]
fn main() {
    println!("CLI feature not enabled. Enable with --features cli");
}

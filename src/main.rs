use anyhow::Result;
use tracing::info;

use surge::config::Config;
use surge::generator::LoadGenerator;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("surge=debug,info")
        .init();

    info!("Starting surge load generator");

    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading config from {}", path);
            Config::from_file(&path)?
        }
        None => Config::default(),
    };

    let generator = LoadGenerator::new(&config);
    let counters = generator.run().await;

    println!("quitting");
    println!("requests: {}", counters.requests);
    println!("successes: {}", counters.successes);
    println!("errors: {}", counters.errors);

    Ok(())
}

//! Review server commands: `venue-review serve` and `venue-review init-db`.

use anyhow::Result;

use venue_review::config::ServiceConfig;
use venue_review::workflow::server::{self, ServerConfig};

pub async fn cmd_serve(config: &ServiceConfig) -> Result<()> {
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }
    server::start_server(ServerConfig::from(config)).await
}

pub fn cmd_init_db(config: &ServiceConfig) -> Result<()> {
    let path = &config.database.path;
    server::open_database(path)?;
    println!("Review database initialized at {}", path.display());
    Ok(())
}

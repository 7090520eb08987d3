use anyhow::Result;
use tracing::info;

use lucena_uci::UciEngine;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();
    info!("lucena starting");

    UciEngine::new().run()?;
    Ok(())
}

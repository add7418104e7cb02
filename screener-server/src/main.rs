use anyhow::Result;
use screener_runner::ScreenerConfig;
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    screener_server::init_tracing();

    let path = std::env::var_os("SCREENER_CONFIG").map(PathBuf::from);
    let config = ScreenerConfig::load(path.as_deref())?;
    screener_server::serve(config).await
}

use color_eyre::Result;
use std::path::PathBuf;
use trainsync::{logging, Config, NotionSynchronizer};

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  // Optional config file; NOTION_TOKEN, PAGE_ID and TRAINSYNC_DATABASE come from the environment
  let config_path = std::env::var_os("TRAINSYNC_CONFIG").map(PathBuf::from);
  let config = Config::load(config_path.as_deref())?;

  let _log_guard = logging::init(&config.log_dir()?)?;

  let synchronizer = NotionSynchronizer::from_config(&config)?;
  let report = synchronizer.run_once().await?.into_result()?;

  tracing::info!(
    changes = report.changes.len(),
    strike = report.strike_recorded,
    "Sync finished"
  );
  println!("Successfully synced updates, exiting with code 0...");

  Ok(())
}

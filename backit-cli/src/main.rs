use anyhow::{Context, Result};
use backit_cli::{cli::Cli, settings::Settings};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load().context("Loading settings")?;
    cli.run(settings).await?;

    Ok(())
}

use anyhow::Result;
use clap::Parser;
use tablechat::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    tablechat::run(args).await
}

use clap::Parser;
use keygate::cli::{self, Cli, Command};
use keygate::infrastructure::logging::init_logging;
use keygate::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Command::Hash { secret } = &cli.command {
        println!("{}", cli::hash(secret));
        return Ok(());
    }

    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;
    init_logging(&config.logging);

    match cli.command {
        Command::Serve => cli::serve::run(config).await,
        Command::Migrate => cli::migrate::run(config).await,
        Command::Hash { .. } => Ok(()),
    }
}

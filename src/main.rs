use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    bookcrawl::logging::init().context("init logging")?;

    let cli = bookcrawl::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        bookcrawl::cli::Command::Crawl(args) => {
            bookcrawl::crawl::run(args).await.context("crawl")?;
        }
        bookcrawl::cli::Command::Parse(args) => {
            bookcrawl::parse::run(args).context("parse")?;
        }
        bookcrawl::cli::Command::Site {
            command: bookcrawl::cli::SiteCommand::Init(args),
        } => {
            bookcrawl::site::init(args).context("site init")?;
        }
    }

    Ok(())
}

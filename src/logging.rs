use std::io::IsTerminal as _;

use anyhow::Context as _;

const DEFAULT_FILTER: &str = "info,chromiumoxide=warn,html5ever=warn,selectors=warn";

pub fn init() -> anyhow::Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.trim().is_empty() => {
            tracing_subscriber::EnvFilter::try_new(&directives)
                .with_context(|| format!("parse RUST_LOG: {directives}"))?
        }
        _ => tracing_subscriber::EnvFilter::try_new(DEFAULT_FILTER).context("build log filter")?,
    };

    let ansi = std::io::stderr().is_terminal();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(ansi)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}

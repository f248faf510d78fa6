use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Crawl(CrawlArgs),
    Parse(ParseArgs),
    Site {
        #[command(subcommand)]
        command: SiteCommand,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Engine {
    /// Headless Chrome; runs page scripts before reading the DOM.
    Browser,
    /// Plain HTTP GET; only for pages that render server-side.
    Http,
}

#[derive(Debug, Args)]
pub struct CrawlArgs {
    /// Site profile YAML (default: built-in profile, see `site init`).
    #[arg(long)]
    pub site: Option<String>,

    /// Page fetching backend.
    #[arg(long, value_enum, default_value_t = Engine::Browser)]
    pub engine: Engine,

    /// Maximum listing pages to visit.
    #[arg(long, default_value_t = 5)]
    pub max_pages: usize,

    /// Delay after each book; pages wait twice as long.
    #[arg(long, default_value_t = 3000)]
    pub delay_ms: u64,

    /// Per-page load timeout.
    #[arg(long, default_value_t = 10)]
    pub timeout_secs: u64,

    /// Search keyword substituted into the listing URL.
    #[arg(long, default_value = "")]
    pub keyword: String,

    /// Category filter substituted into the listing URL.
    #[arg(long, default_value = "")]
    pub category: String,

    /// Output path for the JSON array.
    #[arg(long, default_value = "books_data.json")]
    pub json_out: String,

    /// Output path for the CSV table.
    #[arg(long, default_value = "books_data.csv")]
    pub csv_out: String,

    /// Chrome/Chromium executable (default: auto-detect).
    #[arg(long)]
    pub chrome: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PageKind {
    List,
    Detail,
}

#[derive(Debug, Args)]
pub struct ParseArgs {
    /// Saved HTML file to parse.
    #[arg(long)]
    pub html: String,

    /// Which field mapping to apply.
    #[arg(long, value_enum)]
    pub kind: PageKind,

    /// Site profile YAML (default: built-in profile).
    #[arg(long)]
    pub site: Option<String>,

    /// URL the page was saved from; relative links resolve against it.
    #[arg(long)]
    pub base_url: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum SiteCommand {
    Init(SiteInitArgs),
}

#[derive(Debug, Args)]
pub struct SiteInitArgs {
    /// Output path for the profile YAML.
    #[arg(long)]
    pub out: String,

    /// Overwrite an existing file.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

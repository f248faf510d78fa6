#![forbid(unsafe_code)]

pub mod browser;
pub mod cli;
pub mod crawl;
pub mod export;
pub mod extract;
pub mod fetch;
pub mod formats;
pub mod logging;
pub mod parse;
pub mod site;

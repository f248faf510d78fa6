use std::io::Write as _;

use anyhow::Context as _;
use scraper::{ElementRef, Html};
use url::Url;

use crate::cli::{PageKind, ParseArgs};
use crate::extract::extract_field;
use crate::formats::BookRecord;
use crate::site::{CompiledField, CompiledProfile, SiteProfile};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("field {field}: cannot resolve link {value:?}: {source}")]
    InvalidLink {
        field: String,
        value: String,
        #[source]
        source: url::ParseError,
    },
}

/// Parses a saved page offline and prints the records as JSON.
pub fn run(args: ParseArgs) -> anyhow::Result<()> {
    let profile = SiteProfile::load_or_default(args.site.as_deref())
        .context("load site profile")?
        .compile()
        .context("compile site profile")?;
    let base_url = args
        .base_url
        .as_deref()
        .map(Url::parse)
        .transpose()
        .context("parse --base-url")?;
    let html =
        std::fs::read_to_string(&args.html).with_context(|| format!("read html: {}", args.html))?;

    let json = match args.kind {
        PageKind::List => {
            let books = parse_list(&html, &profile, base_url.as_ref());
            tracing::info!(books = books.len(), "parsed list page");
            serde_json::to_string_pretty(&books)
        }
        PageKind::Detail => serde_json::to_string_pretty(&parse_detail(
            &html,
            &profile,
            base_url.as_ref(),
        )),
    }
    .context("serialize parsed records")?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{json}").context("write stdout")?;
    Ok(())
}

/// Splits a listing page into one summary record per item container.
///
/// Items that fail to build are logged and skipped; their siblings are kept.
pub fn parse_list(html: &str, profile: &CompiledProfile, page_url: Option<&Url>) -> Vec<BookRecord> {
    let document = Html::parse_document(html);
    let mut books = Vec::new();

    for (index, item) in document.select(&profile.item).enumerate() {
        match build_record(item, &profile.list_fields, page_url) {
            Ok(record) => {
                tracing::debug!(
                    index,
                    title = record.get("title").unwrap_or_default(),
                    "parsed list item"
                );
                books.push(record);
            }
            Err(err) => {
                tracing::warn!(index, %err, "skipping list item");
            }
        }
    }

    books
}

/// Builds the detail record for a single book page.
pub fn parse_detail(html: &str, profile: &CompiledProfile, page_url: Option<&Url>) -> BookRecord {
    if html.trim().is_empty() {
        return BookRecord::new();
    }

    let document = Html::parse_document(html);
    let root = document.root_element();

    let mut record = BookRecord::new();
    for field in &profile.detail_fields {
        let value = match field_value(root, field, page_url) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(%err, "dropping detail field");
                String::new()
            }
        };
        record.insert(field.name.clone(), value);
    }
    record
}

fn build_record(
    node: ElementRef<'_>,
    fields: &[CompiledField],
    page_url: Option<&Url>,
) -> Result<BookRecord, ParseError> {
    let mut record = BookRecord::new();
    for field in fields {
        record.insert(field.name.clone(), field_value(node, field, page_url)?);
    }
    Ok(record)
}

fn field_value(
    node: ElementRef<'_>,
    field: &CompiledField,
    page_url: Option<&Url>,
) -> Result<String, ParseError> {
    let value = extract_field(node, field).unwrap_or_default();
    if !field.link || value.is_empty() {
        return Ok(value);
    }

    let Some(base) = page_url else {
        return Ok(value);
    };
    base.join(&value)
        .map(String::from)
        .map_err(|source| ParseError::InvalidLink {
            field: field.name.clone(),
            value,
            source,
        })
}

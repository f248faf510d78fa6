use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::Path;

use anyhow::Context as _;

use crate::formats::BookRecord;

/// Writes every record as a pretty-printed JSON array, replacing `path`.
pub fn save_json(records: &[BookRecord], path: &Path) -> anyhow::Result<bool> {
    ensure_parent_dir(path)?;

    let file = File::create(path).with_context(|| format!("create json: {}", path.display()))?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, records).context("serialize records json")?;
    out.write_all(b"\n").context("write json newline")?;
    out.flush()
        .with_context(|| format!("flush json: {}", path.display()))?;

    tracing::info!(path = %path.display(), records = records.len(), "saved json");
    Ok(true)
}

/// Writes records as CSV, replacing `path`.
///
/// Columns are the union of every record's keys in first-seen order; a
/// record without a column gets an empty cell. Nothing is written when
/// there are no records.
pub fn save_csv(records: &[BookRecord], path: &Path) -> anyhow::Result<bool> {
    if records.is_empty() {
        tracing::warn!(path = %path.display(), "no records; skipping csv");
        return Ok(false);
    }
    ensure_parent_dir(path)?;

    let columns = union_columns(records);
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("create csv: {}", path.display()))?;
    writer.write_record(&columns).context("write csv header")?;
    for record in records {
        let row = columns
            .iter()
            .map(|column| record.get(column).unwrap_or_default());
        writer.write_record(row).context("write csv row")?;
    }
    writer
        .flush()
        .with_context(|| format!("flush csv: {}", path.display()))?;

    tracing::info!(
        path = %path.display(),
        records = records.len(),
        columns = columns.len(),
        "saved csv"
    );
    Ok(true)
}

fn union_columns(records: &[BookRecord]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !columns.iter().any(|column| column == key) {
                columns.push(key.to_owned());
            }
        }
    }
    columns
}

fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir: {}", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(fields: &[(&str, &str)]) -> BookRecord {
        fields.iter().copied().collect()
    }

    #[test]
    fn json_round_trip_preserves_order_and_unicode() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("books_data.json");
        let records = vec![
            book(&[("title", "三体"), ("author", "刘慈欣"), ("isbn", "")]),
            book(&[("title", "Ficciones"), ("author", "Borges")]),
        ];

        assert!(save_json(&records, &path)?);

        let text = std::fs::read_to_string(&path)?;
        assert!(text.contains("三体"), "non-ascii must be written literally");
        assert!(!text.contains("\\u"));

        let back: Vec<BookRecord> = serde_json::from_str(&text)?;
        assert_eq!(back, records);
        assert_eq!(
            back[0].keys().collect::<Vec<_>>(),
            vec!["title", "author", "isbn"]
        );
        Ok(())
    }

    #[test]
    fn json_overwrites_previous_output() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("out/books.json");

        save_json(&[book(&[("title", "old")])], &path)?;
        save_json(&[], &path)?;

        assert_eq!(std::fs::read_to_string(&path)?.trim(), "[]");
        Ok(())
    }

    #[test]
    fn csv_uses_union_of_keys() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("books_data.csv");
        let records = vec![
            book(&[("title", "A"), ("detail_url", "")]),
            book(&[("title", "B, with comma"), ("detail_url", "/b"), ("pages", "12")]),
        ];

        assert!(save_csv(&records, &path)?);

        let mut reader = csv::Reader::from_path(&path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_owned).collect();
        assert_eq!(headers, vec!["title", "detail_url", "pages"]);

        let rows: Vec<Vec<String>> = reader
            .records()
            .map(|row| row.map(|row| row.iter().map(str::to_owned).collect()))
            .collect::<Result<_, _>>()?;
        assert_eq!(
            rows,
            vec![
                vec!["A".to_owned(), String::new(), String::new()],
                vec!["B, with comma".to_owned(), "/b".to_owned(), "12".to_owned()],
            ]
        );
        Ok(())
    }

    #[test]
    fn csv_skips_empty_result_set() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let path = temp.path().join("books_data.csv");

        assert!(!save_csv(&[], &path)?);
        assert!(!path.exists());
        Ok(())
    }
}

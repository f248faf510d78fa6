use scraper::{ElementRef, Selector};

use crate::site::CompiledField;

/// Text of the first element under `node` matching `selector`.
///
/// Text nodes are trimmed individually. Adjacent nodes are separated by one
/// space only where the markup had whitespace between them, so `刘<b>慈欣</b>`
/// stays `刘慈欣`.
pub fn extract_text(node: ElementRef<'_>, selector: &Selector) -> Option<String> {
    let found = node.select(selector).next()?;
    Some(collapse_text(found))
}

/// Attribute `attr` of the first element under `node` matching `selector`.
pub fn extract_attribute(node: ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    node.select(selector)
        .next()
        .and_then(|found| found.value().attr(attr))
        .map(|value| value.trim().to_owned())
}

pub fn extract_field(node: ElementRef<'_>, field: &CompiledField) -> Option<String> {
    match field.attr.as_deref() {
        Some(attr) => extract_attribute(node, &field.selector, attr),
        None => extract_text(node, &field.selector),
    }
}

fn collapse_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    let mut gap = false;
    for raw in element.text() {
        let piece = raw.trim();
        if piece.is_empty() {
            gap |= !raw.is_empty();
            continue;
        }
        if !out.is_empty() && (gap || raw.starts_with(char::is_whitespace)) {
            out.push(' ');
        }
        out.push_str(piece);
        gap = raw.ends_with(char::is_whitespace);
    }
    out
}

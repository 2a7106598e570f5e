//! Recovery of tour records from the two payload shapes the service serves:
//! an HTML page bootstrapping its client with an escaped JSON string, and
//! paginated HAL documents from the JSON API.

use crate::errors::CatalogError;
use crate::models::TourRecord;
use crate::debug_println;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::OnceLock;

/// Client bootstrap call whose single string argument carries the page data.
pub const BOOTSTRAP_CALL: &str = "kmtBoot.setProps";

fn bootstrap_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // the argument is a double-quoted JS literal; `\.` keeps escaped quotes inside it
    RE.get_or_init(|| Regex::new(r#"kmtBoot\.setProps\(\s*"((?:[^"\\]|\\.)*)"\s*\)"#).unwrap())
}

/// Undo the JS string-literal escaping of the bootstrap argument.
///
/// `\"` must be resolved before `\\` is collapsed: the other order turns an
/// escaped backslash followed by an escaped quote into a bare quote.
pub fn unescape_bootstrap_argument(raw: &str) -> String {
    raw.replace("\\\"", "\"").replace("\\\\", "\\")
}

/// Find the escaped argument of the one bootstrap call in `html`.
pub fn find_bootstrap_argument(html: &str) -> Result<String, CatalogError> {
    let document = Html::parse_document(html);
    let script_selector = Selector::parse("script")
        .map_err(|e| CatalogError::Extraction(format!("invalid script selector: {:?}", e)))?;

    let mut arguments = Vec::new();
    for script in document.select(&script_selector) {
        let code = script.text().collect::<String>();
        for captures in bootstrap_regex().captures_iter(&code) {
            if let Some(argument) = captures.get(1) {
                arguments.push(argument.as_str().to_string());
            }
        }
    }

    debug_println!("Found {} {} call(s) in page", arguments.len(), BOOTSTRAP_CALL);

    match arguments.len() {
        1 => Ok(arguments.remove(0)),
        0 => Err(CatalogError::Extraction(format!(
            "no {} call (not logged in, or the page layout changed)",
            BOOTSTRAP_CALL
        ))),
        n => Err(CatalogError::Extraction(format!(
            "expected one {} call, found {}",
            BOOTSTRAP_CALL, n
        ))),
    }
}

/// Extract tours from an HTML page with embedded bootstrap data.
///
/// The decoded JSON must be an object with a `tours` array.
pub fn extract_embedded_tours(html: &str) -> Result<Vec<TourRecord>, CatalogError> {
    let argument = find_bootstrap_argument(html)?;
    let json_str = unescape_bootstrap_argument(&argument);

    let data: Value = serde_json::from_str(&json_str)
        .map_err(|e| CatalogError::Parse(format!("embedded data is not valid JSON: {}", e)))?;

    let tours = data
        .get("tours")
        .ok_or_else(|| CatalogError::Parse("embedded data has no 'tours' key".to_string()))?;

    records_from_array(tours, "embedded data")
}

/// Extract tours from API pages shaped `{ "_embedded": { "tours": [...] } }`,
/// concatenated in page order.
///
/// Blank pages and pages without `_embedded` (an empty HAL collection)
/// contribute no tours.
pub fn extract_paged_tours<S: AsRef<str>>(pages: &[S]) -> Result<Vec<TourRecord>, CatalogError> {
    let mut records = Vec::new();

    for (index, page) in pages.iter().enumerate() {
        let page = page.as_ref();
        if page.trim().is_empty() {
            debug_println!("Page {} is empty, skipping", index);
            continue;
        }

        let document: Value = serde_json::from_str(page)
            .map_err(|e| CatalogError::Parse(format!("page {} is not valid JSON: {}", index, e)))?;
        records.extend(records_from_page(&document, index)?);
    }

    Ok(records)
}

pub(crate) fn records_from_page(document: &Value, index: usize) -> Result<Vec<TourRecord>, CatalogError> {
    let page = document
        .as_object()
        .ok_or_else(|| CatalogError::Parse(format!("page {} is not a JSON object", index)))?;

    let embedded = match page.get("_embedded") {
        Some(embedded) => embedded,
        None => {
            debug_println!("Page {} has no _embedded collection", index);
            return Ok(Vec::new());
        }
    };

    let tours = embedded
        .get("tours")
        .ok_or_else(|| CatalogError::Parse(format!("page {} has no '_embedded.tours' key", index)))?;

    records_from_array(tours, &format!("page {}", index))
}

fn records_from_array(tours: &Value, origin: &str) -> Result<Vec<TourRecord>, CatalogError> {
    let entries = tours
        .as_array()
        .ok_or_else(|| CatalogError::Parse(format!("'tours' in {} is not a list", origin)))?;

    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| match entry {
            Value::Object(fields) => Ok(TourRecord::new(fields.clone())),
            other => Err(CatalogError::Parse(format!(
                "tour {} in {} is not an object: {}",
                i, origin, other
            ))),
        })
        .collect()
}

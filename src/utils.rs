use crate::catalog::Catalog;
use crate::debug_println;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Fields left out of the CSV by default: internal encodings, nested
/// sub-objects and values that are the same for every tour.
pub const DEFAULT_EXCLUDED_FIELDS: &[&str] = &[
    "_embedded",
    "_links",
    "constitution",
    "difficulty",  // {"grade": "moderate", "explanation_technical": "dm#t2", ...}
    "map_image",
    "map_image_preview",
    "path",
    "query",
    "segments",
    "source",
    "start_point", // {"lat": .., "lng": .., "alt": ..}
    "summary",
    "tour_information",
];

pub fn default_excluded_fields() -> HashSet<String> {
    DEFAULT_EXCLUDED_FIELDS.iter().map(|f| f.to_string()).collect()
}

/// Exclusion set from command line flags: the defaults unless `all_fields`,
/// plus anything named explicitly.
pub fn excluded_fields(extra: &[String], all_fields: bool) -> HashSet<String> {
    let mut excluded = if all_fields {
        HashSet::new()
    } else {
        default_excluded_fields()
    };
    excluded.extend(extra.iter().map(|f| f.trim().to_string()).filter(|f| !f.is_empty()));
    excluded
}

/// Column names for a catalog: every field seen, minus `excluded`, sorted.
pub fn csv_columns(catalog: &Catalog, excluded: Option<&HashSet<String>>) -> Vec<String> {
    catalog
        .fields()
        .iter()
        .filter(|field| excluded.map_or(true, |excluded| !excluded.contains(*field)))
        .cloned()
        .collect()
}

/// Write the catalog as CSV: header first, then one row per tour in
/// catalog order, with empty cells for fields a tour does not have.
///
/// With no columns the header and every row are empty lines.
pub fn write_csv<W: Write>(
    catalog: &Catalog,
    mut out: W,
    excluded: Option<&HashSet<String>>,
) -> Result<()> {
    let columns = csv_columns(catalog, excluded);

    // csv::Writer renders a zero-field record as `""`
    if columns.is_empty() {
        for _ in 0..=catalog.len() {
            out.write_all(b"\n")?;
        }
        out.flush()?;
        debug_println!("Wrote {} rows without columns", catalog.len());
        return Ok(());
    }

    let mut writer = csv::Writer::from_writer(out);

    writer.write_record(&columns)?;
    for tour in catalog.tours() {
        writer.write_record(columns.iter().map(|column| tour.cell(column)))?;
    }

    writer.flush()?;
    debug_println!("Wrote {} rows with {} columns", catalog.len(), columns.len());
    Ok(())
}

/// Export the catalog to `path`, replacing any existing file.
pub fn export_csv(
    catalog: &Catalog,
    path: impl AsRef<Path>,
    excluded: Option<&HashSet<String>>,
) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;

    write_csv(catalog, file, excluded)
        .with_context(|| format!("Failed to write CSV file: {}", path.display()))
}

pub fn save_text(path: impl AsRef<Path>, text: &str) -> Result<()> {
    save_bytes(path, text.as_bytes())
}

pub fn save_bytes(path: impl AsRef<Path>, bytes: &[u8]) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, bytes).with_context(|| format!("Failed to write file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TourRecord;
    use serde_json::{json, Value};

    fn catalog(tours: Vec<Value>) -> Catalog {
        Catalog::from_records(
            tours
                .into_iter()
                .map(|t| serde_json::from_value::<TourRecord>(t).unwrap())
                .collect(),
        )
    }

    fn to_csv(catalog: &Catalog, excluded: Option<&HashSet<String>>) -> String {
        let mut out = Vec::new();
        write_csv(catalog, &mut out, excluded).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn missing_fields_become_empty_cells() {
        let catalog = catalog(vec![json!({"a": "1", "b": "2"}), json!({"b": "3", "c": "4"})]);
        let csv = to_csv(&catalog, None);
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines, vec!["a,b,c", "1,2,", ",3,4"]);
        assert!(!csv.contains("null"));
    }

    #[test]
    fn no_exclusions_equals_empty_exclusions() {
        let catalog = catalog(vec![json!({"id": "1", "path": "x"})]);
        assert_eq!(to_csv(&catalog, None), to_csv(&catalog, Some(&HashSet::new())));
    }

    #[test]
    fn excluded_fields_are_dropped_and_rest_sorted() {
        let catalog = catalog(vec![json!({
            "name": "Runde",
            "_links": {"self": "x"},
            "id": 5,
            "distance": "100",
            "start_point": {"lat": 1.0}
        })]);
        let csv = to_csv(&catalog, Some(&default_excluded_fields()));
        let header = csv.lines().next().unwrap();
        assert_eq!(header, "distance,id,name");
    }

    #[test]
    fn flag_exclusions_extend_or_replace_defaults() {
        let extra = vec!["name".to_string(), " ".to_string()];
        let with_defaults = excluded_fields(&extra, false);
        assert!(with_defaults.contains("_links"));
        assert!(with_defaults.contains("name"));
        assert_eq!(with_defaults.len(), DEFAULT_EXCLUDED_FIELDS.len() + 1);

        let only_extra = excluded_fields(&extra, true);
        assert_eq!(only_extra.into_iter().collect::<Vec<_>>(), vec!["name".to_string()]);
    }

    #[test]
    fn every_row_has_every_column() {
        let catalog = catalog(vec![
            json!({"x": 1}),
            json!({"y": null, "z": [1, 2]}),
            json!({}),
        ]);
        let csv = to_csv(&catalog, None);

        let mut reader = csv::Reader::from_reader(csv.as_bytes());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), vec!["x", "y", "z"]);
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|row| row.len() == 3));
        assert_eq!(rows[1].get(2), Some("[1,2]"));
        assert_eq!(rows[1].get(1), Some(""));
    }

    #[test]
    fn delimiters_and_quotes_are_escaped() {
        let catalog = catalog(vec![json!({"name": "Berg, \"hoch\""})]);
        let csv = to_csv(&catalog, None);
        assert_eq!(csv.lines().nth(1), Some(r#""Berg, ""hoch""""#));
    }

    #[test]
    fn empty_catalog_writes_an_empty_header_line() {
        let csv = to_csv(&Catalog::default(), None);
        assert_eq!(csv, "\n");
        assert!(!csv.contains('"'));
    }

    #[test]
    fn excluding_every_field_keeps_one_empty_line_per_tour() {
        let catalog = catalog(vec![json!({"id": "1"}), json!({"id": "2", "path": "x"})]);
        let excluded: HashSet<String> = ["id", "path"].iter().map(|f| f.to_string()).collect();

        let csv = to_csv(&catalog, Some(&excluded));
        assert_eq!(csv, "\n\n\n");
    }

    #[test]
    fn export_overwrites_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tours.csv");
        fs::write(&path, "stale content that is longer than the export\n".repeat(10)).unwrap();

        let catalog = catalog(vec![json!({"id": "1", "type": "planned"})]);
        export_csv(&catalog, &path, None).unwrap();
        let first = fs::read(&path).unwrap();
        export_csv(&catalog, &path, None).unwrap();
        let second = fs::read(&path).unwrap();

        assert_eq!(first, second);
        assert_eq!(String::from_utf8(first).unwrap().lines().collect::<Vec<_>>(), vec!["id,type", "1,planned"]);
    }
}

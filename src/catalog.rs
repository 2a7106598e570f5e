use crate::errors::CatalogError;
use crate::models::{Category, TourRecord};
use crate::parser;
use crate::debug_eprintln;
use serde::de::IgnoredAny;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// A payload as fetched from the service, before extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPayload {
    /// Tours overview page with embedded bootstrap data.
    Html(String),
    /// JSON API page documents, in page order.
    Pages(Vec<String>),
}

impl RawPayload {
    /// Recognise a payload saved by [`RawPayload::to_saved`]: a JSON array of
    /// page documents, a single page document, or an HTML page.
    pub fn from_saved(text: &str) -> Result<RawPayload, CatalogError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let trimmed = text.trim_start();
        if trimmed.is_empty() {
            return Ok(RawPayload::Pages(Vec::new()));
        }

        if trimmed.starts_with('[') {
            let pages: Vec<Value> = serde_json::from_str(text)
                .map_err(|e| CatalogError::Parse(format!("saved pages are not valid JSON: {}", e)))?;
            let pages = pages
                .into_iter()
                .map(|page| match page {
                    // a page that was not JSON when fetched, kept as text
                    Value::String(raw) => raw,
                    other => other.to_string(),
                })
                .collect();
            return Ok(RawPayload::Pages(pages));
        }

        if trimmed.starts_with('{') {
            return Ok(RawPayload::Pages(vec![text.to_string()]));
        }

        Ok(RawPayload::Html(text.to_string()))
    }

    /// Text for offline replay: the HTML page as is, or the pages as one JSON
    /// array. JSON pages are embedded verbatim, pages that are not JSON are
    /// stored as JSON strings and blank pages are left out, so the array
    /// always parses and replays to the same catalog.
    pub fn to_saved(&self) -> String {
        match self {
            RawPayload::Html(html) => html.clone(),
            RawPayload::Pages(pages) => {
                let entries: Vec<String> = pages
                    .iter()
                    .filter(|page| !page.trim().is_empty())
                    .map(|page| {
                        if serde_json::from_str::<IgnoredAny>(page).is_ok() {
                            page.clone()
                        } else {
                            Value::String(page.clone()).to_string()
                        }
                    })
                    .collect();
                format!("[{}]", entries.join(","))
            }
        }
    }

    /// Default file name for the saved payload.
    pub fn file_name(&self) -> &'static str {
        match self {
            RawPayload::Html(_) => "tours.html",
            RawPayload::Pages(_) => "tours.json",
        }
    }
}

/// What to do with a recorded tour whose `distance` is missing or not numeric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistancePolicy {
    #[default]
    TreatAsZero,
    Strict,
}

/// The tours of one account, plus every field name seen in any of them.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tours: Vec<TourRecord>,
    fields: BTreeSet<String>,
}

/// Union of the keys of every record.
pub fn field_universe(tours: &[TourRecord]) -> BTreeSet<String> {
    tours.iter().fold(BTreeSet::new(), |mut fields, tour| {
        fields.extend(tour.keys().map(str::to_string));
        fields
    })
}

pub fn extract(payload: &RawPayload) -> Result<Catalog, CatalogError> {
    let tours = match payload {
        RawPayload::Html(html) => parser::extract_embedded_tours(html)?,
        RawPayload::Pages(pages) => parser::extract_paged_tours(pages)?,
    };
    Ok(Catalog::from_records(tours))
}

impl Catalog {
    pub fn from_records(tours: Vec<TourRecord>) -> Self {
        let fields = field_universe(&tours);
        Catalog { tours, fields }
    }

    pub fn extract(payload: &RawPayload) -> Result<Self, CatalogError> {
        extract(payload)
    }

    pub fn tours(&self) -> &[TourRecord] {
        &self.tours
    }

    pub fn len(&self) -> usize {
        self.tours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tours.is_empty()
    }

    /// Every field name present in at least one tour, sorted.
    pub fn fields(&self) -> &BTreeSet<String> {
        &self.fields
    }

    pub fn by_category(&self, category: Category) -> impl Iterator<Item = &TourRecord> + '_ {
        self.tours
            .iter()
            .filter(move |tour| tour.category() == Some(category))
    }

    pub fn planned(&self) -> impl Iterator<Item = &TourRecord> + '_ {
        self.by_category(Category::Planned)
    }

    pub fn recorded(&self) -> impl Iterator<Item = &TourRecord> + '_ {
        self.by_category(Category::Recorded)
    }

    /// Tours whose category matches none of the known spellings.
    pub fn uncategorized(&self) -> impl Iterator<Item = &TourRecord> + '_ {
        self.tours.iter().filter(|tour| tour.category().is_none())
    }

    /// Sum of recorded distances in meters.
    pub fn recorded_distance_meters(&self, policy: DistancePolicy) -> Result<f64, CatalogError> {
        let mut total = 0.0;
        for tour in self.recorded() {
            match tour.distance_meters() {
                Some(meters) => total += meters,
                None => {
                    let tour_id = tour.id().unwrap_or_else(|| "?".to_string());
                    if policy == DistancePolicy::Strict {
                        return Err(CatalogError::InvalidDistance {
                            tour_id,
                            value: tour.get("distance").map(Value::to_string),
                        });
                    }
                    debug_eprintln!("Tour {} has no usable distance, counting 0 m", tour_id);
                }
            }
        }
        Ok(total)
    }

    /// One line per category.
    pub fn try_summary(&self, policy: DistancePolicy) -> Result<String, CatalogError> {
        let planned = self.planned().count();
        let recorded = self.recorded().count();
        let kilometers = self.recorded_distance_meters(policy)? / 1000.0;

        Ok(format!(
            "Tours planned: {}\nTours recorded: {} (total distance: {:.0} km)",
            planned, recorded, kilometers
        ))
    }

    /// Summary under `policy` that never withholds the counts: a strict
    /// failure comes back alongside the summary with missing distances as 0,
    /// so callers can report it and still download and export.
    pub fn summary_with_policy(&self, policy: DistancePolicy) -> (String, Option<CatalogError>) {
        match self.try_summary(policy) {
            Ok(summary) => (summary, None),
            Err(e) => (self.summary(), Some(e)),
        }
    }

    /// Summary with missing distances counted as zero.
    pub fn summary(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_summary(DistancePolicy::TreatAsZero) {
            Ok(summary) => f.write_str(&summary),
            Err(_) => Err(fmt::Error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tour(value: Value) -> TourRecord {
        serde_json::from_value(value).unwrap()
    }

    fn shape_b(tours: Value) -> RawPayload {
        RawPayload::Pages(vec![json!({ "_embedded": { "tours": tours } }).to_string()])
    }

    #[test]
    fn prefixed_categories_are_counted_and_summed() {
        let payload = shape_b(json!([
            {"id": "1", "type": "tour_planned"},
            {"id": "2", "type": "tour_recorded", "distance": "1500"}
        ]));
        let catalog = extract(&payload).unwrap();

        assert_eq!(catalog.planned().count(), 1);
        assert_eq!(catalog.recorded().count(), 1);
        assert_eq!(
            catalog.summary(),
            "Tours planned: 1\nTours recorded: 1 (total distance: 2 km)"
        );
    }

    #[test]
    fn unprefixed_categories_from_embedded_page() {
        let html = r#"<script>kmtBoot.setProps("{\"tours\":[{\"id\":1,\"type\":\"planned\"},{\"id\":2,\"type\":\"recorded\",\"distance\":\"40000\"},{\"id\":3,\"type\":\"recorded\",\"distance\":\"2000\"}]}");</script>"#;
        let catalog = extract(&RawPayload::Html(html.to_string())).unwrap();

        assert_eq!(catalog.planned().count(), 1);
        let recorded: Vec<_> = catalog.recorded().filter_map(|t| t.id()).collect();
        assert_eq!(recorded, vec!["2", "3"]);
        assert!(catalog.summary().ends_with("(total distance: 42 km)"));
    }

    #[test]
    fn category_filters_are_repeatable() {
        let catalog = Catalog::from_records(vec![
            tour(json!({"id": "1", "type": "planned"})),
            tour(json!({"id": "2", "type": "tour_recorded"})),
        ]);
        let first: Vec<_> = catalog.recorded().cloned().collect();
        let second: Vec<_> = catalog.recorded().cloned().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn field_universe_ignores_record_order() {
        let a = tour(json!({"a": 1, "b": 2}));
        let b = tour(json!({"b": 3, "c": 4}));
        let c = tour(json!({}));

        let forward = Catalog::from_records(vec![a.clone(), b.clone(), c.clone()]);
        let backward = Catalog::from_records(vec![c, b, a]);

        let expected: BTreeSet<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        assert_eq!(forward.fields(), &expected);
        assert_eq!(backward.fields(), &expected);
    }

    #[test]
    fn empty_payloads_give_empty_catalogs() {
        let catalog = extract(&RawPayload::Pages(Vec::new())).unwrap();
        assert!(catalog.is_empty());
        assert!(catalog.fields().is_empty());
        assert_eq!(
            catalog.summary(),
            "Tours planned: 0\nTours recorded: 0 (total distance: 0 km)"
        );
    }

    #[test]
    fn missing_distance_follows_policy() {
        let catalog = Catalog::from_records(vec![
            tour(json!({"id": "1", "type": "recorded", "distance": "3000"})),
            tour(json!({"id": "2", "type": "recorded", "distance": "n/a"})),
            tour(json!({"id": "3", "type": "recorded"})),
        ]);

        assert_eq!(catalog.recorded_distance_meters(DistancePolicy::TreatAsZero).unwrap(), 3000.0);
        match catalog.try_summary(DistancePolicy::Strict) {
            Err(CatalogError::InvalidDistance { tour_id, value }) => {
                assert_eq!(tour_id, "2");
                assert_eq!(value.as_deref(), Some("\"n/a\""));
            }
            other => panic!("expected InvalidDistance, got {:?}", other),
        }
    }

    #[test]
    fn strict_failure_still_yields_counts() {
        let catalog = Catalog::from_records(vec![
            tour(json!({"id": "1", "type": "recorded", "distance": "3000"})),
            tour(json!({"id": "2", "type": "recorded"})),
        ]);

        let (summary, problem) = catalog.summary_with_policy(DistancePolicy::Strict);
        assert_eq!(summary, "Tours planned: 0\nTours recorded: 2 (total distance: 3 km)");
        assert!(matches!(problem, Some(CatalogError::InvalidDistance { .. })));

        let (_, problem) = catalog.summary_with_policy(DistancePolicy::TreatAsZero);
        assert!(problem.is_none());
    }

    #[test]
    fn unknown_categories_are_neither_planned_nor_recorded() {
        let catalog = Catalog::from_records(vec![
            tour(json!({"id": "1", "type": "highlight"})),
            tour(json!({"id": "2"})),
        ]);
        assert_eq!(catalog.planned().count(), 0);
        assert_eq!(catalog.recorded().count(), 0);
        assert_eq!(catalog.uncategorized().count(), 2);
    }

    #[test]
    fn saved_payloads_replay() {
        let pages = RawPayload::Pages(vec![
            r#"{"_embedded":{"tours":[{"id":"1"}]}}"#.to_string(),
            r#"{"_embedded":{"tours":[{"id":"2"}]}}"#.to_string(),
        ]);
        let saved = pages.to_saved();
        assert_eq!(pages.file_name(), "tours.json");

        let replayed = RawPayload::from_saved(&saved).unwrap();
        assert_eq!(extract(&replayed).unwrap().len(), 2);

        let html = RawPayload::Html("<html></html>".to_string());
        assert_eq!(RawPayload::from_saved(&html.to_saved()).unwrap(), html);
        assert_eq!(RawPayload::from_saved("").unwrap(), RawPayload::Pages(Vec::new()));
    }

    #[test]
    fn blank_pages_do_not_break_the_saved_array() {
        let pages = RawPayload::Pages(vec![
            r#"{"_embedded":{"tours":[{"id":"1"}]}}"#.to_string(),
            String::new(),
            "  ".to_string(),
        ]);
        assert_eq!(extract(&pages).unwrap().len(), 1);

        let replayed = RawPayload::from_saved(&pages.to_saved()).unwrap();
        assert_eq!(extract(&replayed).unwrap().len(), 1);
    }

    #[test]
    fn non_json_pages_replay_to_the_same_failure() {
        let pages = RawPayload::Pages(vec![
            r#"{"_embedded":{"tours":[]}}"#.to_string(),
            "<html>502 Bad Gateway</html>".to_string(),
        ]);
        assert!(matches!(extract(&pages), Err(CatalogError::Parse(_))));

        let replayed = RawPayload::from_saved(&pages.to_saved()).unwrap();
        assert_eq!(replayed, pages);
        assert!(matches!(extract(&replayed), Err(CatalogError::Parse(_))));
    }

    #[test]
    fn byte_order_mark_is_ignored() {
        let saved = "\u{feff}[{\"_embedded\":{\"tours\":[{\"id\":\"1\",\"type\":\"tour_planned\"}]}}]";
        let payload = RawPayload::from_saved(saved).unwrap();
        assert!(matches!(payload, RawPayload::Pages(_)));
        assert_eq!(extract(&payload).unwrap().planned().count(), 1);
    }
}

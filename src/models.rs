use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Logical category of a tour, independent of how the service spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Planned,
    Recorded,
}

/// Every spelling of the `type` discriminator observed so far.
/// A new service version only needs another entry here.
const CATEGORY_SPELLINGS: &[(&str, Category)] = &[
    ("planned", Category::Planned),
    ("tour_planned", Category::Planned),
    ("recorded", Category::Recorded),
    ("tour_recorded", Category::Recorded),
];

/// Field holding the category discriminator.
pub const CATEGORY_FIELD: &str = "type";

impl Category {
    pub fn from_type(raw: &str) -> Option<Category> {
        let raw = raw.trim();
        CATEGORY_SPELLINGS
            .iter()
            .find(|(spelling, _)| spelling.eq_ignore_ascii_case(raw))
            .map(|(_, category)| *category)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Planned => "planned",
            Category::Recorded => "recorded",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tour as delivered by the service.
///
/// The field set is open: schema versions and categories populate
/// different subsets, so the record keeps every key it was given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TourRecord {
    fields: Map<String, Value>,
}

impl From<Map<String, Value>> for TourRecord {
    fn from(fields: Map<String, Value>) -> Self {
        TourRecord { fields }
    }
}

impl TourRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self::from(fields)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Tour id as text; the service has sent it both as string and as number.
    pub fn id(&self) -> Option<String> {
        match self.get("id")? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn category(&self) -> Option<Category> {
        self.get(CATEGORY_FIELD)?.as_str().and_then(Category::from_type)
    }

    /// Distance in meters, accepted as a numeric string or a JSON number.
    pub fn distance_meters(&self) -> Option<f64> {
        let meters = match self.get("distance")? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        meters.filter(|d| d.is_finite())
    }

    /// Calendar date of the tour, as written in its `date` timestamp.
    pub fn date(&self) -> Option<NaiveDate> {
        self.get("date")?.as_str().and_then(parse_tour_date)
    }

    /// Text for one CSV cell. Missing fields and `null` become empty strings.
    pub fn cell(&self, field: &str) -> String {
        self.get(field).map(render_value).unwrap_or_default()
    }
}

pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // nested structures stay as compact JSON
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Parse the timestamp formats seen in tour data into a calendar date.
///
/// The date is taken as written, without converting the offset to UTC:
/// `2019-01-01T23:35:14+01:00` is the 1st of January.
pub fn parse_tour_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }

    let formats = [
        "%Y-%m-%d %H:%M:%S %z",   // 2016-05-22 10:12:23 +0200
        "%Y-%m-%d %H:%M:%S%.f %z", // 2016-05-22 10:12:23.000 +0200
        "%Y-%m-%dT%H:%M:%S%.f%z", // 2016-05-22T10:12:23.000+0200
    ];
    for format in &formats {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Some(dt.date_naive());
        }
    }

    raw.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

//! Raw booking records
//!
//! A `BookingRecord` is an untyped field-name → value map, the shape in which
//! both prediction requests and dataset rows arrive. Typing happens in the
//! encoder and the filter predicates, against the schema.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Accepted date layouts; dataset exports often carry a time suffix.
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// A single raw value as supplied by the UI or a dataset cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Bool(bool),
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl RawValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }

    /// Numeric reading; numeric text is accepted
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RawValue::Number(n) => Some(*n),
            RawValue::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Label reading; whole numbers read as their integer text
    pub fn as_label(&self) -> Option<String> {
        match self {
            RawValue::Text(s) => Some(s.trim().to_string()),
            RawValue::Number(n) if n.fract() == 0.0 && n.is_finite() => {
                Some(format!("{}", *n as i64))
            }
            _ => None,
        }
    }

    /// Flag reading: booleans, 0/1 and the usual spellings
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RawValue::Bool(b) => Some(*b),
            RawValue::Number(n) if *n == 0.0 => Some(false),
            RawValue::Number(n) if *n == 1.0 => Some(true),
            RawValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => Some(true),
                "0" | "false" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Date reading; text in `YYYY-MM-DD` (optionally with a time part)
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            RawValue::Date(d) => Some(*d),
            RawValue::Text(s) => parse_date(s),
            _ => None,
        }
    }

    /// Total order for sorting: null, flags, numbers, dates, then text
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (RawValue::Bool(a), RawValue::Bool(b)) => a.cmp(b),
            (RawValue::Number(a), RawValue::Number(b)) => a.total_cmp(b),
            (RawValue::Date(a), RawValue::Date(b)) => a.cmp(b),
            (RawValue::Text(a), RawValue::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            RawValue::Null => 0,
            RawValue::Bool(_) => 1,
            RawValue::Number(_) => 2,
            RawValue::Date(_) => 3,
            RawValue::Text(_) => 4,
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => f.write_str("null"),
            RawValue::Bool(b) => write!(f, "{b}"),
            RawValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            RawValue::Number(n) => write!(f, "{n}"),
            RawValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            RawValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Number(value as f64)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Bool(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<NaiveDate> for RawValue {
    fn from(value: NaiveDate) -> Self {
        RawValue::Date(value)
    }
}

pub(crate) fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    DATE_FORMATS.iter().find_map(|format| {
        NaiveDate::parse_from_str(text, format)
            .ok()
            .or_else(|| {
                chrono::NaiveDateTime::parse_from_str(text, format)
                    .ok()
                    .map(|dt| dt.date())
            })
    })
}

/// One reservation (prediction input) or one historical row (dataset)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingRecord {
    values: BTreeMap<String, RawValue>,
}

impl BookingRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, field: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<RawValue>) {
        self.values.insert(field.into(), value.into());
    }

    /// Value of a field; explicit nulls read as absent
    pub fn get(&self, field: &str) -> Option<&RawValue> {
        self.values.get(field).filter(|v| !v.is_null())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Build from a JSON object, the shape the UI boundary sends
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

impl<K, V> FromIterator<(K, V)> for BookingRecord
where
    K: Into<String>,
    V: Into<RawValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_object_maps_to_raw_values() {
        let record = BookingRecord::from_json(json!({
            "room_type": "Suite",
            "nights_stayed": 3,
            "holiday_season": true,
            "checkin_date": "2024-07-14",
            "notes": null,
        }))
        .unwrap();

        assert_eq!(record.get("room_type"), Some(&RawValue::Text("Suite".into())));
        assert_eq!(record.get("nights_stayed"), Some(&RawValue::Number(3.0)));
        assert_eq!(record.get("holiday_season"), Some(&RawValue::Bool(true)));
        assert_eq!(
            record.get("checkin_date").and_then(RawValue::as_date),
            NaiveDate::from_ymd_opt(2024, 7, 14)
        );
        assert!(record.get("notes").is_none());
        assert!(!record.contains("notes"));
    }

    #[test]
    fn flags_accept_common_spellings() {
        assert_eq!(RawValue::from(1i64).as_bool(), Some(true));
        assert_eq!(RawValue::from("0").as_bool(), Some(false));
        assert_eq!(RawValue::from("Yes").as_bool(), Some(true));
        assert_eq!(RawValue::from(2i64).as_bool(), None);
    }

    #[test]
    fn dates_accept_time_suffix() {
        let expected = NaiveDate::from_ymd_opt(2023, 1, 5);
        assert_eq!(parse_date("2023-01-05"), expected);
        assert_eq!(parse_date("2023-01-05 00:00:00"), expected);
        assert_eq!(parse_date("05/01/2023"), None);
    }

    #[test]
    fn labels_from_whole_numbers() {
        assert_eq!(RawValue::from(6i64).as_label(), Some("6".to_string()));
        assert_eq!(RawValue::from(6.5).as_label(), None);
    }

    #[test]
    fn ordering_puts_numbers_before_text() {
        let mut values = vec![
            RawValue::from("b"),
            RawValue::from(10i64),
            RawValue::from("a"),
            RawValue::from(2i64),
        ];
        values.sort_by(RawValue::total_cmp);
        assert_eq!(
            values,
            vec![
                RawValue::from(2i64),
                RawValue::from(10i64),
                RawValue::from("a"),
                RawValue::from("b")
            ]
        );
    }

    #[test]
    fn display_prints_integers_without_fraction() {
        assert_eq!(RawValue::from(30i64).to_string(), "30");
        assert_eq!(RawValue::from(4.5).to_string(), "4.5");
    }
}

//! Schema registry: field definitions and the feature layout
//!
//! The schema is part of the model's interface contract. Category order and
//! the explicit column list fix the position of every value in the feature
//! vector, so the layout is declared, never inferred from data, and is
//! fingerprinted so a model artifact can name the layout it was trained on.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{ConfigurationError, FieldError};
use crate::record::RawValue;
use crate::serde_canon::hash_canonical_hex;

/// Semantic type of an input field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Numeric,
    Ordinal,
    Nominal,
    Date,
    Boolean,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Numeric => "numeric",
            FieldKind::Ordinal => "ordinal",
            FieldKind::Nominal => "nominal",
            FieldKind::Date => "date",
            FieldKind::Boolean => "boolean",
        };
        f.write_str(name)
    }
}

/// A category label and the integer it encodes to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub label: String,
    pub code: i64,
}

/// Closed domain of a field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldDomain {
    Range {
        min: Option<f64>,
        max: Option<f64>,
        integer: bool,
    },
    /// Ordered as at training time; order is one-hot column order
    Categories { categories: Vec<Category> },
    DateRange {
        min: Option<NaiveDate>,
        max: Option<NaiveDate>,
    },
    Flag,
}

/// One input field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub domain: FieldDomain,
    /// Used when a record omits the field
    pub default: Option<RawValue>,
}

impl FieldSpec {
    pub fn numeric(name: &str, min: Option<f64>, max: Option<f64>) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Numeric,
            domain: FieldDomain::Range {
                min,
                max,
                integer: false,
            },
            default: None,
        }
    }

    pub fn integer(name: &str, min: i64, max: i64) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Numeric,
            domain: FieldDomain::Range {
                min: Some(min as f64),
                max: Some(max as f64),
                integer: true,
            },
            default: None,
        }
    }

    /// Ordinal category; codes are ranks in declaration order
    pub fn ordinal(name: &str, labels: &[&str]) -> Self {
        let coded: Vec<(&str, i64)> = labels
            .iter()
            .enumerate()
            .map(|(rank, label)| (*label, rank as i64))
            .collect();
        Self::ordinal_with_codes(name, &coded)
    }

    /// Ordinal category with explicit training-time codes
    pub fn ordinal_with_codes(name: &str, coded: &[(&str, i64)]) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Ordinal,
            domain: FieldDomain::Categories {
                categories: coded
                    .iter()
                    .map(|(label, code)| Category {
                        label: label.to_string(),
                        code: *code,
                    })
                    .collect(),
            },
            default: None,
        }
    }

    pub fn nominal(name: &str, labels: &[&str]) -> Self {
        let mut spec = Self::ordinal(name, labels);
        spec.kind = FieldKind::Nominal;
        spec
    }

    pub fn date(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Date,
            domain: FieldDomain::DateRange {
                min: None,
                max: None,
            },
            default: None,
        }
    }

    pub fn boolean(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Boolean,
            domain: FieldDomain::Flag,
            default: None,
        }
    }

    pub fn with_default(mut self, value: impl Into<RawValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_date_range(mut self, min: Option<NaiveDate>, max: Option<NaiveDate>) -> Self {
        self.domain = FieldDomain::DateRange { min, max };
        self
    }

    /// Category entry for a label, if the field is categorical
    pub fn category(&self, label: &str) -> Option<&Category> {
        self.categories().iter().find(|c| c.label == label)
    }

    pub fn categories(&self) -> &[Category] {
        match &self.domain {
            FieldDomain::Categories { categories } => categories,
            _ => &[],
        }
    }

    pub fn labels(&self) -> Vec<String> {
        self.categories().iter().map(|c| c.label.clone()).collect()
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self.kind, FieldKind::Ordinal | FieldKind::Nominal)
    }

    fn check(&self) -> Result<(), ConfigurationError> {
        let invalid = |msg: String| ConfigurationError::InvalidSchema(msg);
        if self.name.trim().is_empty() {
            return Err(invalid("field with empty name".into()));
        }

        match (&self.kind, &self.domain) {
            (FieldKind::Numeric, FieldDomain::Range { min, max, .. }) => {
                if let (Some(min), Some(max)) = (min, max) {
                    if !(min <= max) {
                        return Err(invalid(format!(
                            "field `{}` has empty range [{min}, {max}]",
                            self.name
                        )));
                    }
                }
            }
            (FieldKind::Ordinal | FieldKind::Nominal, FieldDomain::Categories { categories }) => {
                if categories.is_empty() {
                    return Err(invalid(format!("field `{}` has no categories", self.name)));
                }
                let mut labels = HashSet::new();
                let mut codes = HashSet::new();
                for category in categories {
                    if !labels.insert(category.label.as_str()) {
                        return Err(invalid(format!(
                            "field `{}` repeats category `{}`",
                            self.name, category.label
                        )));
                    }
                    if self.kind == FieldKind::Ordinal && !codes.insert(category.code) {
                        return Err(invalid(format!(
                            "field `{}` repeats code {}",
                            self.name, category.code
                        )));
                    }
                }
            }
            (FieldKind::Date, FieldDomain::DateRange { min, max }) => {
                if let (Some(min), Some(max)) = (min, max) {
                    if min > max {
                        return Err(invalid(format!(
                            "field `{}` has empty date range",
                            self.name
                        )));
                    }
                }
            }
            (FieldKind::Boolean, FieldDomain::Flag) => {}
            (kind, _) => {
                return Err(invalid(format!(
                    "field `{}` has a domain that does not fit kind {kind}",
                    self.name
                )))
            }
        }
        Ok(())
    }
}

/// Numeric sub-feature derived from a date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePart {
    /// Monday = 0 .. Sunday = 6
    DayOfWeek,
    Month,
    DayOfMonth,
    DayOfYear,
    Year,
    /// Signed days between the reference date and the field's date
    DaysFromReference,
}

impl DatePart {
    fn suffix(&self) -> &'static str {
        match self {
            DatePart::DayOfWeek => "day_of_week",
            DatePart::Month => "month",
            DatePart::DayOfMonth => "day_of_month",
            DatePart::DayOfYear => "day_of_year",
            DatePart::Year => "year",
            DatePart::DaysFromReference => "days_from_reference",
        }
    }
}

/// Declared transform of one layout entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transform", rename_all = "snake_case")]
pub enum ColumnTransform {
    /// Numeric value in raw units
    Identity,
    /// Category code
    Ordinal,
    /// One indicator column per category, in domain order
    OneHot,
    /// Boolean as 0/1
    Flag,
    DatePart { part: DatePart },
    /// `field * factor / divisor`, both numeric
    ScaledBy { factor: String, divisor: f64 },
}

/// One entry of a schema's declared layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub field: String,
    #[serde(flatten)]
    pub transform: ColumnTransform,
    /// Output column name; defaults to one derived from field and transform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ColumnSpec {
    pub fn new(field: &str, transform: ColumnTransform) -> Self {
        Self {
            field: field.to_string(),
            transform,
            name: None,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }
}

/// How one feature-vector position is computed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "encoding", rename_all = "snake_case")]
pub enum ColumnEncoding {
    PassThrough,
    Ordinal,
    Indicator { label: String },
    Flag,
    DatePart { part: DatePart },
    ScaledBy { factor: String, divisor: f64 },
}

/// One position of the feature vector
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureColumn {
    pub name: String,
    pub field: String,
    pub encoding: ColumnEncoding,
}

/// Ordered, immutable list of feature-vector positions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureLayout {
    columns: Vec<FeatureColumn>,
    fingerprint: String,
}

impl FeatureLayout {
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Blake3 hash of the canonical column list
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Fields read by the encoder, in first-use order, including scale factors
    pub fn required_fields(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut fields = Vec::new();
        for column in &self.columns {
            if seen.insert(column.field.as_str()) {
                fields.push(column.field.as_str());
            }
            if let ColumnEncoding::ScaledBy { factor, .. } = &column.encoding {
                if seen.insert(factor.as_str()) {
                    fields.push(factor.as_str());
                }
            }
        }
        fields
    }

    /// Position range of each one-hot block, keyed by source field
    pub fn one_hot_blocks(&self) -> Vec<(&str, std::ops::Range<usize>)> {
        let mut blocks: Vec<(&str, std::ops::Range<usize>)> = Vec::new();
        for (idx, column) in self.columns.iter().enumerate() {
            if !matches!(column.encoding, ColumnEncoding::Indicator { .. }) {
                continue;
            }
            match blocks.last_mut() {
                Some((field, range)) if *field == column.field && range.end == idx => {
                    range.end = idx + 1;
                }
                _ => blocks.push((column.field.as_str(), idx..idx + 1)),
            }
        }
        blocks
    }
}

/// Serialized field definition (TOML schema artifacts)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub integer: bool,
    #[serde(default)]
    pub categories: Vec<String>,
    /// Explicit ordinal codes, parallel to `categories`
    #[serde(default)]
    pub codes: Option<Vec<i64>>,
    #[serde(default)]
    pub min_date: Option<NaiveDate>,
    #[serde(default)]
    pub max_date: Option<NaiveDate>,
    #[serde(default)]
    pub default: Option<RawValue>,
}

impl FieldDefinition {
    fn into_spec(self) -> Result<FieldSpec, ConfigurationError> {
        let domain = match self.kind {
            FieldKind::Numeric => FieldDomain::Range {
                min: self.min,
                max: self.max,
                integer: self.integer,
            },
            FieldKind::Ordinal | FieldKind::Nominal => {
                let codes: Vec<i64> = match self.codes {
                    Some(codes) => {
                        if codes.len() != self.categories.len() {
                            return Err(ConfigurationError::InvalidSchema(format!(
                                "field `{}` declares {} codes for {} categories",
                                self.name,
                                codes.len(),
                                self.categories.len()
                            )));
                        }
                        codes
                    }
                    None => (0..self.categories.len() as i64).collect(),
                };
                FieldDomain::Categories {
                    categories: self
                        .categories
                        .into_iter()
                        .zip(codes)
                        .map(|(label, code)| Category { label, code })
                        .collect(),
                }
            }
            FieldKind::Date => FieldDomain::DateRange {
                min: self.min_date,
                max: self.max_date,
            },
            FieldKind::Boolean => FieldDomain::Flag,
        };

        Ok(FieldSpec {
            name: self.name,
            kind: self.kind,
            domain,
            default: self.default,
        })
    }
}

/// Serialized schema artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub name: String,
    pub version: String,
    pub fields: Vec<FieldDefinition>,
    pub layout: Vec<ColumnSpec>,
}

/// Field registry plus the memoized feature layout
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    version: String,
    fields: Vec<FieldSpec>,
    index: HashMap<String, usize>,
    layout: FeatureLayout,
}

impl Schema {
    /// Build and check a schema; the layout is resolved once here
    pub fn new(
        name: &str,
        version: &str,
        fields: Vec<FieldSpec>,
        columns: Vec<ColumnSpec>,
    ) -> Result<Self, ConfigurationError> {
        let mut index = HashMap::with_capacity(fields.len());
        for (pos, field) in fields.iter().enumerate() {
            field.check()?;
            if index.insert(field.name.clone(), pos).is_some() {
                return Err(ConfigurationError::InvalidSchema(format!(
                    "field `{}` declared twice",
                    field.name
                )));
            }
        }

        let layout = build_layout(&fields, &index, &columns)?;
        debug!(
            schema = name,
            width = layout.width(),
            fingerprint = %layout.fingerprint,
            "feature layout resolved"
        );

        Ok(Self {
            name: name.to_string(),
            version: version.to_string(),
            fields,
            index,
            layout,
        })
    }

    pub fn from_definition(definition: SchemaDefinition) -> Result<Self, ConfigurationError> {
        let fields = definition
            .fields
            .into_iter()
            .map(FieldDefinition::into_spec)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(
            &definition.name,
            &definition.version,
            fields,
            definition.layout,
        )
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigurationError> {
        let definition: SchemaDefinition = toml::from_str(content).map_err(|e| {
            ConfigurationError::InvalidSchema(format!("failed to parse schema: {e}"))
        })?;
        Self::from_definition(definition)
    }

    /// Load a TOML schema artifact
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        info!("Loading schema from: {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::InvalidSchema(format!(
                "failed to read schema file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.index.get(name).map(|&pos| &self.fields[pos])
    }

    pub fn resolve(&self, name: &str) -> Result<&FieldSpec, FieldError> {
        self.field(name).ok_or_else(|| FieldError::UnknownField {
            field: name.to_string(),
        })
    }

    pub fn layout(&self) -> &FeatureLayout {
        &self.layout
    }

    /// Hotel booking schema matching the revenue model's training frame
    pub fn hotel_bookings() -> Result<Self, ConfigurationError> {
        use ColumnTransform::{Flag, Identity, Ordinal};

        let fields = vec![
            FieldSpec::ordinal("room_type", &["Deluxe", "Double", "Single", "Suite"]),
            FieldSpec::ordinal("customer_segment", &["Business", "Group", "Leisure", "Solo"]),
            FieldSpec::integer("nights_stayed", 1, 30),
            FieldSpec::integer("booking_lead_time", 0, 365),
            FieldSpec::numeric("occupancy_rate", Some(0.0), Some(100.0)),
            FieldSpec::numeric("room_price", Some(50.0), Some(1000.0)),
            FieldSpec::numeric("discount_applied", Some(0.0), Some(500.0)),
            FieldSpec::ordinal("season", &["Spring", "Summer", "Autumn", "Winter"]),
            FieldSpec::ordinal(
                "day_of_week",
                &[
                    "Monday",
                    "Tuesday",
                    "Wednesday",
                    "Thursday",
                    "Friday",
                    "Saturday",
                    "Sunday",
                ],
            ),
            FieldSpec::ordinal(
                "event_type",
                &["None", "Conference", "Festival", "Exhibition"],
            ),
            FieldSpec::numeric("competitor_price", Some(50.0), Some(1000.0)),
            FieldSpec::numeric("demand_index", Some(0.0), None).with_default(1.0),
            FieldSpec::boolean("cancellation_flag"),
            FieldSpec::ordinal("payment_method", &["Cash", "Online", "Credit Card"]),
            FieldSpec::numeric("customer_rating", Some(1.0), Some(5.0)),
            FieldSpec::ordinal_with_codes(
                "extra_services",
                &[
                    ("None", -1),
                    ("Spa", 0),
                    ("Breakfast", 1),
                    ("Dinner", 2),
                    ("All", 3),
                ],
            ),
            FieldSpec::boolean("holiday_season"),
            FieldSpec::numeric("marketing_spend", Some(0.0), Some(10_000.0)),
            FieldSpec::ordinal("customer_feedback", &["Negative", "Neutral", "Positive"]),
            FieldSpec::boolean("special_event"),
            FieldSpec::integer("booking_month", 1, 12),
            FieldSpec::numeric("avg_daily_rate", Some(50.0), Some(1000.0)),
            // dataset-only fields
            FieldSpec::numeric("total_revenue", Some(0.0), None),
            FieldSpec::date("checkin_date"),
        ];

        let columns = vec![
            ColumnSpec::new("room_type", Ordinal),
            ColumnSpec::new("customer_segment", Ordinal),
            ColumnSpec::new("nights_stayed", Identity),
            ColumnSpec::new("booking_lead_time", Identity),
            ColumnSpec::new("occupancy_rate", Identity),
            ColumnSpec::new("room_price", Identity),
            ColumnSpec::new("discount_applied", Identity),
            ColumnSpec::new("season", Ordinal),
            ColumnSpec::new("day_of_week", Ordinal),
            ColumnSpec::new("event_type", Ordinal),
            ColumnSpec::new("competitor_price", Identity),
            ColumnSpec::new("demand_index", Identity),
            ColumnSpec::new("cancellation_flag", Flag),
            ColumnSpec::new("payment_method", Ordinal),
            ColumnSpec::new("customer_rating", Identity),
            ColumnSpec::new("extra_services", Ordinal),
            ColumnSpec::new("holiday_season", Flag),
            ColumnSpec::new(
                "room_price",
                ColumnTransform::ScaledBy {
                    factor: "occupancy_rate".into(),
                    divisor: 100.0,
                },
            )
            .named("final_price"),
            ColumnSpec::new("marketing_spend", Identity),
            ColumnSpec::new("customer_feedback", Ordinal),
            ColumnSpec::new("special_event", Flag),
            ColumnSpec::new("booking_month", Identity),
            ColumnSpec::new("avg_daily_rate", Identity),
        ];

        Self::new("hotel_bookings", "1", fields, columns)
    }
}

fn build_layout(
    fields: &[FieldSpec],
    index: &HashMap<String, usize>,
    columns: &[ColumnSpec],
) -> Result<FeatureLayout, ConfigurationError> {
    let invalid = |msg: String| ConfigurationError::InvalidSchema(msg);
    let lookup = |name: &str| {
        index
            .get(name)
            .map(|&pos| &fields[pos])
            .ok_or_else(|| invalid(format!("layout references unknown field `{name}`")))
    };

    let mut resolved = Vec::new();
    let mut one_hot_seen = HashSet::new();

    for spec in columns {
        let field = lookup(&spec.field)?;
        let mismatch = |transform: &str| {
            invalid(format!(
                "transform `{transform}` does not apply to {} field `{}`",
                field.kind, field.name
            ))
        };
        let column = |name: String, encoding: ColumnEncoding| FeatureColumn {
            name,
            field: field.name.clone(),
            encoding,
        };

        match &spec.transform {
            ColumnTransform::Identity => {
                if field.kind != FieldKind::Numeric {
                    return Err(mismatch("identity"));
                }
                let name = spec.name.clone().unwrap_or_else(|| field.name.clone());
                resolved.push(column(name, ColumnEncoding::PassThrough));
            }
            ColumnTransform::Ordinal => {
                if field.kind != FieldKind::Ordinal {
                    return Err(mismatch("ordinal"));
                }
                let name = spec.name.clone().unwrap_or_else(|| field.name.clone());
                resolved.push(column(name, ColumnEncoding::Ordinal));
            }
            ColumnTransform::OneHot => {
                if field.kind != FieldKind::Nominal {
                    return Err(mismatch("one_hot"));
                }
                if !one_hot_seen.insert(field.name.as_str()) {
                    return Err(invalid(format!(
                        "field `{}` is one-hot expanded twice",
                        field.name
                    )));
                }
                for category in field.categories() {
                    resolved.push(column(
                        format!("{}={}", field.name, category.label),
                        ColumnEncoding::Indicator {
                            label: category.label.clone(),
                        },
                    ));
                }
            }
            ColumnTransform::Flag => {
                if field.kind != FieldKind::Boolean {
                    return Err(mismatch("flag"));
                }
                let name = spec.name.clone().unwrap_or_else(|| field.name.clone());
                resolved.push(column(name, ColumnEncoding::Flag));
            }
            ColumnTransform::DatePart { part } => {
                if field.kind != FieldKind::Date {
                    return Err(mismatch("date_part"));
                }
                let name = spec
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("{}.{}", field.name, part.suffix()));
                resolved.push(column(name, ColumnEncoding::DatePart { part: *part }));
            }
            ColumnTransform::ScaledBy { factor, divisor } => {
                if field.kind != FieldKind::Numeric {
                    return Err(mismatch("scaled_by"));
                }
                if lookup(factor)?.kind != FieldKind::Numeric {
                    return Err(invalid(format!(
                        "scale factor `{factor}` of `{}` must be numeric",
                        field.name
                    )));
                }
                if *divisor == 0.0 || !divisor.is_finite() {
                    return Err(invalid(format!(
                        "scale divisor of `{}` must be finite and non-zero",
                        field.name
                    )));
                }
                let name = spec
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("{}*{}", field.name, factor));
                resolved.push(column(
                    name,
                    ColumnEncoding::ScaledBy {
                        factor: factor.clone(),
                        divisor: *divisor,
                    },
                ));
            }
        }
    }

    if resolved.is_empty() {
        return Err(invalid("feature layout is empty".into()));
    }

    let mut names = HashSet::new();
    for column in &resolved {
        if !names.insert(column.name.as_str()) {
            return Err(invalid(format!("duplicate column name `{}`", column.name)));
        }
    }

    let fingerprint = hash_canonical_hex(&resolved)
        .map_err(|e| invalid(format!("failed to fingerprint layout: {e}")))?;

    Ok(FeatureLayout {
        columns: resolved,
        fingerprint,
    })
}

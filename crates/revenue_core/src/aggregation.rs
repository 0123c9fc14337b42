//! KPI aggregation over filtered booking rows
//!
//! A `FilterSpec` is an AND-only list of per-field predicates. The engine
//! checks it against the schema, selects the matching rows of a dataset
//! snapshot and reduces them to a `KpiResult`. Rows are never copied or
//! modified; results borrow from the snapshot.
//!
//! Null or absent values never satisfy a bounded predicate. A range with no
//! bounds is trivial and matches every row.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::Dataset;
use crate::errors::{ConfigurationError, FieldError, ValidationErrors};
use crate::record::{BookingRecord, RawValue};
use crate::schema::{FieldKind, Schema};
use crate::serde_canon::{hash_canonical_hex, CanonicalError};

/// Constraint on one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    /// Inclusive numeric range; a missing bound is open
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    /// Inclusive date range; a missing bound is open
    DateRange {
        #[serde(default)]
        from: Option<NaiveDate>,
        #[serde(default)]
        to: Option<NaiveDate>,
    },
    /// Membership in a set of labels or numbers
    OneOf { values: Vec<RawValue> },
    Flag { value: bool },
}

impl Predicate {
    pub fn name(&self) -> &'static str {
        match self {
            Predicate::Range { .. } => "range",
            Predicate::DateRange { .. } => "date_range",
            Predicate::OneOf { .. } => "one_of",
            Predicate::Flag { .. } => "flag",
        }
    }

    /// Matches every row, nulls included
    pub fn is_trivial(&self) -> bool {
        matches!(
            self,
            Predicate::Range {
                min: None,
                max: None
            } | Predicate::DateRange {
                from: None,
                to: None
            }
        )
    }

    fn applies_to(&self, kind: FieldKind) -> bool {
        match self {
            Predicate::Range { .. } => kind == FieldKind::Numeric,
            Predicate::DateRange { .. } => kind == FieldKind::Date,
            Predicate::OneOf { .. } => kind != FieldKind::Date,
            Predicate::Flag { .. } => kind == FieldKind::Boolean,
        }
    }

    pub fn matches(&self, value: Option<&RawValue>) -> bool {
        if self.is_trivial() {
            return true;
        }
        let Some(value) = value else {
            return false;
        };

        match self {
            Predicate::Range { min, max } => value.as_f64().is_some_and(|v| {
                min.map_or(true, |m| v >= m) && max.map_or(true, |m| v <= m)
            }),
            Predicate::DateRange { from, to } => value.as_date().is_some_and(|d| {
                from.map_or(true, |f| d >= f) && to.map_or(true, |t| d <= t)
            }),
            Predicate::OneOf { values } => values.iter().any(|lit| same_literal(value, lit)),
            Predicate::Flag { value: wanted } => value.as_bool() == Some(*wanted),
        }
    }
}

fn same_literal(cell: &RawValue, literal: &RawValue) -> bool {
    if let (Some(a), Some(b)) = (cell.as_f64(), literal.as_f64()) {
        return a == b;
    }
    if let (Some(a), Some(b)) = (cell.as_label(), literal.as_label()) {
        return a == b;
    }
    match (cell.as_bool(), literal.as_bool()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// A predicate bound to a field name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPredicate {
    pub field: String,
    #[serde(flatten)]
    pub predicate: Predicate,
}

/// Booking status selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    #[default]
    All,
    Cancelled,
    Completed,
}

/// Conjunction of field predicates; empty matches everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    #[serde(default)]
    pub predicates: Vec<FieldPredicate>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, predicate: Predicate) -> Self {
        self.predicates.push(FieldPredicate {
            field: field.to_string(),
            predicate,
        });
        self
    }

    pub fn range(self, field: &str, min: Option<f64>, max: Option<f64>) -> Self {
        self.with(field, Predicate::Range { min, max })
    }

    pub fn at_most(self, field: &str, max: f64) -> Self {
        self.range(field, None, Some(max))
    }

    pub fn at_least(self, field: &str, min: f64) -> Self {
        self.range(field, Some(min), None)
    }

    pub fn date_range(self, field: &str, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.with(field, Predicate::DateRange { from, to })
    }

    pub fn one_of<V: Into<RawValue>>(
        self,
        field: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.with(
            field,
            Predicate::OneOf {
                values: values.into_iter().map(Into::into).collect(),
            },
        )
    }

    pub fn flag(self, field: &str, value: bool) -> Self {
        self.with(field, Predicate::Flag { value })
    }

    /// Restrict by booking status through the cancellation flag field
    pub fn status(self, field: &str, status: BookingStatus) -> Self {
        match status {
            BookingStatus::All => self,
            BookingStatus::Cancelled => self.flag(field, true),
            BookingStatus::Completed => self.flag(field, false),
        }
    }

    /// Copy without the predicates on `field`
    pub fn without(&self, field: &str) -> Self {
        Self {
            predicates: self
                .predicates
                .iter()
                .filter(|p| p.field != field)
                .cloned()
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn matches(&self, row: &BookingRecord) -> bool {
        self.predicates
            .iter()
            .all(|p| p.predicate.matches(row.get(&p.field)))
    }

    /// Canonical hash; with the dataset version it keys cached KPI results
    pub fn fingerprint(&self) -> Result<String, CanonicalError> {
        hash_canonical_hex(self)
    }
}

/// Summary statistics over a row set
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct KpiResult {
    pub row_count: usize,
    pub total_revenue: f64,
    pub avg_revenue: f64,
    pub avg_lead_time: f64,
    pub avg_daily_rate: f64,
    pub cancelled_count: usize,
    pub cancellation_rate: f64,
}

/// Fields the KPIs are computed from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricFields {
    pub revenue: String,
    pub lead_time: String,
    pub daily_rate: String,
    pub cancellation: String,
}

impl Default for MetricFields {
    fn default() -> Self {
        Self {
            revenue: "total_revenue".to_string(),
            lead_time: "booking_lead_time".to_string(),
            daily_rate: "avg_daily_rate".to_string(),
            cancellation: "cancellation_flag".to_string(),
        }
    }
}

/// KPIs of one group of a breakdown
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub key: RawValue,
    pub kpis: KpiResult,
}

/// KPIs of one calendar month
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthSummary {
    /// `YYYY-MM`
    pub month: String,
    pub kpis: KpiResult,
}

/// Mean of one field over a calendar month; `None` when no row carried it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyValue {
    /// `YYYY-MM`
    pub month: String,
    pub value: Option<f64>,
}

/// Rows matching a filter plus their KPIs
#[derive(Debug, Clone, Serialize)]
pub struct FilteredView<'d> {
    pub rows: Vec<&'d BookingRecord>,
    pub kpis: KpiResult,
}

#[derive(Debug, Clone, Copy, Default)]
struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    fn push(&mut self, value: Option<f64>) {
        if let Some(v) = value.filter(|v| v.is_finite()) {
            self.sum += v;
            self.count += 1;
        }
    }

    fn value(&self) -> f64 {
        self.checked().unwrap_or(0.0)
    }

    fn checked(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Sort wrapper so breakdown keys order deterministically
#[derive(Debug, Clone)]
struct GroupKey(RawValue);

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GroupKey {}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Clone)]
pub struct AggregationEngine {
    schema: Arc<Schema>,
    metrics: MetricFields,
}

impl AggregationEngine {
    /// Engine using the hotel metric fields
    pub fn new(schema: Arc<Schema>) -> Result<Self, ConfigurationError> {
        Self::with_metrics(schema, MetricFields::default())
    }

    pub fn with_metrics(
        schema: Arc<Schema>,
        metrics: MetricFields,
    ) -> Result<Self, ConfigurationError> {
        let expect = |field: &str, kind: FieldKind| match schema.field(field) {
            Some(spec) if spec.kind == kind => Ok(()),
            Some(spec) => Err(ConfigurationError::InvalidConfig(format!(
                "metric field `{field}` is {}, expected {kind}",
                spec.kind
            ))),
            None => Err(ConfigurationError::InvalidConfig(format!(
                "metric field `{field}` is not in schema `{}`",
                schema.name()
            ))),
        };
        expect(&metrics.revenue, FieldKind::Numeric)?;
        expect(&metrics.lead_time, FieldKind::Numeric)?;
        expect(&metrics.daily_rate, FieldKind::Numeric)?;
        expect(&metrics.cancellation, FieldKind::Boolean)?;

        Ok(Self { schema, metrics })
    }

    pub fn metrics(&self) -> &MetricFields {
        &self.metrics
    }

    /// Check every predicate against the schema
    pub fn validate_filter(&self, spec: &FilterSpec) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        for p in &spec.predicates {
            match self.schema.resolve(&p.field) {
                Err(e) => errors.push(e),
                Ok(field) if !p.predicate.applies_to(field.kind) => {
                    errors.push(FieldError::IncompatiblePredicate {
                        field: p.field.clone(),
                        predicate: p.predicate.name().to_string(),
                        kind: field.kind.to_string(),
                    })
                }
                Ok(_) => {}
            }
        }
        errors.into_result()
    }

    /// Rows of `dataset` matching every predicate, in dataset order
    pub fn filter<'d>(
        &self,
        dataset: &'d Dataset,
        spec: &FilterSpec,
    ) -> Result<Vec<&'d BookingRecord>, ValidationErrors> {
        self.validate_filter(spec)?;
        let rows: Vec<&BookingRecord> = dataset
            .rows()
            .iter()
            .filter(|r| spec.matches(r))
            .collect();
        debug!(
            predicates = spec.len(),
            matched = rows.len(),
            total = dataset.len(),
            "filter applied"
        );
        Ok(rows)
    }

    pub fn summarize(&self, rows: &[&BookingRecord]) -> KpiResult {
        let mut revenue = Mean::default();
        let mut lead_time = Mean::default();
        let mut daily_rate = Mean::default();
        let mut cancelled = 0usize;

        for row in rows {
            revenue.push(number(row, &self.metrics.revenue));
            lead_time.push(number(row, &self.metrics.lead_time));
            daily_rate.push(number(row, &self.metrics.daily_rate));
            if row
                .get(&self.metrics.cancellation)
                .and_then(RawValue::as_bool)
                .unwrap_or(false)
            {
                cancelled += 1;
            }
        }

        let row_count = rows.len();
        KpiResult {
            row_count,
            total_revenue: revenue.sum,
            avg_revenue: revenue.value(),
            avg_lead_time: lead_time.value(),
            avg_daily_rate: daily_rate.value(),
            cancelled_count: cancelled,
            cancellation_rate: if row_count == 0 {
                0.0
            } else {
                cancelled as f64 / row_count as f64
            },
        }
    }

    /// Filter then summarize
    pub fn aggregate<'d>(
        &self,
        dataset: &'d Dataset,
        spec: &FilterSpec,
    ) -> Result<FilteredView<'d>, ValidationErrors> {
        let rows = self.filter(dataset, spec)?;
        let kpis = self.summarize(&rows);
        Ok(FilteredView { rows, kpis })
    }

    /// KPIs per distinct value of `field`, keys ascending; rows without a value are skipped
    pub fn group_by(
        &self,
        rows: &[&BookingRecord],
        field: &str,
    ) -> Result<Vec<GroupSummary>, FieldError> {
        self.schema.resolve(field)?;

        let mut groups: BTreeMap<GroupKey, Vec<&BookingRecord>> = BTreeMap::new();
        for &row in rows {
            if let Some(value) = row.get(field) {
                groups.entry(GroupKey(value.clone())).or_default().push(row);
            }
        }

        Ok(groups
            .into_iter()
            .map(|(key, members)| GroupSummary {
                key: key.0,
                kpis: self.summarize(&members),
            })
            .collect())
    }

    /// KPIs per calendar month of a date field, chronological.
    ///
    /// Every month between the first and last dated row is present; months
    /// without bookings carry zeroed KPIs.
    pub fn group_by_month(
        &self,
        rows: &[&BookingRecord],
        field: &str,
    ) -> Result<Vec<MonthSummary>, FieldError> {
        let buckets = self.month_buckets(rows, field)?;
        Ok(buckets
            .into_iter()
            .map(|(month, members)| MonthSummary {
                month: month_label(month),
                kpis: self.summarize(&members),
            })
            .collect())
    }

    /// Monthly mean of a numeric field, bucketed by a date field.
    ///
    /// Months are contiguous as in `group_by_month`; a month whose rows carry
    /// no value for `value_field` yields `None` rather than 0 so a price chart
    /// shows a gap instead of a drop.
    pub fn monthly_field_mean(
        &self,
        rows: &[&BookingRecord],
        date_field: &str,
        value_field: &str,
    ) -> Result<Vec<MonthlyValue>, FieldError> {
        require_kind(&self.schema, value_field, FieldKind::Numeric, "number")?;
        let buckets = self.month_buckets(rows, date_field)?;
        Ok(buckets
            .into_iter()
            .map(|(month, members)| {
                let mut mean = Mean::default();
                for row in members {
                    mean.push(number(row, value_field));
                }
                MonthlyValue {
                    month: month_label(month),
                    value: mean.checked(),
                }
            })
            .collect())
    }

    fn month_buckets<'r>(
        &self,
        rows: &[&'r BookingRecord],
        field: &str,
    ) -> Result<BTreeMap<(i32, u32), Vec<&'r BookingRecord>>, FieldError> {
        require_kind(&self.schema, field, FieldKind::Date, "date")?;

        let mut months: BTreeMap<(i32, u32), Vec<&BookingRecord>> = BTreeMap::new();
        for &row in rows {
            if let Some(date) = row.get(field).and_then(RawValue::as_date) {
                months
                    .entry((date.year(), date.month()))
                    .or_default()
                    .push(row);
            }
        }

        let span = months
            .keys()
            .next()
            .copied()
            .zip(months.keys().next_back().copied());
        if let Some((mut month, last)) = span {
            while month < last {
                month = next_month(month);
                months.entry(month).or_default();
            }
        }
        Ok(months)
    }

    /// Mean of a numeric field over rows that carry it; 0 when none do
    pub fn field_mean(&self, rows: &[&BookingRecord], field: &str) -> Result<f64, FieldError> {
        require_kind(&self.schema, field, FieldKind::Numeric, "number")?;

        let mut mean = Mean::default();
        for row in rows {
            mean.push(number(row, field));
        }
        Ok(mean.value())
    }

    /// `dataset-version:filter-fingerprint`
    pub fn cache_key(
        &self,
        dataset: &Dataset,
        spec: &FilterSpec,
    ) -> Result<String, CanonicalError> {
        Ok(format!("{}:{}", dataset.version(), spec.fingerprint()?))
    }
}

fn number(row: &BookingRecord, field: &str) -> Option<f64> {
    row.get(field).and_then(RawValue::as_f64)
}

fn require_kind(
    schema: &Schema,
    field: &str,
    kind: FieldKind,
    expected: &str,
) -> Result<(), FieldError> {
    let spec = schema.resolve(field)?;
    if spec.kind != kind {
        return Err(FieldError::TypeMismatch {
            field: field.to_string(),
            expected: expected.to_string(),
            found: spec.kind.to_string(),
        });
    }
    Ok(())
}

fn next_month((year, month): (i32, u32)) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

fn month_label((year, month): (i32, u32)) -> String {
    format!("{year:04}-{month:02}")
}

//! Feature encoding
//!
//! Turns a raw `BookingRecord` into the exact numeric vector the model was
//! trained on. Every value is checked against its closed domain first; a
//! record that fails any check never produces a vector.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate, Utc};
use serde::Serialize;
use tracing::debug;

use crate::errors::{FieldError, ValidationErrors};
use crate::fixed::Fixed;
use crate::record::{BookingRecord, RawValue};
use crate::schema::{ColumnEncoding, DatePart, FieldDomain, FieldKind, FieldSpec, Schema};

/// Ordered fixed-point model input, one value per layout column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureVector {
    values: Vec<Fixed>,
}

impl FeatureVector {
    pub fn new(values: Vec<Fixed>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Fixed] {
        &self.values
    }

    pub fn get(&self, position: usize) -> Option<Fixed> {
        self.values.get(position).copied()
    }

    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.values.iter().map(|v| v.to_f64()).collect()
    }
}

/// A raw value read as its field's kind and checked against the domain
#[derive(Debug, Clone, PartialEq)]
enum TypedValue {
    Number(f64),
    Category { label: String, code: i64 },
    Date(NaiveDate),
    Flag(bool),
}

/// Record → feature vector, against one schema
#[derive(Debug, Clone)]
pub struct FeatureEncoder<'a> {
    schema: &'a Schema,
    reference_date: NaiveDate,
}

impl<'a> FeatureEncoder<'a> {
    /// Encoder whose reference "today" is the current UTC date
    pub fn new(schema: &'a Schema) -> Self {
        Self {
            schema,
            reference_date: Utc::now().date_naive(),
        }
    }

    pub fn with_reference_date(mut self, reference_date: NaiveDate) -> Self {
        self.reference_date = reference_date;
        self
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.reference_date
    }

    /// Check every field the layout reads; all problems are reported at once
    pub fn validate(&self, record: &BookingRecord) -> Result<(), ValidationErrors> {
        self.typed_values(record).map(|_| ())
    }

    /// Produce the feature vector in layout order
    pub fn encode(&self, record: &BookingRecord) -> Result<FeatureVector, ValidationErrors> {
        let typed = self.typed_values(record)?;
        let layout = self.schema.layout();

        let mut values = Vec::with_capacity(layout.width());
        for column in layout.columns() {
            let value = typed
                .get(column.field.as_str())
                .ok_or_else(|| missing(&column.field))?;

            let encoded = match (&column.encoding, value) {
                (ColumnEncoding::PassThrough, TypedValue::Number(n)) => Fixed::from_f64(*n),
                (ColumnEncoding::Ordinal, TypedValue::Category { code, .. }) => {
                    Fixed::from_int(*code)
                }
                (
                    ColumnEncoding::Indicator { label },
                    TypedValue::Category { label: actual, .. },
                ) => indicator(label == actual),
                (ColumnEncoding::Flag, TypedValue::Flag(flag)) => indicator(*flag),
                (ColumnEncoding::DatePart { part }, TypedValue::Date(date)) => {
                    Fixed::from_int(self.date_part(*date, *part))
                }
                (ColumnEncoding::ScaledBy { factor, divisor }, TypedValue::Number(n)) => {
                    let f = match typed.get(factor.as_str()) {
                        Some(TypedValue::Number(f)) => f,
                        _ => return Err(missing(factor).into()),
                    };
                    let product = n * f / divisor;
                    Fixed::checked_from_f64(product).ok_or_else(|| FieldError::OutOfRange {
                        field: column.field.clone(),
                        value: product.to_string(),
                        min: format!("-{}", Fixed::max_f64()),
                        max: Fixed::max_f64().to_string(),
                    })?
                }
                (_, other) => {
                    return Err(FieldError::TypeMismatch {
                        field: column.field.clone(),
                        expected: format!("{:?}", column.encoding),
                        found: format!("{other:?}"),
                    }
                    .into())
                }
            };
            values.push(encoded);
        }

        debug!(width = values.len(), "record encoded");
        Ok(FeatureVector::new(values))
    }

    fn date_part(&self, date: NaiveDate, part: DatePart) -> i64 {
        match part {
            DatePart::DayOfWeek => date.weekday().num_days_from_monday() as i64,
            DatePart::Month => date.month() as i64,
            DatePart::DayOfMonth => date.day() as i64,
            DatePart::DayOfYear => date.ordinal() as i64,
            DatePart::Year => date.year() as i64,
            DatePart::DaysFromReference => (date - self.reference_date).num_days(),
        }
    }

    fn typed_values(
        &self,
        record: &BookingRecord,
    ) -> Result<HashMap<&'a str, TypedValue>, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let mut typed = HashMap::new();

        for name in self.schema.layout().required_fields() {
            let spec = match self.schema.resolve(name) {
                Ok(spec) => spec,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };

            let raw = match record.get(name).or(spec.default.as_ref()) {
                Some(raw) => raw,
                None => {
                    errors.push(missing(name));
                    continue;
                }
            };

            match check_value(spec, raw) {
                Ok(value) => {
                    typed.insert(spec.name.as_str(), value);
                }
                Err(e) => errors.push(e),
            }
        }

        errors.into_result().map(|_| typed)
    }
}

fn missing(field: &str) -> FieldError {
    FieldError::MissingField {
        field: field.to_string(),
    }
}

fn indicator(on: bool) -> Fixed {
    if on {
        Fixed::ONE
    } else {
        Fixed::ZERO
    }
}

fn bound<T: ToString>(value: &Option<T>, open: &str) -> String {
    value
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| open.to_string())
}

fn type_mismatch(spec: &FieldSpec, expected: &str, raw: &RawValue) -> FieldError {
    FieldError::TypeMismatch {
        field: spec.name.clone(),
        expected: expected.to_string(),
        found: raw.to_string(),
    }
}

/// Read `raw` as the field's kind and check it against the closed domain
fn check_value(spec: &FieldSpec, raw: &RawValue) -> Result<TypedValue, FieldError> {
    match spec.kind {
        FieldKind::Numeric => {
            let n = raw
                .as_f64()
                .filter(|n| n.is_finite())
                .ok_or_else(|| type_mismatch(spec, "number", raw))?;

            if let FieldDomain::Range { min, max, integer } = &spec.domain {
                if *integer && n.fract() != 0.0 {
                    return Err(type_mismatch(spec, "whole number", raw));
                }
                let below = min.map(|m| n < m).unwrap_or(false);
                let above = max.map(|m| n > m).unwrap_or(false);
                if below || above {
                    return Err(FieldError::OutOfRange {
                        field: spec.name.clone(),
                        value: raw.to_string(),
                        min: bound(min, "-inf"),
                        max: bound(max, "inf"),
                    });
                }
                // Fixed-point saturation would pass a different number to the model
                if Fixed::checked_from_f64(n).is_none() {
                    let limit = Fixed::max_f64();
                    return Err(FieldError::OutOfRange {
                        field: spec.name.clone(),
                        value: raw.to_string(),
                        min: bound(min, &format!("-{limit}")),
                        max: bound(max, &limit.to_string()),
                    });
                }
            }
            Ok(TypedValue::Number(n))
        }
        FieldKind::Ordinal | FieldKind::Nominal => {
            let label = raw
                .as_label()
                .ok_or_else(|| type_mismatch(spec, "category label", raw))?;
            let category = spec
                .category(&label)
                .ok_or_else(|| FieldError::UnknownCategory {
                    field: spec.name.clone(),
                    value: label.clone(),
                    allowed: spec.labels(),
                })?;
            Ok(TypedValue::Category {
                code: category.code,
                label,
            })
        }
        FieldKind::Date => {
            let date = raw
                .as_date()
                .ok_or_else(|| type_mismatch(spec, "date (YYYY-MM-DD)", raw))?;
            if let FieldDomain::DateRange { min, max } = &spec.domain {
                let below = min.map(|m| date < m).unwrap_or(false);
                let above = max.map(|m| date > m).unwrap_or(false);
                if below || above {
                    return Err(FieldError::OutOfRange {
                        field: spec.name.clone(),
                        value: raw.to_string(),
                        min: bound(min, "-inf"),
                        max: bound(max, "inf"),
                    });
                }
            }
            Ok(TypedValue::Date(date))
        }
        FieldKind::Boolean => raw
            .as_bool()
            .map(TypedValue::Flag)
            .ok_or_else(|| type_mismatch(spec, "boolean", raw)),
    }
}

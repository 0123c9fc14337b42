//! Prediction service: validate → encode → infer → package
//!
//! The service holds the shared schema and model handle. Compatibility
//! between the two (width, feature names, layout fingerprint) is checked once
//! when the service is built, so a running service can only fail per request
//! on caller input.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::encoder::FeatureEncoder;
use crate::errors::{ConfigurationError, PredictionError};
use crate::gbdt::ModelHandle;
use crate::record::BookingRecord;
use crate::schema::{FeatureLayout, Schema};

/// Predicted revenue plus the request it answers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub value: f64,
    pub inputs_echoed: BookingRecord,
    pub model_hash: String,
}

/// Check that a feature layout can feed a model
pub fn check_compatibility(
    layout: &FeatureLayout,
    model: &ModelHandle,
) -> Result<(), ConfigurationError> {
    if layout.width() != model.expected_width() {
        return Err(ConfigurationError::WidthMismatch {
            layout: layout.width(),
            model: model.expected_width(),
        });
    }

    for (position, (column, expected)) in layout
        .columns()
        .iter()
        .zip(model.feature_names())
        .enumerate()
    {
        if column.name != *expected {
            return Err(ConfigurationError::FeatureNameMismatch {
                position,
                layout: column.name.clone(),
                model: expected.clone(),
            });
        }
    }

    match model.layout_fingerprint() {
        Some(trained) if trained != layout.fingerprint() => {
            Err(ConfigurationError::LayoutFingerprintMismatch {
                layout: layout.fingerprint().to_string(),
                model: trained.to_string(),
            })
        }
        Some(_) => Ok(()),
        None => {
            warn!("model artifact carries no layout fingerprint; checked width and names only");
            Ok(())
        }
    }
}

#[derive(Debug, Clone)]
pub struct PredictionService {
    schema: Arc<Schema>,
    model: Arc<ModelHandle>,
    reference_date: Option<NaiveDate>,
}

impl PredictionService {
    pub fn new(schema: Arc<Schema>, model: Arc<ModelHandle>) -> Result<Self, ConfigurationError> {
        check_compatibility(schema.layout(), &model)?;
        Ok(Self {
            schema,
            model,
            reference_date: None,
        })
    }

    /// Pin the "today" used for date-relative features
    pub fn with_reference_date(mut self, reference_date: NaiveDate) -> Self {
        self.reference_date = Some(reference_date);
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    pub fn encoder(&self) -> FeatureEncoder<'_> {
        let encoder = FeatureEncoder::new(&self.schema);
        match self.reference_date {
            Some(date) => encoder.with_reference_date(date),
            None => encoder,
        }
    }

    /// Predict revenue for one hypothetical booking
    #[instrument(skip_all, fields(fields = record.len(), model = %self.model.hash()))]
    pub fn predict_revenue(
        &self,
        record: BookingRecord,
    ) -> Result<PredictionResult, PredictionError> {
        let encoder = self.encoder();

        encoder
            .validate(&record)
            .map_err(PredictionError::Validation)?;

        let vector = encoder.encode(&record).map_err(PredictionError::Encoding)?;

        let value = self
            .model
            .predict(&vector)
            .map_err(PredictionError::Inference)?;

        debug!("prediction complete");
        Ok(PredictionResult {
            value,
            inputs_echoed: record,
            model_hash: self.model.hash().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{FieldError, Stage};
    use crate::fixed::Fixed;
    use crate::gbdt::{Model, Node, Tree};

    fn hotel_model(schema: &Schema) -> Model {
        let names: Vec<String> = schema.layout().names().iter().map(|n| n.to_string()).collect();
        // final_price <= 150 → 300, else 900; plus 0.5 × (room_type <= 1 ? -40 : 40)
        let price = Tree::new(
            vec![
                Node::split(0, 17, Fixed::from_int(150), 1, 2),
                Node::leaf(1, Fixed::from_int(300)),
                Node::leaf(2, Fixed::from_int(900)),
            ],
            Fixed::ONE,
        );
        let room = Tree::new(
            vec![
                Node::split(0, 0, Fixed::from_int(1), 1, 2),
                Node::leaf(1, Fixed::from_int(-40)),
                Node::leaf(2, Fixed::from_int(40)),
            ],
            Fixed::from_f64(0.5),
        );
        Model::new(names, vec![price, room], Fixed::from_int(100))
            .with_layout_fingerprint(schema.layout().fingerprint())
    }

    fn service() -> PredictionService {
        let schema = Arc::new(Schema::hotel_bookings().unwrap());
        let model = Arc::new(ModelHandle::from_model(hotel_model(&schema)).unwrap());
        PredictionService::new(schema, model).unwrap()
    }

    fn record() -> BookingRecord {
        BookingRecord::new()
            .with("room_type", "Suite")
            .with("customer_segment", "Business")
            .with("nights_stayed", 2i64)
            .with("booking_lead_time", 10i64)
            .with("occupancy_rate", 90.0)
            .with("room_price", 300.0)
            .with("discount_applied", 0.0)
            .with("season", "Winter")
            .with("day_of_week", "Monday")
            .with("event_type", "None")
            .with("competitor_price", 280.0)
            .with("cancellation_flag", 0i64)
            .with("payment_method", "Online")
            .with("customer_rating", 5i64)
            .with("extra_services", "Spa")
            .with("holiday_season", false)
            .with("marketing_spend", 0.0)
            .with("customer_feedback", "Neutral")
            .with("special_event", false)
            .with("booking_month", 12i64)
            .with("avg_daily_rate", 300.0)
    }

    #[test]
    fn predicts_and_echoes_inputs() {
        let service = service();
        let result = service.predict_revenue(record()).unwrap();

        // 100 + 900 (final_price 270) + 0.5 × 40 (Suite)
        assert_eq!(result.value, 1020.0);
        assert_eq!(result.inputs_echoed, record());
        assert_eq!(result.model_hash, service.model().hash());
    }

    #[test]
    fn missing_fields_fail_at_validation() {
        let service = service();
        let mut incomplete = record();
        incomplete.insert("customer_segment", crate::record::RawValue::Null);
        incomplete.insert("season", crate::record::RawValue::Null);

        let err = service.predict_revenue(incomplete).unwrap_err();
        assert_eq!(err.stage(), Stage::Validation);
        assert_eq!(
            err.field_errors(),
            &[
                FieldError::MissingField {
                    field: "customer_segment".into()
                },
                FieldError::MissingField {
                    field: "season".into()
                },
            ]
        );
    }

    #[test]
    fn width_mismatch_is_configuration_error() {
        let schema = Arc::new(Schema::hotel_bookings().unwrap());
        let mut model = hotel_model(&schema);
        model.feature_names.pop();
        model.feature_count -= 1;
        let handle = Arc::new(ModelHandle::from_model(model).unwrap());

        let err = PredictionService::new(schema, handle).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::WidthMismatch {
                layout: 23,
                model: 22
            }
        );
    }

    #[test]
    fn renamed_feature_is_configuration_error() {
        let schema = Arc::new(Schema::hotel_bookings().unwrap());
        let mut model = hotel_model(&schema);
        model.feature_names.swap(3, 4);
        let handle = Arc::new(ModelHandle::from_model(model).unwrap());

        let err = PredictionService::new(schema, handle).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::FeatureNameMismatch { position: 3, .. }
        ));
    }

    #[test]
    fn stale_layout_fingerprint_is_configuration_error() {
        let schema = Arc::new(Schema::hotel_bookings().unwrap());
        let model = hotel_model(&schema).with_layout_fingerprint("deadbeef");
        let handle = Arc::new(ModelHandle::from_model(model).unwrap());

        assert!(matches!(
            PredictionService::new(schema, handle),
            Err(ConfigurationError::LayoutFingerprintMismatch { .. })
        ));
    }

    #[test]
    fn service_is_shareable_across_threads() {
        let service = Arc::new(service());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let service = Arc::clone(&service);
                std::thread::spawn(move || service.predict_revenue(record()).unwrap().value)
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 1020.0);
        }
    }
}

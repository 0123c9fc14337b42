//! Small worked examples over compact, hand-written schemas

use std::sync::Arc;

use hotel_revenue_core::gbdt::{Node, Tree};
use hotel_revenue_core::{
    AggregationEngine, BookingRecord, Dataset, FeatureEncoder, FieldError, FilterSpec, Fixed,
    MetricFields, Model, ModelHandle, PredictionService, Schema, Stage,
};

const BOOKING_SCHEMA: &str = r#"
    name = "bookings"
    version = "1"

    [[fields]]
    name = "leadTime"
    kind = "numeric"
    min = 0

    [[fields]]
    name = "revenue"
    kind = "numeric"
    min = 0

    [[fields]]
    name = "adr"
    kind = "numeric"
    min = 0

    [[fields]]
    name = "cancelled"
    kind = "boolean"

    [[fields]]
    name = "roomType"
    kind = "nominal"
    categories = ["A", "B", "C", "D"]

    [[fields]]
    name = "marketSegment"
    kind = "ordinal"
    categories = ["Direct", "Corporate", "Online"]

    [[layout]]
    field = "leadTime"
    transform = "identity"

    [[layout]]
    field = "roomType"
    transform = "one_hot"

    [[layout]]
    field = "marketSegment"
    transform = "ordinal"
"#;

fn schema() -> Arc<Schema> {
    Arc::new(Schema::from_toml_str(BOOKING_SCHEMA).unwrap())
}

fn metrics() -> MetricFields {
    MetricFields {
        revenue: "revenue".into(),
        lead_time: "leadTime".into(),
        daily_rate: "adr".into(),
        cancellation: "cancelled".into(),
    }
}

fn service(schema: Arc<Schema>) -> PredictionService {
    let names = schema
        .layout()
        .names()
        .into_iter()
        .map(str::to_string)
        .collect();
    let tree = Tree::new(
        vec![
            Node::split(0, 0, Fixed::from_int(30), 1, 2),
            Node::leaf(1, Fixed::from_int(150)),
            Node::leaf(2, Fixed::from_int(90)),
        ],
        Fixed::ONE,
    );
    let model = Model::new(names, vec![tree], Fixed::ZERO)
        .with_layout_fingerprint(schema.layout().fingerprint());
    PredictionService::new(schema, Arc::new(ModelHandle::from_model(model).unwrap())).unwrap()
}

#[test]
fn lead_time_filter_selects_first_row() {
    let schema = schema();
    let dataset = Dataset::from_records(
        vec!["leadTime".into(), "revenue".into(), "cancelled".into()],
        vec![
            BookingRecord::new()
                .with("leadTime", 10i64)
                .with("revenue", 200i64)
                .with("cancelled", false),
            BookingRecord::new()
                .with("leadTime", 50i64)
                .with("revenue", 0i64)
                .with("cancelled", true),
        ],
    );

    let engine = AggregationEngine::with_metrics(schema, metrics()).unwrap();
    let view = engine
        .aggregate(&dataset, &FilterSpec::new().at_most("leadTime", 20.0))
        .unwrap();

    assert_eq!(view.rows, vec![&dataset.rows()[0]]);
    assert_eq!(view.kpis.row_count, 1);
    assert_eq!(view.kpis.avg_revenue, 200.0);
    assert_eq!(view.kpis.cancellation_rate, 0.0);
}

#[test]
fn missing_market_segment_yields_no_prediction() {
    let service = service(schema());
    let record = BookingRecord::new()
        .with("leadTime", 12i64)
        .with("roomType", "B");

    let err = service.predict_revenue(record).unwrap_err();
    assert_eq!(err.stage(), Stage::Validation);
    assert_eq!(
        err.field_errors(),
        &[FieldError::MissingField {
            field: "marketSegment".into()
        }]
    );
}

#[test]
fn unknown_room_type_is_rejected() {
    let schema = schema();
    let record = BookingRecord::new()
        .with("leadTime", 12i64)
        .with("roomType", "Z")
        .with("marketSegment", "Online");

    let errors = FeatureEncoder::new(&schema).encode(&record).unwrap_err();
    assert_eq!(
        errors.errors(),
        &[FieldError::UnknownCategory {
            field: "roomType".into(),
            value: "Z".into(),
            allowed: vec!["A".into(), "B".into(), "C".into(), "D".into()],
        }]
    );
}

#[test]
fn complete_request_predicts() {
    let service = service(schema());
    let record = BookingRecord::new()
        .with("leadTime", 12i64)
        .with("roomType", "D")
        .with("marketSegment", "Corporate");

    let result = service.predict_revenue(record).unwrap();
    assert_eq!(result.value, 150.0);

    let vector = service.encoder().encode(&result.inputs_echoed).unwrap();
    assert_eq!(vector.to_f64_vec(), vec![12.0, 0.0, 0.0, 0.0, 1.0, 1.0]);
}

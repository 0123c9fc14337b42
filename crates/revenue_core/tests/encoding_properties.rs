mod common;

use hotel_revenue_core::{
    BookingRecord, ColumnSpec, ColumnTransform, FeatureEncoder, FieldError, FieldSpec, Fixed,
    Schema,
};
use proptest::prelude::*;
use proptest::sample::select;

fn hotel_records() -> impl Strategy<Value = BookingRecord> {
    let categorical = (
        select(vec!["Deluxe", "Double", "Single", "Suite"]),
        select(vec!["Business", "Group", "Leisure", "Solo"]),
        select(vec!["Spring", "Summer", "Autumn", "Winter"]),
        select(vec!["Monday", "Thursday", "Saturday", "Sunday"]),
        select(vec!["None", "Conference", "Festival", "Exhibition"]),
        select(vec!["Cash", "Online", "Credit Card"]),
        select(vec!["None", "Spa", "Breakfast", "Dinner", "All"]),
        select(vec!["Negative", "Neutral", "Positive"]),
    );
    let numeric = (
        1i64..=30,
        0i64..=365,
        0.0f64..=100.0,
        50.0f64..=1000.0,
        0.0f64..=500.0,
        50.0f64..=1000.0,
        1.0f64..=5.0,
        0.0f64..=10_000.0,
        1i64..=12,
        50.0f64..=1000.0,
    );
    let flags = (any::<bool>(), any::<bool>(), any::<bool>());

    (categorical, numeric, flags).prop_map(|(c, n, f)| {
        BookingRecord::new()
            .with("room_type", c.0)
            .with("customer_segment", c.1)
            .with("season", c.2)
            .with("day_of_week", c.3)
            .with("event_type", c.4)
            .with("payment_method", c.5)
            .with("extra_services", c.6)
            .with("customer_feedback", c.7)
            .with("nights_stayed", n.0)
            .with("booking_lead_time", n.1)
            .with("occupancy_rate", n.2)
            .with("room_price", n.3)
            .with("discount_applied", n.4)
            .with("competitor_price", n.5)
            .with("customer_rating", n.6)
            .with("marketing_spend", n.7)
            .with("booking_month", n.8)
            .with("avg_daily_rate", n.9)
            .with("cancellation_flag", f.0)
            .with("holiday_season", f.1)
            .with("special_event", f.2)
    })
}

fn one_hot_schema() -> Schema {
    Schema::new(
        "one_hot",
        "1",
        vec![
            FieldSpec::nominal("room", &["A", "B", "C", "D"]),
            FieldSpec::integer("lead", 0, 365),
            FieldSpec::nominal("channel", &["Direct", "Agent", "Online"]),
        ],
        vec![
            ColumnSpec::new("room", ColumnTransform::OneHot),
            ColumnSpec::new("lead", ColumnTransform::Identity),
            ColumnSpec::new("channel", ColumnTransform::OneHot),
        ],
    )
    .unwrap()
}

proptest! {
    #[test]
    fn valid_records_encode_to_layout_width(record in hotel_records()) {
        let schema = Schema::hotel_bookings().unwrap();
        let encoder = FeatureEncoder::new(&schema);

        let first = encoder.encode(&record).unwrap();
        let second = encoder.encode(&record).unwrap();

        prop_assert_eq!(first.len(), schema.layout().width());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn one_hot_blocks_sum_to_one(
        room in select(vec!["A", "B", "C", "D"]),
        lead in 0i64..=365,
        channel in select(vec!["Direct", "Agent", "Online"]),
    ) {
        let schema = one_hot_schema();
        let record = BookingRecord::new()
            .with("room", room)
            .with("lead", lead)
            .with("channel", channel);

        let vector = FeatureEncoder::new(&schema).encode(&record).unwrap();
        prop_assert_eq!(vector.len(), 8);

        for (_, range) in schema.layout().one_hot_blocks() {
            let sum: Fixed = vector.values()[range].iter().copied().sum();
            prop_assert_eq!(sum, Fixed::ONE);
        }
    }

    #[test]
    fn out_of_range_prices_never_encode(
        record in hotel_records(),
        price in prop_oneof![0.0f64..49.99, 1000.01f64..1.0e6],
    ) {
        let schema = Schema::hotel_bookings().unwrap();
        let record = record.with("room_price", price);

        let errors = FeatureEncoder::new(&schema).encode(&record).unwrap_err();
        prop_assert_eq!(errors.len(), 1);
        let is_out_of_range = matches!(
            &errors.errors()[0],
            FieldError::OutOfRange { field, .. } if field == "room_price"
        );
        prop_assert!(is_out_of_range);
    }

    #[test]
    fn unseen_labels_never_encode(
        record in hotel_records(),
        label in "[a-z]{1,10}",
    ) {
        let schema = Schema::hotel_bookings().unwrap();
        let record = record.with("season", label.as_str());

        let errors = FeatureEncoder::new(&schema).encode(&record).unwrap_err();
        let is_unknown = matches!(
            &errors.errors()[0],
            FieldError::UnknownCategory { field, .. } if field == "season"
        );
        prop_assert!(is_unknown);
    }
}

#[test]
fn shared_fixture_record_encodes() {
    let schema = Schema::hotel_bookings().unwrap();
    let vector = FeatureEncoder::new(&schema)
        .encode(&common::hotel_record())
        .unwrap();
    assert_eq!(vector.get(17), Some(Fixed::from_int(135)));
}

#[test]
fn demand_index_beyond_fixed_range_never_encodes() {
    let schema = Schema::hotel_bookings().unwrap();
    let record = common::hotel_record().with("demand_index", 1.0e13);

    let errors = FeatureEncoder::new(&schema).encode(&record).unwrap_err();
    assert_eq!(errors.fields(), vec!["demand_index"]);
}

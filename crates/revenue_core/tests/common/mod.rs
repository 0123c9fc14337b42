#![allow(dead_code)]

use hotel_revenue_core::gbdt::{Node, Tree};
use hotel_revenue_core::{BookingRecord, Fixed, Model, Schema};

/// A complete, in-domain hotel booking request
pub fn hotel_record() -> BookingRecord {
    BookingRecord::new()
        .with("room_type", "Deluxe")
        .with("customer_segment", "Business")
        .with("nights_stayed", 4i64)
        .with("booking_lead_time", 21i64)
        .with("occupancy_rate", 75.0)
        .with("room_price", 180.0)
        .with("discount_applied", 15.0)
        .with("season", "Autumn")
        .with("day_of_week", "Wednesday")
        .with("event_type", "Conference")
        .with("competitor_price", 175.0)
        .with("cancellation_flag", false)
        .with("payment_method", "Cash")
        .with("customer_rating", 3i64)
        .with("extra_services", "Breakfast")
        .with("holiday_season", false)
        .with("marketing_spend", 2500.0)
        .with("customer_feedback", "Positive")
        .with("special_event", true)
        .with("booking_month", 10i64)
        .with("avg_daily_rate", 170.0)
}

/// Three-tree ensemble over the hotel layout, pinned to its fingerprint.
///
/// bias 250
/// + final_price (pos 17) <= 120 ? 100 : 400
/// + nights_stayed (pos 2) <= 3 ? -50 : 150
/// + 0.5 × (event_type (pos 9) <= 0 ? 0 : 80)
pub fn hotel_model(schema: &Schema) -> Model {
    let names = schema
        .layout()
        .names()
        .into_iter()
        .map(str::to_string)
        .collect();

    let stump = |feature: usize, threshold: i64, left: i64, right: i64, weight: Fixed| {
        Tree::new(
            vec![
                Node::split(0, feature, Fixed::from_int(threshold), 1, 2),
                Node::leaf(1, Fixed::from_int(left)),
                Node::leaf(2, Fixed::from_int(right)),
            ],
            weight,
        )
    };

    Model::new(
        names,
        vec![
            stump(17, 120, 100, 400, Fixed::ONE),
            stump(2, 3, -50, 150, Fixed::ONE),
            stump(9, 0, 0, 80, Fixed::from_f64(0.5)),
        ],
        Fixed::from_int(250),
    )
    .with_layout_fingerprint(schema.layout().fingerprint())
}

pub const HOTEL_CSV: &str = "\
room_type,customer_segment,booking_lead_time,total_revenue,avg_daily_rate,competitor_price,cancellation_flag,booking_month,checkin_date
Suite,Business,12,1200,300,280,0,1,2024-01-04
Deluxe,Leisure,60,540,180,190,0,1,2024-01-19
Single,Solo,3,0,90,95,1,2,2024-02-02
Double,Group,120,880,220,210,0,3,2024-03-10
Suite,Leisure,45,0,310,300,1,3,2024-03-28
Single,Business,7,160,80,,0,3,
";

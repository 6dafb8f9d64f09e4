use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Every slot reserves the technician for exactly one hour.
pub const SLOT_MINUTES: i64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub technician_name: String,
    pub service: String,
    pub booking_datetime: NaiveDateTime,
    pub user_id: Option<i64>,
}

impl Booking {
    pub fn end_time(&self) -> NaiveDateTime {
        self.booking_datetime + Duration::minutes(SLOT_MINUTES)
    }

    pub fn format_datetime(&self) -> String {
        self.booking_datetime.format("%Y-%m-%d %I:%M%p").to_string()
    }
}

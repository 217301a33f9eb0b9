use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

/// The clinic operates on Colombia time (GMT-5, no daylight saving).
pub fn colombia_offset() -> FixedOffset {
    FixedOffset::west_opt(5 * 3600).expect("valid fixed offset")
}

pub fn colombia_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&colombia_offset())
}

pub fn colombia_today() -> NaiveDate {
    colombia_now().date_naive()
}

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::config::AppConfig;
use crate::models::{Booking, SLOT_MINUTES};

/// Inputs every validation call needs. `now` is injected by the caller so
/// the checks stay deterministic under test.
#[derive(Debug, Clone, Copy)]
pub struct BookingDeps {
    pub now: NaiveDateTime,
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl BookingDeps {
    pub fn new(now: NaiveDateTime, config: &AppConfig) -> Self {
        Self {
            now,
            open: config.business_hours_start,
            close: config.business_hours_end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("That time is outside our business hours ({open} - {close}). Please pick a time between {open} and {close}.")]
    OutsideHours { open: NaiveTime, close: NaiveTime },

    #[error("Bookings cannot be made in the past. Current time is {now}.")]
    InPast { now: NaiveDateTime },

    #[error("You already have a {service} booking on {date}. Only one booking per service per day.")]
    SameDayDuplicate { service: String, date: NaiveDate },

    #[error("Time slot {at} is not available for {technician}. Could you pick a different time?")]
    SlotTaken {
        technician: String,
        at: NaiveDateTime,
    },
}

pub fn validate_business_hours(
    dt: &NaiveDateTime,
    open: NaiveTime,
    close: NaiveTime,
) -> Result<(), ValidationError> {
    let t = dt.time();
    if t < open || t > close {
        return Err(ValidationError::OutsideHours { open, close });
    }
    Ok(())
}

pub fn validate_not_past(dt: &NaiveDateTime, now: &NaiveDateTime) -> Result<(), ValidationError> {
    if dt < now {
        return Err(ValidationError::InPast { now: *now });
    }
    Ok(())
}

/// Two slots conflict when their hour-long intervals intersect:
/// `start < other.start + 1h && other.start < start + 1h`.
/// `exclude_id` lets an edit skip the booking being moved.
pub fn find_overlap<'a>(
    existing: &'a [Booking],
    technician: &str,
    start: &NaiveDateTime,
    exclude_id: Option<i64>,
) -> Option<&'a Booking> {
    let slot = Duration::minutes(SLOT_MINUTES);
    existing.iter().find(|b| {
        b.technician_name == technician
            && Some(b.id) != exclude_id
            && *start < b.booking_datetime + slot
            && b.booking_datetime < *start + slot
    })
}

/// A user may hold only one booking per service per calendar day, where the
/// day is the booking's own local date.
pub fn find_same_day_duplicate<'a>(
    existing: &'a [Booking],
    user_id: i64,
    service: &str,
    day: NaiveDate,
) -> Option<&'a Booking> {
    existing.iter().find(|b| {
        b.user_id == Some(user_id)
            && b.service.eq_ignore_ascii_case(service)
            && b.booking_datetime.date() == day
    })
}

/// Full policy for a new slot, in order: same-day duplicate, not-in-past,
/// business hours, overlap. The duplicate check runs first because it is the
/// more actionable message when both would fail.
pub fn validate_new_slot(
    deps: &BookingDeps,
    user_bookings: &[Booking],
    technician_bookings: &[Booking],
    user_id: i64,
    service: &str,
    technician: &str,
    start: &NaiveDateTime,
) -> Result<(), ValidationError> {
    if let Some(dup) = find_same_day_duplicate(user_bookings, user_id, service, start.date()) {
        return Err(ValidationError::SameDayDuplicate {
            service: dup.service.clone(),
            date: start.date(),
        });
    }
    validate_not_past(start, &deps.now)?;
    validate_business_hours(start, deps.open, deps.close)?;
    if find_overlap(technician_bookings, technician, start, None).is_some() {
        return Err(ValidationError::SlotTaken {
            technician: technician.to_string(),
            at: *start,
        });
    }
    Ok(())
}

/// Policy for moving an existing booking: not-in-past, business hours,
/// overlap excluding the booking's own id. No duplicate check; the booking
/// already holds its service/day claim.
pub fn validate_moved_slot(
    deps: &BookingDeps,
    technician_bookings: &[Booking],
    technician: &str,
    start: &NaiveDateTime,
    booking_id: i64,
) -> Result<(), ValidationError> {
    validate_not_past(start, &deps.now)?;
    validate_business_hours(start, deps.open, deps.close)?;
    if find_overlap(technician_bookings, technician, start, Some(booking_id)).is_some() {
        return Err(ValidationError::SlotTaken {
            technician: technician.to_string(),
            at: *start,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    fn booking(id: i64, technician: &str, service: &str, start: &str, user_id: Option<i64>) -> Booking {
        Booking {
            id,
            technician_name: technician.to_string(),
            service: service.to_string(),
            booking_datetime: dt(start),
            user_id,
        }
    }

    fn deps() -> BookingDeps {
        BookingDeps {
            now: dt("2030-05-01 08:00"),
            open: t("09:00"),
            close: t("17:00"),
        }
    }

    #[test]
    fn test_business_hours_inclusive_bounds() {
        assert!(validate_business_hours(&dt("2030-05-01 09:00"), t("09:00"), t("17:00")).is_ok());
        assert!(validate_business_hours(&dt("2030-05-01 17:00"), t("09:00"), t("17:00")).is_ok());
        assert!(matches!(
            validate_business_hours(&dt("2030-05-01 08:59"), t("09:00"), t("17:00")),
            Err(ValidationError::OutsideHours { .. })
        ));
        assert!(matches!(
            validate_business_hours(&dt("2030-05-01 17:01"), t("09:00"), t("17:00")),
            Err(ValidationError::OutsideHours { .. })
        ));
    }

    #[test]
    fn test_not_past() {
        let now = dt("2030-05-01 12:00");
        assert!(validate_not_past(&dt("2030-05-01 12:00"), &now).is_ok());
        assert!(matches!(
            validate_not_past(&dt("2030-05-01 11:59"), &now),
            Err(ValidationError::InPast { .. })
        ));
    }

    #[test]
    fn test_overlap_detection() {
        let existing = vec![booking(1, "Plumber", "Plumber", "2030-05-01 10:00", None)];

        assert!(find_overlap(&existing, "Plumber", &dt("2030-05-01 10:30"), None).is_some());
        assert!(find_overlap(&existing, "Plumber", &dt("2030-05-01 09:30"), None).is_some());
        // Adjacent slots do not overlap
        assert!(find_overlap(&existing, "Plumber", &dt("2030-05-01 11:00"), None).is_none());
        assert!(find_overlap(&existing, "Plumber", &dt("2030-05-01 09:00"), None).is_none());
        // Different technician never conflicts
        assert!(find_overlap(&existing, "Electrician", &dt("2030-05-01 10:00"), None).is_none());
    }

    #[test]
    fn test_overlap_self_exclusion() {
        let existing = vec![booking(5, "Plumber", "Plumber", "2030-05-01 10:00", Some(1))];

        assert!(find_overlap(&existing, "Plumber", &dt("2030-05-01 10:30"), Some(5)).is_none());
        assert!(find_overlap(&existing, "Plumber", &dt("2030-05-01 10:30"), Some(6)).is_some());
    }

    #[test]
    fn test_same_day_duplicate() {
        let existing = vec![booking(1, "Gardening", "Gardening", "2030-05-01 10:00", Some(4))];

        assert!(
            find_same_day_duplicate(&existing, 4, "gardening", dt("2030-05-01 14:00").date())
                .is_some()
        );
        // Different user, different day, different service: all fine
        assert!(
            find_same_day_duplicate(&existing, 5, "Gardening", dt("2030-05-01 14:00").date())
                .is_none()
        );
        assert!(
            find_same_day_duplicate(&existing, 4, "Gardening", dt("2030-05-02 14:00").date())
                .is_none()
        );
        assert!(
            find_same_day_duplicate(&existing, 4, "Plumbing", dt("2030-05-01 14:00").date())
                .is_none()
        );
    }

    #[test]
    fn test_new_slot_duplicate_reported_before_slot_errors() {
        let mine = vec![booking(1, "Gardening", "Gardening", "2030-05-01 10:00", Some(4))];
        let theirs = vec![booking(2, "Gardening", "Gardening", "2030-05-01 14:00", Some(9))];

        // 14:00 also overlaps an existing slot, but the duplicate wins
        let err = validate_new_slot(
            &deps(),
            &mine,
            &theirs,
            4,
            "Gardening",
            "Gardening",
            &dt("2030-05-01 14:00"),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::SameDayDuplicate { .. }));
    }

    #[test]
    fn test_new_slot_full_pass() {
        let result = validate_new_slot(
            &deps(),
            &[],
            &[],
            4,
            "Plumber",
            "Plumber",
            &dt("2030-05-01 10:00"),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_moved_slot_checks_hours_and_overlap() {
        let window = vec![booking(2, "Welder", "Welder", "2030-05-01 10:00", Some(9))];

        let err = validate_moved_slot(&deps(), &window, "Welder", &dt("2030-05-01 19:00"), 1)
            .unwrap_err();
        assert!(matches!(err, ValidationError::OutsideHours { .. }));

        let err = validate_moved_slot(&deps(), &window, "Welder", &dt("2030-05-01 10:30"), 1)
            .unwrap_err();
        assert!(matches!(err, ValidationError::SlotTaken { .. }));

        // Moving onto its own slot is allowed
        assert!(
            validate_moved_slot(&deps(), &window, "Welder", &dt("2030-05-01 10:30"), 2).is_ok()
        );
    }
}

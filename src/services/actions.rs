use chrono::Duration;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::StoreError;
use crate::models::{
    ActionType, BookingAction, ChatResponse, ConversationMessage, RoutingDecision, User,
    SLOT_MINUTES,
};
use crate::services::ai::extractor::IntentExtractor;
use crate::services::rules::{self, BookingDeps, ValidationError};

/// Shown when the language model is unreachable and the fallback path also
/// failed. Deliberately free of internal detail.
pub const GENERIC_APOLOGY: &str =
    "Sorry, I couldn't process that request. Please try again in a moment.";

pub fn dispatch_action(
    conn: &Connection,
    action: &BookingAction,
    user: &User,
    deps: &BookingDeps,
) -> anyhow::Result<ChatResponse> {
    match action.action_type {
        ActionType::NewBooking => handle_new_booking(conn, action, user, deps),
        ActionType::CancelBooking => handle_cancel_booking(conn, action.booking_id, user),
        ActionType::EditBooking => handle_edit_booking(conn, action, user, deps),
        ActionType::GetBooking => handle_lookup_booking(conn, action.booking_id, user),
    }
}

/// The service name doubles as the bookable resource when the user named no
/// technician; all conflict checks run against the resolved technician only.
fn resolve_technician(action: &BookingAction, service: &str) -> String {
    action
        .technician_name
        .clone()
        .unwrap_or_else(|| service.to_string())
}

pub fn handle_new_booking(
    conn: &Connection,
    action: &BookingAction,
    user: &User,
    deps: &BookingDeps,
) -> anyhow::Result<ChatResponse> {
    let Some(service) = action.service.as_deref() else {
        return Ok(ChatResponse::Clarification {
            question: "What service would you like to book?".to_string(),
        });
    };
    let Some(start) = action.booking_datetime else {
        return Ok(ChatResponse::Clarification {
            question: format!(
                "What time would you like your {service} booking? We take bookings between {} and {}.",
                deps.open, deps.close
            ),
        });
    };

    let technician = resolve_technician(action, service);

    let user_bookings = queries::list_bookings_for_user(conn, user.id)?;
    let window = Duration::minutes(SLOT_MINUTES);
    let technician_bookings = queries::list_bookings_for_technician_in_range(
        conn,
        &technician,
        &(start - window),
        &(start + window),
    )?;

    if let Err(e) = rules::validate_new_slot(
        deps,
        &user_bookings,
        &technician_bookings,
        user.id,
        service,
        &technician,
        &start,
    ) {
        return Ok(ChatResponse::Error {
            message: e.to_string(),
        });
    }

    match queries::create_booking(conn, &technician, service, &start, Some(user.id)) {
        Ok(booking) => Ok(ChatResponse::booking_details(&booking)),
        // A concurrent writer won the slot between the pre-check and the
        // insert; same message as a normal conflict.
        Err(StoreError::SlotTaken) => Ok(ChatResponse::Error {
            message: ValidationError::SlotTaken {
                technician,
                at: start,
            }
            .to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

pub fn handle_cancel_booking(
    conn: &Connection,
    booking_id: Option<i64>,
    user: &User,
) -> anyhow::Result<ChatResponse> {
    let Some(id) = booking_id else {
        return Ok(ChatResponse::Clarification {
            question: "Which booking would you like to cancel? Please give me the booking ID."
                .to_string(),
        });
    };

    if queries::delete_booking(conn, id, user.id)? {
        Ok(ChatResponse::Text {
            message: format!("Booking ID {id} cancelled."),
        })
    } else {
        Ok(ChatResponse::Error {
            message: format!("No booking found with ID {id} for your account."),
        })
    }
}

pub fn handle_edit_booking(
    conn: &Connection,
    action: &BookingAction,
    user: &User,
    deps: &BookingDeps,
) -> anyhow::Result<ChatResponse> {
    let Some(id) = action.booking_id else {
        return Ok(ChatResponse::Clarification {
            question: "Which booking would you like to change? Please give me the booking ID."
                .to_string(),
        });
    };
    let Some(new_start) = action.booking_datetime else {
        return Ok(ChatResponse::Clarification {
            question: format!("What time should booking {id} be moved to?"),
        });
    };

    let Some(booking) = queries::get_booking_for_user(conn, id, user.id)? else {
        return Ok(ChatResponse::Error {
            message: format!("No booking found with ID {id} for your account."),
        });
    };

    let window = Duration::minutes(SLOT_MINUTES);
    let technician_bookings = queries::list_bookings_for_technician_in_range(
        conn,
        &booking.technician_name,
        &(new_start - window),
        &(new_start + window),
    )?;

    if let Err(e) = rules::validate_moved_slot(
        deps,
        &technician_bookings,
        &booking.technician_name,
        &new_start,
        booking.id,
    ) {
        return Ok(ChatResponse::Error {
            message: e.to_string(),
        });
    }

    match queries::update_booking_time(conn, id, user.id, &new_start) {
        Ok(updated) => Ok(ChatResponse::booking_details(&updated)),
        Err(StoreError::SlotTaken) => Ok(ChatResponse::Error {
            message: ValidationError::SlotTaken {
                technician: booking.technician_name,
                at: new_start,
            }
            .to_string(),
        }),
        Err(StoreError::NotFound) => Ok(ChatResponse::Error {
            message: format!("No booking found with ID {id} for your account."),
        }),
        Err(e) => Err(e.into()),
    }
}

pub fn handle_lookup_booking(
    conn: &Connection,
    booking_id: Option<i64>,
    user: &User,
) -> anyhow::Result<ChatResponse> {
    let Some(id) = booking_id else {
        return Ok(ChatResponse::Clarification {
            question: "Which booking would you like to see? Please give me the booking ID."
                .to_string(),
        });
    };

    match queries::get_booking_for_user(conn, id, user.id)? {
        Some(booking) => Ok(ChatResponse::booking_details(&booking)),
        None => Ok(ChatResponse::Error {
            message: format!("No booking found with ID {id} for your account."),
        }),
    }
}

/// Delegates to the knowledge responder. Its failure is degraded to a
/// user-safe error response rather than a fault; this is also the single
/// fallback target when extraction fails.
pub async fn handle_general_inquiry(
    extractor: &dyn IntentExtractor,
    context: &str,
    history: &[ConversationMessage],
) -> ChatResponse {
    match extractor.answer_general(context, history).await {
        Ok(answer) => ChatResponse::Text { message: answer },
        Err(e) => {
            tracing::warn!(error = %e, "general inquiry failed");
            ChatResponse::Error {
                message: GENERIC_APOLOGY.to_string(),
            }
        }
    }
}

/// Never touches the store; turns the router's missing-info signal into a
/// follow-up question.
pub fn handle_clarification(decision: &RoutingDecision) -> ChatResponse {
    let question = decision
        .clarifying_question
        .clone()
        .filter(|q| !q.trim().is_empty())
        .or_else(|| {
            decision.missing_info.as_ref().map(|fields| {
                format!(
                    "Could you tell me the {}?",
                    fields.join(" and the ").replace('_', " ")
                )
            })
        })
        .unwrap_or_else(|| "Could you share a bit more detail about what you'd like to do?".to_string());

    ChatResponse::Clarification { question }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::RouteTarget;
    use chrono::{NaiveDateTime, NaiveTime};

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn deps() -> BookingDeps {
        BookingDeps {
            now: dt("2030-05-01 08:00"),
            open: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            close: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        }
    }

    fn setup() -> (Connection, User) {
        let conn = db::init_db(":memory:").unwrap();
        let user = queries::create_user(&conn, "alice", "tok-1").unwrap();
        (conn, user)
    }

    fn new_action(service: Option<&str>, datetime: Option<&str>) -> BookingAction {
        BookingAction {
            action_type: ActionType::NewBooking,
            booking_id: None,
            service: service.map(str::to_string),
            booking_datetime: datetime.map(dt),
            technician_name: None,
        }
    }

    #[test]
    fn test_new_booking_happy_path() {
        let (conn, user) = setup();
        let response = handle_new_booking(
            &conn,
            &new_action(Some("Gardening"), Some("2030-05-01 10:00")),
            &user,
            &deps(),
        )
        .unwrap();

        match response {
            ChatResponse::BookingDetails {
                service,
                technician,
                ..
            } => {
                assert_eq!(service, "Gardening");
                // No explicit technician: the service is the booked resource
                assert_eq!(technician, "Gardening");
            }
            other => panic!("expected booking details, got {other:?}"),
        }
    }

    #[test]
    fn test_new_booking_missing_time_asks_for_clarification() {
        let (conn, user) = setup();
        let response =
            handle_new_booking(&conn, &new_action(Some("Gardening"), None), &user, &deps())
                .unwrap();

        match response {
            ChatResponse::Clarification { question } => {
                assert!(question.contains("Gardening"));
                assert!(question.contains("09:00"));
            }
            other => panic!("expected clarification, got {other:?}"),
        }
    }

    #[test]
    fn test_new_booking_same_day_duplicate_beats_slot_error() {
        let (conn, user) = setup();
        handle_new_booking(
            &conn,
            &new_action(Some("Gardening"), Some("2030-05-01 10:00")),
            &user,
            &deps(),
        )
        .unwrap();

        let response = handle_new_booking(
            &conn,
            &new_action(Some("Gardening"), Some("2030-05-01 14:00")),
            &user,
            &deps(),
        )
        .unwrap();

        match response {
            ChatResponse::Error { message } => {
                assert!(message.contains("already have a Gardening booking"), "{message}");
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn test_new_booking_outside_hours_rejected() {
        let (conn, user) = setup();
        let response = handle_new_booking(
            &conn,
            &new_action(Some("Plumber"), Some("2030-05-01 19:00")),
            &user,
            &deps(),
        )
        .unwrap();

        assert!(matches!(response, ChatResponse::Error { ref message } if message.contains("business hours")));
    }

    #[test]
    fn test_new_booking_in_past_rejected() {
        let (conn, user) = setup();
        let response = handle_new_booking(
            &conn,
            &new_action(Some("Plumber"), Some("2030-04-30 10:00")),
            &user,
            &deps(),
        )
        .unwrap();

        assert!(matches!(response, ChatResponse::Error { ref message } if message.contains("past")));
    }

    #[test]
    fn test_cancel_not_owned_booking_not_found() {
        let (conn, alice) = setup();
        let bob = queries::create_user(&conn, "bob", "tok-2").unwrap();
        let booking = queries::create_booking(
            &conn,
            "Plumber",
            "Plumber",
            &dt("2030-05-01 10:00"),
            Some(bob.id),
        )
        .unwrap();

        let response = handle_cancel_booking(&conn, Some(booking.id), &alice).unwrap();
        assert!(matches!(response, ChatResponse::Error { ref message } if message.contains("No booking found")));

        // Bob's booking is untouched
        assert!(queries::get_booking_for_user(&conn, booking.id, bob.id)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_edit_to_conflicting_slot_rejected() {
        let (conn, user) = setup();
        queries::create_booking(&conn, "Welder", "Welder", &dt("2030-05-01 10:00"), None).unwrap();
        let mine = queries::create_booking(
            &conn,
            "Welder",
            "Welder",
            &dt("2030-05-01 14:00"),
            Some(user.id),
        )
        .unwrap();

        let action = BookingAction {
            action_type: ActionType::EditBooking,
            booking_id: Some(mine.id),
            service: None,
            booking_datetime: Some(dt("2030-05-01 10:30")),
            technician_name: None,
        };
        let response = handle_edit_booking(&conn, &action, &user, &deps()).unwrap();
        assert!(matches!(response, ChatResponse::Error { ref message } if message.contains("not available")));
    }

    #[test]
    fn test_edit_within_own_slot_succeeds() {
        let (conn, user) = setup();
        let mine = queries::create_booking(
            &conn,
            "Welder",
            "Welder",
            &dt("2030-05-01 14:00"),
            Some(user.id),
        )
        .unwrap();

        let action = BookingAction {
            action_type: ActionType::EditBooking,
            booking_id: Some(mine.id),
            service: None,
            booking_datetime: Some(dt("2030-05-01 14:30")),
            technician_name: None,
        };
        let response = handle_edit_booking(&conn, &action, &user, &deps()).unwrap();
        assert!(matches!(response, ChatResponse::BookingDetails { .. }));
    }

    #[test]
    fn test_lookup_booking() {
        let (conn, user) = setup();
        let booking = queries::create_booking(
            &conn,
            "Plumber",
            "Plumber",
            &dt("2030-05-01 10:00"),
            Some(user.id),
        )
        .unwrap();

        let found = handle_lookup_booking(&conn, Some(booking.id), &user).unwrap();
        assert!(matches!(found, ChatResponse::BookingDetails { id, .. } if id == booking.id));

        let missing = handle_lookup_booking(&conn, Some(9999), &user).unwrap();
        assert!(matches!(missing, ChatResponse::Error { .. }));
    }

    #[test]
    fn test_clarification_prefers_router_question() {
        let decision = RoutingDecision {
            target: RouteTarget::Clarification,
            confidence: 0.4,
            missing_info: Some(vec!["booking_datetime".to_string()]),
            clarifying_question: Some("What time works for you?".to_string()),
        };
        let response = handle_clarification(&decision);
        assert_eq!(
            response,
            ChatResponse::Clarification {
                question: "What time works for you?".to_string()
            }
        );
    }

    #[test]
    fn test_clarification_builds_question_from_missing_info() {
        let decision = RoutingDecision {
            target: RouteTarget::Clarification,
            confidence: 0.4,
            missing_info: Some(vec!["service".to_string(), "booking_datetime".to_string()]),
            clarifying_question: None,
        };
        match handle_clarification(&decision) {
            ChatResponse::Clarification { question } => {
                assert!(question.contains("service"));
                assert!(question.contains("booking datetime"));
            }
            other => panic!("expected clarification, got {other:?}"),
        }
    }
}

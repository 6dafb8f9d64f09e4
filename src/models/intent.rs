use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    NewBooking,
    CancelBooking,
    EditBooking,
    GetBooking,
}

/// A booking-specific intent extracted from free-form text. Consumed once per
/// turn; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingAction {
    pub action_type: ActionType,
    pub booking_id: Option<i64>,
    pub service: Option<String>,
    pub booking_datetime: Option<NaiveDateTime>,
    pub technician_name: Option<String>,
}

/// Result of asking the extraction port for a booking action. `success` is
/// false when the message matched no recognizable action pattern.
#[derive(Debug, Clone)]
pub struct BookingOutcome {
    pub success: bool,
    pub action: Option<BookingAction>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteTarget {
    Booking,
    General,
    Clarification,
}

/// The classifier's routing decision for one turn. Confidence and
/// missing-info are advisory; only `target` drives the transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub target: RouteTarget,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub missing_info: Option<Vec<String>>,
    #[serde(default)]
    pub clarifying_question: Option<String>,
}

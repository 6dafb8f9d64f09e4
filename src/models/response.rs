use serde::{Deserialize, Serialize};

use crate::models::Booking;

/// Closed set of reply shapes the chat layer can produce. One variant per
/// message kind; no optional-field grab bags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatResponse {
    Text {
        message: String,
    },
    BookingDetails {
        id: i64,
        service: String,
        technician: String,
        datetime: String,
    },
    Clarification {
        question: String,
    },
    Error {
        message: String,
    },
}

impl ChatResponse {
    pub fn booking_details(booking: &Booking) -> Self {
        ChatResponse::BookingDetails {
            id: booking.id,
            service: booking.service.clone(),
            technician: booking.technician_name.clone(),
            datetime: booking.format_datetime(),
        }
    }

    /// Plain-text rendering, used for the assistant side of conversation
    /// history and for SMS-style clients.
    pub fn display_text(&self) -> String {
        match self {
            ChatResponse::Text { message } => message.clone(),
            ChatResponse::BookingDetails {
                id,
                service,
                technician,
                datetime,
            } => format!("Booking {id}: {service} with {technician} at {datetime}"),
            ChatResponse::Clarification { question } => question.clone(),
            ChatResponse::Error { message } => message.clone(),
        }
    }
}

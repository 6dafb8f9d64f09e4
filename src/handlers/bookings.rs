use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{Duration, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::{AppError, StoreError};
use crate::handlers::auth;
use crate::models::{Booking, SLOT_MINUTES};
use crate::services::rules::{self, BookingDeps};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct BookingIn {
    pub service: String,
    pub booking_datetime: NaiveDateTime,
    #[serde(default)]
    pub technician_name: Option<String>,
}

#[derive(Serialize)]
pub struct BookingOut {
    pub id: i64,
    pub technician_name: String,
    pub service: String,
    pub booking_datetime: String,
}

impl From<Booking> for BookingOut {
    fn from(b: Booking) -> Self {
        Self {
            id: b.id,
            booking_datetime: b.booking_datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
            technician_name: b.technician_name,
            service: b.service,
        }
    }
}

// POST /bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(input): Json<BookingIn>,
) -> Result<(StatusCode, Json<BookingOut>), AppError> {
    let user = auth::require_user(&state, &headers)?;
    let deps = BookingDeps::new(Local::now().naive_local(), &state.config);

    let technician = input
        .technician_name
        .clone()
        .unwrap_or_else(|| input.service.clone());
    let start = input.booking_datetime;

    let db = state.db.lock().unwrap();
    let user_bookings = queries::list_bookings_for_user(&db, user.id)?;
    let window = Duration::minutes(SLOT_MINUTES);
    let technician_bookings = queries::list_bookings_for_technician_in_range(
        &db,
        &technician,
        &(start - window),
        &(start + window),
    )?;

    rules::validate_new_slot(
        &deps,
        &user_bookings,
        &technician_bookings,
        user.id,
        &input.service,
        &technician,
        &start,
    )
    .map_err(|e| AppError::Validation(e.to_string()))?;

    match queries::create_booking(&db, &technician, &input.service, &start, Some(user.id)) {
        Ok(booking) => Ok((StatusCode::CREATED, Json(booking.into()))),
        Err(StoreError::SlotTaken) => Err(AppError::Validation(
            rules::ValidationError::SlotTaken {
                technician,
                at: start,
            }
            .to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

// GET /bookings
pub async fn list_my_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<BookingOut>>, AppError> {
    let user = auth::require_user(&state, &headers)?;

    let db = state.db.lock().unwrap();
    let bookings = queries::list_bookings_for_user(&db, user.id)?;
    Ok(Json(bookings.into_iter().map(BookingOut::from).collect()))
}

// GET /bookings/:id
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<BookingOut>, AppError> {
    let user = auth::require_user(&state, &headers)?;

    let db = state.db.lock().unwrap();
    match queries::get_booking_for_user(&db, id, user.id)? {
        Some(booking) => Ok(Json(booking.into())),
        None => Err(AppError::NotFound(format!("no booking with id {id}"))),
    }
}

// DELETE /bookings/:id
pub async fn delete_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = auth::require_user(&state, &headers)?;

    let db = state.db.lock().unwrap();
    if queries::delete_booking(&db, id, user.id)? {
        Ok(Json(
            serde_json::json!({ "detail": format!("Booking ID {id} cancelled") }),
        ))
    } else {
        Err(AppError::NotFound(format!("no booking with id {id}")))
    }
}

use chrono::{Duration, NaiveDateTime};
use rusqlite::{params, Connection};

use crate::errors::StoreError;
use crate::models::{Booking, Conversation, ConversationMessage, User, SLOT_MINUTES};

const DT_FMT: &str = "%Y-%m-%d %H:%M:%S";

// ── Bookings ──

/// Inserts a booking after re-checking the overlap window inside a
/// transaction. The pure rule-engine check runs before this is called; the
/// re-check here closes the check-then-act race when two requests target
/// overlapping slots concurrently. The unique (technician, datetime) index
/// catches anything that still slips through.
pub fn create_booking(
    conn: &Connection,
    technician: &str,
    service: &str,
    start: &NaiveDateTime,
    user_id: Option<i64>,
) -> Result<Booking, StoreError> {
    let tx = conn.unchecked_transaction()?;

    if overlap_exists(&tx, technician, start, None)? {
        return Err(StoreError::SlotTaken);
    }

    let insert = tx.execute(
        "INSERT INTO bookings (technician_name, service, booking_datetime, user_id)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            technician,
            service,
            start.format(DT_FMT).to_string(),
            user_id
        ],
    );

    match insert {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            return Err(StoreError::SlotTaken);
        }
        Err(e) => return Err(e.into()),
    }

    let id = tx.last_insert_rowid();
    tx.commit()?;

    Ok(Booking {
        id,
        technician_name: technician.to_string(),
        service: service.to_string(),
        booking_datetime: *start,
        user_id,
    })
}

/// Moves a booking to a new start time. Scoped to the owning user; the
/// overlap re-check excludes the booking's own row so moving within its own
/// slot succeeds.
pub fn update_booking_time(
    conn: &Connection,
    id: i64,
    user_id: i64,
    new_start: &NaiveDateTime,
) -> Result<Booking, StoreError> {
    let tx = conn.unchecked_transaction()?;

    let booking = tx
        .query_row(
            "SELECT id, technician_name, service, booking_datetime, user_id
             FROM bookings WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
            parse_booking_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            other => StoreError::Database(other),
        })?;

    if overlap_exists(&tx, &booking.technician_name, new_start, Some(id))? {
        return Err(StoreError::SlotTaken);
    }

    let update = tx.execute(
        "UPDATE bookings SET booking_datetime = ?1 WHERE id = ?2 AND user_id = ?3",
        params![new_start.format(DT_FMT).to_string(), id, user_id],
    );

    match update {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            return Err(StoreError::SlotTaken);
        }
        Err(e) => return Err(e.into()),
    }

    tx.commit()?;

    Ok(Booking {
        booking_datetime: *new_start,
        ..booking
    })
}

fn overlap_exists(
    conn: &Connection,
    technician: &str,
    start: &NaiveDateTime,
    exclude_id: Option<i64>,
) -> Result<bool, StoreError> {
    let from = (*start - Duration::minutes(SLOT_MINUTES))
        .format(DT_FMT)
        .to_string();
    let to = (*start + Duration::minutes(SLOT_MINUTES))
        .format(DT_FMT)
        .to_string();

    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM bookings
         WHERE technician_name = ?1
           AND booking_datetime > ?2 AND booking_datetime < ?3
           AND (?4 IS NULL OR id != ?4)",
        params![technician, from, to, exclude_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn get_booking_for_user(
    conn: &Connection,
    id: i64,
    user_id: i64,
) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        "SELECT id, technician_name, service, booking_datetime, user_id
         FROM bookings WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
        parse_booking_row,
    );

    match result {
        Ok(booking) => Ok(Some(booking)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_bookings_for_user(conn: &Connection, user_id: i64) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(
        "SELECT id, technician_name, service, booking_datetime, user_id
         FROM bookings WHERE user_id = ?1 ORDER BY booking_datetime ASC",
    )?;

    let rows = stmt.query_map(params![user_id], parse_booking_row)?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row?);
    }
    Ok(bookings)
}

pub fn list_bookings_for_technician_in_range(
    conn: &Connection,
    technician: &str,
    from: &NaiveDateTime,
    to: &NaiveDateTime,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(
        "SELECT id, technician_name, service, booking_datetime, user_id
         FROM bookings
         WHERE technician_name = ?1 AND booking_datetime >= ?2 AND booking_datetime <= ?3
         ORDER BY booking_datetime ASC",
    )?;

    let rows = stmt.query_map(
        params![
            technician,
            from.format(DT_FMT).to_string(),
            to.format(DT_FMT).to_string()
        ],
        parse_booking_row,
    )?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row?);
    }
    Ok(bookings)
}

pub fn delete_booking(conn: &Connection, id: i64, user_id: i64) -> anyhow::Result<bool> {
    let count = conn.execute(
        "DELETE FROM bookings WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?;
    Ok(count > 0)
}

fn parse_booking_row(row: &rusqlite::Row) -> rusqlite::Result<Booking> {
    let datetime_str: String = row.get(3)?;
    let booking_datetime = NaiveDateTime::parse_from_str(&datetime_str, DT_FMT)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Booking {
        id: row.get(0)?,
        technician_name: row.get(1)?,
        service: row.get(2)?,
        booking_datetime,
        user_id: row.get(4)?,
    })
}

// ── Users ──

pub fn create_user(conn: &Connection, username: &str, api_token: &str) -> anyhow::Result<User> {
    conn.execute(
        "INSERT INTO users (username, api_token) VALUES (?1, ?2)",
        params![username, api_token],
    )?;
    Ok(User {
        id: conn.last_insert_rowid(),
        username: username.to_string(),
        api_token: api_token.to_string(),
    })
}

pub fn get_user_by_username(conn: &Connection, username: &str) -> anyhow::Result<Option<User>> {
    query_user(
        conn,
        "SELECT id, username, api_token FROM users WHERE username = ?1",
        username,
    )
}

pub fn get_user_by_token(conn: &Connection, token: &str) -> anyhow::Result<Option<User>> {
    query_user(
        conn,
        "SELECT id, username, api_token FROM users WHERE api_token = ?1",
        token,
    )
}

fn query_user(conn: &Connection, sql: &str, param: &str) -> anyhow::Result<Option<User>> {
    let result = conn.query_row(sql, params![param], |row| {
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            api_token: row.get(2)?,
        })
    });

    match result {
        Ok(user) => Ok(Some(user)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ── Conversations ──

/// Stale rows are treated as absent; `now` must come from the same clock
/// that stamped the conversation.
pub fn get_conversation(
    conn: &Connection,
    user_id: i64,
    now: &NaiveDateTime,
) -> anyhow::Result<Option<Conversation>> {
    let now = now.format(DT_FMT).to_string();
    let result = conn.query_row(
        "SELECT user_id, messages, last_activity, expires_at
         FROM conversations WHERE user_id = ?1 AND expires_at > ?2",
        params![user_id, now],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        },
    );

    match result {
        Ok((user_id, messages_json, last_activity_str, expires_at_str)) => {
            let messages: Vec<ConversationMessage> =
                serde_json::from_str(&messages_json).unwrap_or_default();
            let last_activity = NaiveDateTime::parse_from_str(&last_activity_str, DT_FMT)
                .unwrap_or(NaiveDateTime::MIN);
            let expires_at =
                NaiveDateTime::parse_from_str(&expires_at_str, DT_FMT).unwrap_or(NaiveDateTime::MIN);

            Ok(Some(Conversation {
                user_id,
                messages,
                last_activity,
                expires_at,
            }))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn save_conversation(conn: &Connection, conv: &Conversation) -> anyhow::Result<()> {
    let messages_json = serde_json::to_string(&conv.messages)?;

    conn.execute(
        "INSERT INTO conversations (user_id, messages, last_activity, expires_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id) DO UPDATE SET
           messages = excluded.messages,
           last_activity = excluded.last_activity,
           expires_at = excluded.expires_at",
        params![
            conv.user_id,
            messages_json,
            conv.last_activity.format(DT_FMT).to_string(),
            conv.expires_at.format(DT_FMT).to_string()
        ],
    )?;
    Ok(())
}

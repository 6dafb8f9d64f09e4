pub mod queries;

use anyhow::Context;
use rusqlite::Connection;

/// Schema is embedded rather than loaded from disk so `:memory:` databases
/// used in tests come up fully migrated.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    api_token TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS bookings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    technician_name TEXT NOT NULL,
    service TEXT NOT NULL,
    booking_datetime TEXT NOT NULL,
    user_id INTEGER REFERENCES users(id),
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Backstop against double-booking: one booking per technician per exact
-- start time, enforced even if two writers race past the overlap pre-check.
CREATE UNIQUE INDEX IF NOT EXISTS idx_bookings_slot
    ON bookings (technician_name, booking_datetime);

CREATE INDEX IF NOT EXISTS idx_bookings_user ON bookings (user_id);

CREATE TABLE IF NOT EXISTS conversations (
    user_id INTEGER PRIMARY KEY,
    messages TEXT NOT NULL,
    last_activity TEXT NOT NULL,
    expires_at TEXT NOT NULL
);
";

pub fn init_db(path: &str) -> anyhow::Result<Connection> {
    let conn = Connection::open(path).context("failed to open database")?;

    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
        .context("failed to set database pragmas")?;

    conn.execute_batch(SCHEMA)
        .context("failed to apply schema")?;

    Ok(conn)
}

/// Seeds the three demo technicians on first boot so the chat assistant has
/// something to talk about against an empty database.
pub fn seed_demo_bookings(conn: &Connection) -> anyhow::Result<()> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM bookings", [], |row| row.get(0))?;
    if count > 0 {
        return Ok(());
    }

    let seed = [
        ("Nicolas Woollett", "Plumber", "2022-10-15 10:00:00"),
        ("Franky Flay", "Electrician", "2022-10-16 18:00:00"),
        ("Griselda Dickson", "Welder", "2022-10-18 11:00:00"),
    ];

    for (technician, service, datetime) in seed {
        conn.execute(
            "INSERT INTO bookings (technician_name, service, booking_datetime, user_id)
             VALUES (?1, ?2, ?3, NULL)",
            rusqlite::params![technician, service, datetime],
        )?;
    }

    tracing::info!("seeded demo bookings");
    Ok(())
}

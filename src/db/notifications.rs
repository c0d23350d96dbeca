use rusqlite::{params, Connection};

use crate::db::models::Notification;

pub const FOLLOW: &str = "follow";
pub const FOLLOW_REQUEST: &str = "follow_request";
pub const FOLLOW_ACCEPTED: &str = "follow_accepted";
pub const GROUP_JOIN_REQUEST: &str = "group_join_request";
pub const GROUP_ACCEPTED: &str = "group_accepted";
pub const GROUP_EVENT: &str = "group_event";
pub const COMMENT: &str = "comment";

pub fn create(
    conn: &Connection,
    user_id: &str,
    kind: &str,
    message: &str,
    related_id: Option<&str>,
) -> rusqlite::Result<()> {
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO notifications (id, user_id, kind, message, related_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, user_id, kind, message, related_id],
    )?;
    Ok(())
}

pub fn list(
    conn: &Connection,
    user_id: &str,
    limit: i64,
    offset: i64,
) -> rusqlite::Result<Vec<Notification>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, kind, message, related_id, is_read, created_at FROM notifications
         WHERE user_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2 OFFSET ?3",
    )?;
    let rows = stmt.query_map(params![user_id, limit, offset], |row| {
        Ok(Notification {
            id: row.get(0)?,
            user_id: row.get(1)?,
            kind: row.get(2)?,
            message: row.get(3)?,
            related_id: row.get(4)?,
            is_read: row.get(5)?,
            created_at: row.get(6)?,
        })
    })?;
    rows.collect()
}

pub fn unread_count(conn: &Connection, user_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
        params![user_id],
        |row| row.get(0),
    )
}

/// Scoped to the owner: marking someone else's notification touches nothing.
pub fn mark_read(conn: &Connection, id: &str, user_id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )
}

pub fn mark_all_read(conn: &Connection, user_id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
        params![user_id],
    )
}

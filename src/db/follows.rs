use rusqlite::{params, Connection, OptionalExtension};

use crate::db::models::{FollowStatus, UserSummary};
use crate::db::users::map_summary;

pub fn status(
    conn: &Connection,
    follower_id: &str,
    following_id: &str,
) -> rusqlite::Result<Option<FollowStatus>> {
    conn.query_row(
        "SELECT status FROM follows WHERE follower_id = ?1 AND following_id = ?2",
        params![follower_id, following_id],
        |row| row.get(0),
    )
    .optional()
}

/// True only for an accepted edge; pending requests grant nothing.
pub fn is_following(
    conn: &Connection,
    follower_id: &str,
    following_id: &str,
) -> rusqlite::Result<bool> {
    Ok(status(conn, follower_id, following_id)? == Some(FollowStatus::Accepted))
}

/// Inserts the edge. Returns false when an edge (pending or accepted) already exists.
pub fn insert(
    conn: &Connection,
    follower_id: &str,
    following_id: &str,
    status: FollowStatus,
) -> rusqlite::Result<bool> {
    let rows = conn.execute(
        "INSERT INTO follows (follower_id, following_id, status) VALUES (?1, ?2, ?3)
         ON CONFLICT(follower_id, following_id) DO NOTHING",
        params![follower_id, following_id, status],
    )?;
    Ok(rows > 0)
}

pub fn delete(conn: &Connection, follower_id: &str, following_id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM follows WHERE follower_id = ?1 AND following_id = ?2",
        params![follower_id, following_id],
    )
}

pub fn accept(conn: &Connection, follower_id: &str, following_id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE follows SET status = 'accepted'
         WHERE follower_id = ?1 AND following_id = ?2 AND status = 'pending'",
        params![follower_id, following_id],
    )
}

pub fn decline(
    conn: &Connection,
    follower_id: &str,
    following_id: &str,
) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM follows WHERE follower_id = ?1 AND following_id = ?2 AND status = 'pending'",
        params![follower_id, following_id],
    )
}

/// Turning a profile public settles every outstanding request for it.
pub fn accept_all_pending(conn: &Connection, following_id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE follows SET status = 'accepted' WHERE following_id = ?1 AND status = 'pending'",
        params![following_id],
    )
}

fn list(conn: &Connection, sql: &str, user_id: &str) -> rusqlite::Result<Vec<UserSummary>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![user_id], |row| map_summary(row, 0))?;
    rows.collect()
}

pub fn followers(conn: &Connection, user_id: &str) -> rusqlite::Result<Vec<UserSummary>> {
    list(
        conn,
        "SELECT u.id, u.first_name, u.last_name, u.nickname, u.avatar_url
         FROM follows f JOIN users u ON u.id = f.follower_id
         WHERE f.following_id = ?1 AND f.status = 'accepted'
         ORDER BY f.created_at DESC",
        user_id,
    )
}

pub fn following(conn: &Connection, user_id: &str) -> rusqlite::Result<Vec<UserSummary>> {
    list(
        conn,
        "SELECT u.id, u.first_name, u.last_name, u.nickname, u.avatar_url
         FROM follows f JOIN users u ON u.id = f.following_id
         WHERE f.follower_id = ?1 AND f.status = 'accepted'
         ORDER BY f.created_at DESC",
        user_id,
    )
}

pub fn pending_requests(conn: &Connection, user_id: &str) -> rusqlite::Result<Vec<UserSummary>> {
    list(
        conn,
        "SELECT u.id, u.first_name, u.last_name, u.nickname, u.avatar_url
         FROM follows f JOIN users u ON u.id = f.follower_id
         WHERE f.following_id = ?1 AND f.status = 'pending'
         ORDER BY f.created_at DESC",
        user_id,
    )
}

/// Users with no edge from `user_id` in either state, friends of friends first.
pub fn suggestions(
    conn: &Connection,
    user_id: &str,
    limit: i64,
) -> rusqlite::Result<Vec<UserSummary>> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.first_name, u.last_name, u.nickname, u.avatar_url
         FROM users u
         WHERE u.id != ?1
           AND NOT EXISTS (
               SELECT 1 FROM follows f WHERE f.follower_id = ?1 AND f.following_id = u.id)
         ORDER BY (
               SELECT COUNT(*) FROM follows mine
               JOIN follows theirs ON theirs.follower_id = mine.following_id
               WHERE mine.follower_id = ?1 AND mine.status = 'accepted'
                 AND theirs.following_id = u.id AND theirs.status = 'accepted') DESC,
             u.created_at DESC, u.id
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![user_id, limit], |row| map_summary(row, 0))?;
    rows.collect()
}

pub fn counts(conn: &Connection, user_id: &str) -> rusqlite::Result<(i64, i64)> {
    conn.query_row(
        "SELECT
            (SELECT COUNT(*) FROM follows WHERE following_id = ?1 AND status = 'accepted'),
            (SELECT COUNT(*) FROM follows WHERE follower_id = ?1 AND status = 'accepted')",
        params![user_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
}

use rusqlite::{params, Connection, OptionalExtension};

use crate::db::models::{ReactionKind, ReactionSummary, TargetType};

/// Table and key column holding reactions for each kind of target.
fn table(target: TargetType) -> (&'static str, &'static str) {
    match target {
        TargetType::Post => ("post_reactions", "post_id"),
        TargetType::Comment => ("comment_reactions", "comment_id"),
    }
}

pub fn current(
    conn: &Connection,
    target: TargetType,
    target_id: &str,
    user_id: &str,
) -> rusqlite::Result<Option<ReactionKind>> {
    let (table, column) = table(target);
    conn.query_row(
        &format!("SELECT kind FROM {table} WHERE {column} = ?1 AND user_id = ?2"),
        params![target_id, user_id],
        |row| row.get(0),
    )
    .optional()
}

/// Applies a like/dislike: the same kind twice removes it, a different kind
/// replaces it. Returns the user's reaction afterwards.
pub fn toggle(
    conn: &Connection,
    target: TargetType,
    target_id: &str,
    user_id: &str,
    kind: ReactionKind,
) -> rusqlite::Result<Option<ReactionKind>> {
    let (table, column) = table(target);

    if current(conn, target, target_id, user_id)? == Some(kind) {
        conn.execute(
            &format!("DELETE FROM {table} WHERE {column} = ?1 AND user_id = ?2"),
            params![target_id, user_id],
        )?;
        return Ok(None);
    }

    conn.execute(
        &format!(
            "INSERT INTO {table} ({column}, user_id, kind) VALUES (?1, ?2, ?3)
             ON CONFLICT({column}, user_id) DO UPDATE SET kind = excluded.kind"
        ),
        params![target_id, user_id, kind],
    )?;
    Ok(Some(kind))
}

pub fn summary(
    conn: &Connection,
    target: TargetType,
    target_id: &str,
    viewer: Option<&str>,
) -> rusqlite::Result<ReactionSummary> {
    let (table, column) = table(target);
    conn.query_row(
        &format!(
            "SELECT
                (SELECT COUNT(*) FROM {table} WHERE {column} = ?1 AND kind = 'like'),
                (SELECT COUNT(*) FROM {table} WHERE {column} = ?1 AND kind = 'dislike'),
                (SELECT kind FROM {table} WHERE {column} = ?1 AND user_id = ?2)"
        ),
        params![target_id, viewer],
        |row| {
            Ok(ReactionSummary {
                like_count: row.get(0)?,
                dislike_count: row.get(1)?,
                user_reaction: row.get(2)?,
            })
        },
    )
}

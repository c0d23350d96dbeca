use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::Comment;
use crate::db::users::map_summary;

const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, c.user_id, c.parent_id, c.content,
        c.image_url, c.created_at, c.updated_at,
        u.id, u.first_name, u.last_name, u.nickname, u.avatar_url
     FROM comments c JOIN users u ON u.id = c.user_id";

fn map_comment(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        post_id: row.get(1)?,
        user_id: row.get(2)?,
        parent_id: row.get(3)?,
        content: row.get(4)?,
        image_url: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        author: Some(map_summary(row, 8)?),
    })
}

pub fn insert(
    conn: &Connection,
    post_id: &str,
    user_id: &str,
    parent_id: Option<&str>,
    content: &str,
    image_url: Option<&str>,
) -> rusqlite::Result<Comment> {
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO comments (id, post_id, user_id, parent_id, content, image_url)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, post_id, user_id, parent_id, content, image_url],
    )?;

    find(conn, &id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

pub fn find(conn: &Connection, id: &str) -> rusqlite::Result<Option<Comment>> {
    conn.query_row(
        &format!("{COMMENT_SELECT} WHERE c.id = ?1 AND c.deleted_at IS NULL"),
        params![id],
        map_comment,
    )
    .optional()
}

/// Top-level comments when `parent_id` is None, otherwise direct replies. Oldest first.
pub fn list(
    conn: &Connection,
    post_id: &str,
    parent_id: Option<&str>,
    limit: i64,
    offset: i64,
) -> rusqlite::Result<Vec<Comment>> {
    let mut stmt = conn.prepare(&format!(
        "{COMMENT_SELECT}
         WHERE c.post_id = ?1 AND c.deleted_at IS NULL
           AND ((?2 IS NULL AND c.parent_id IS NULL) OR c.parent_id = ?2)
         ORDER BY c.created_at, c.id LIMIT ?3 OFFSET ?4"
    ))?;
    let rows = stmt.query_map(params![post_id, parent_id, limit, offset], map_comment)?;
    rows.collect()
}

pub fn update(
    conn: &Connection,
    id: &str,
    content: &str,
    image_url: Option<&str>,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE comments SET content = ?2, image_url = ?3, updated_at = datetime('now')
         WHERE id = ?1 AND deleted_at IS NULL",
        params![id, content, image_url],
    )
}

pub fn soft_delete(conn: &Connection, id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE comments SET deleted_at = datetime('now') WHERE id = ?1 AND deleted_at IS NULL",
        params![id],
    )
}

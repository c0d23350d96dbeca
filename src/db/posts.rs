use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::{Post, Privacy};
use crate::db::users::map_summary;

pub struct NewPost<'a> {
    pub user_id: &'a str,
    pub group_id: Option<&'a str>,
    pub content: &'a str,
    pub image_url: Option<&'a str>,
    pub privacy: Privacy,
    pub allowed_viewers: &'a [String],
}

const POST_SELECT: &str = "SELECT p.id, p.user_id, p.group_id, p.content, p.image_url, p.privacy,
        p.created_at, p.updated_at,
        u.id, u.first_name, u.last_name, u.nickname, u.avatar_url,
        (SELECT COUNT(*) FROM comments c
         WHERE c.post_id = p.id AND c.deleted_at IS NULL)
     FROM posts p JOIN users u ON u.id = p.user_id";

/// SQL rendition of `visibility::can_view` over a posts row aliased `p`, with
/// `?1` bound to the viewer id (NULL for anonymous). Keep the two in step.
pub(crate) const VISIBLE_TO_VIEWER: &str = "(
        p.user_id = ?1
        OR (p.group_id IS NOT NULL AND EXISTS (
            SELECT 1 FROM group_members gm
            WHERE gm.group_id = p.group_id AND gm.user_id = ?1 AND gm.status = 'accepted'))
        OR (p.group_id IS NULL AND (
            p.privacy = 'public'
            OR (p.privacy = 'followers' AND EXISTS (
                SELECT 1 FROM follows f
                WHERE f.follower_id = ?1 AND f.following_id = p.user_id AND f.status = 'accepted'))
            OR (p.privacy = 'private_list' AND EXISTS (
                SELECT 1 FROM post_allowed_viewers v
                WHERE v.post_id = p.id AND v.user_id = ?1))))
    )";

fn map_post(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        user_id: row.get(1)?,
        group_id: row.get(2)?,
        content: row.get(3)?,
        image_url: row.get(4)?,
        privacy: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        author: Some(map_summary(row, 8)?),
        allowed_viewers: Vec::new(),
        comment_count: row.get(13)?,
    })
}

/// Inserts the post and its allow-list. Callers pass a transaction.
pub fn insert(conn: &Connection, new: &NewPost<'_>) -> rusqlite::Result<Post> {
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO posts (id, user_id, group_id, content, image_url, privacy)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, new.user_id, new.group_id, new.content, new.image_url, new.privacy],
    )?;
    if new.privacy == Privacy::PrivateList {
        replace_allowed_viewers(conn, &id, new.allowed_viewers)?;
    }

    find(conn, &id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

/// Loads a live (not soft-deleted) post with its author and allow-list.
pub fn find(conn: &Connection, id: &str) -> rusqlite::Result<Option<Post>> {
    let post = conn
        .query_row(
            &format!("{POST_SELECT} WHERE p.id = ?1 AND p.deleted_at IS NULL"),
            params![id],
            map_post,
        )
        .optional()?;

    match post {
        Some(mut post) => {
            post.allowed_viewers = allowed_viewers(conn, &post.id)?;
            Ok(Some(post))
        }
        None => Ok(None),
    }
}

pub fn allowed_viewers(conn: &Connection, post_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM post_allowed_viewers WHERE post_id = ?1 ORDER BY user_id",
    )?;
    let rows = stmt.query_map(params![post_id], |row| row.get(0))?;
    rows.collect()
}

pub fn is_allowed_viewer(
    conn: &Connection,
    post_id: &str,
    user_id: &str,
) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM post_allowed_viewers WHERE post_id = ?1 AND user_id = ?2",
        params![post_id, user_id],
        |row| row.get(0),
    )
}

pub fn replace_allowed_viewers(
    conn: &Connection,
    post_id: &str,
    viewers: &[String],
) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM post_allowed_viewers WHERE post_id = ?1",
        params![post_id],
    )?;
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO post_allowed_viewers (post_id, user_id) VALUES (?1, ?2)",
    )?;
    for viewer in viewers {
        stmt.execute(params![post_id, viewer])?;
    }
    Ok(())
}

/// Live posts visible to `viewer`, newest first.
pub fn feed(
    conn: &Connection,
    viewer: Option<&str>,
    limit: i64,
    offset: i64,
) -> rusqlite::Result<Vec<Post>> {
    let mut stmt = conn.prepare(&format!(
        "{POST_SELECT} WHERE p.deleted_at IS NULL AND {VISIBLE_TO_VIEWER}
         ORDER BY p.created_at DESC, p.id DESC LIMIT ?2 OFFSET ?3"
    ))?;
    let rows = stmt.query_map(params![viewer, limit, offset], map_post)?;
    rows.collect()
}

/// Live posts authored by `author_id` that `viewer` may read.
pub fn by_author(
    conn: &Connection,
    author_id: &str,
    viewer: Option<&str>,
    limit: i64,
    offset: i64,
) -> rusqlite::Result<Vec<Post>> {
    let mut stmt = conn.prepare(&format!(
        "{POST_SELECT} WHERE p.deleted_at IS NULL AND p.user_id = ?4 AND {VISIBLE_TO_VIEWER}
         ORDER BY p.created_at DESC, p.id DESC LIMIT ?2 OFFSET ?3"
    ))?;
    let rows = stmt.query_map(params![viewer, limit, offset, author_id], map_post)?;
    rows.collect()
}

pub fn by_group(
    conn: &Connection,
    group_id: &str,
    limit: i64,
    offset: i64,
) -> rusqlite::Result<Vec<Post>> {
    let mut stmt = conn.prepare(&format!(
        "{POST_SELECT} WHERE p.deleted_at IS NULL AND p.group_id = ?1
         ORDER BY p.created_at DESC, p.id DESC LIMIT ?2 OFFSET ?3"
    ))?;
    let rows = stmt.query_map(params![group_id, limit, offset], map_post)?;
    rows.collect()
}

pub fn update(
    conn: &Connection,
    id: &str,
    content: &str,
    image_url: Option<&str>,
    privacy: Privacy,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE posts SET content = ?2, image_url = ?3, privacy = ?4, updated_at = datetime('now')
         WHERE id = ?1 AND deleted_at IS NULL",
        params![id, content, image_url, privacy],
    )
}

pub fn soft_delete(conn: &Connection, id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE posts SET deleted_at = datetime('now') WHERE id = ?1 AND deleted_at IS NULL",
        params![id],
    )
}

use rusqlite::types::ToSql;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::{Activity, ActivityKind, ActivitySettings, TargetType};
use crate::db::posts::VISIBLE_TO_VIEWER;
use crate::db::users::map_summary;

const PREVIEW_CHARS: usize = 100;

pub struct NewActivity<'a> {
    pub user_id: &'a str,
    pub kind: ActivityKind,
    pub target_type: TargetType,
    pub target_id: &'a str,
    /// Owner of the target; dropped when it is the actor.
    pub target_user_id: &'a str,
    pub post_id: &'a str,
    pub content: Option<&'a str>,
}

pub struct ActivityFilter<'a> {
    pub kinds: &'a [ActivityKind],
    pub include_hidden: bool,
}

/// Live targets only, and only posts the viewer (`?1`) may read. `?2` is the actor.
const ACTIVITY_SELECT: &str = "SELECT a.id, a.user_id, a.kind, a.target_type, a.target_id,
        a.target_user_id, a.post_id, a.content_preview, a.is_hidden, a.created_at,
        u.id, u.first_name, u.last_name, u.nickname, u.avatar_url
     FROM user_activities a
     JOIN users u ON u.id = a.user_id
     JOIN posts p ON p.id = a.post_id AND p.deleted_at IS NULL
     LEFT JOIN comments c ON a.target_type = 'comment' AND c.id = a.target_id
     WHERE a.user_id = ?2
       AND (a.target_type = 'post' OR (c.id IS NOT NULL AND c.deleted_at IS NULL))";

fn map_activity(row: &Row<'_>) -> rusqlite::Result<Activity> {
    Ok(Activity {
        id: row.get(0)?,
        user_id: row.get(1)?,
        activity_type: row.get(2)?,
        target_type: row.get(3)?,
        target_id: row.get(4)?,
        target_user_id: row.get(5)?,
        post_id: row.get(6)?,
        content_preview: row.get(7)?,
        is_hidden: row.get(8)?,
        created_at: row.get(9)?,
        user: map_summary(row, 10)?,
        post: None,
        comment: None,
    })
}

/// First 100 characters, with an ellipsis when cut.
pub fn preview(content: &str) -> String {
    match content.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

pub fn record(conn: &Connection, new: &NewActivity<'_>) -> rusqlite::Result<String> {
    let id = uuid::Uuid::now_v7().to_string();
    let target_user = Some(new.target_user_id).filter(|owner| *owner != new.user_id);
    let excerpt = new.content.map(preview).filter(|p| !p.is_empty());
    conn.execute(
        "INSERT INTO user_activities
            (id, user_id, kind, target_type, target_id, target_user_id, post_id, content_preview)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            id,
            new.user_id,
            new.kind,
            new.target_type,
            new.target_id,
            target_user,
            new.post_id,
            excerpt,
        ],
    )?;
    Ok(id)
}

/// Drops the user's reaction entries for one target, before a toggle records the new state.
pub fn forget_reactions(
    conn: &Connection,
    user_id: &str,
    target_type: TargetType,
    target_id: &str,
) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM user_activities
         WHERE user_id = ?1 AND target_type = ?2 AND target_id = ?3
           AND kind NOT IN ('post_created', 'comment_created')",
        params![user_id, target_type, target_id],
    )
}

/// Activities of `user_id` as `viewer` may see them, newest first.
pub fn list(
    conn: &Connection,
    viewer: &str,
    user_id: &str,
    filter: &ActivityFilter<'_>,
    limit: i64,
    offset: i64,
) -> rusqlite::Result<Vec<Activity>> {
    if filter.kinds.is_empty() {
        return Ok(Vec::new());
    }

    let kinds = (0..filter.kinds.len())
        .map(|i| format!("?{}", i + 6))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "{ACTIVITY_SELECT}
           AND (?3 OR a.is_hidden = 0)
           AND a.kind IN ({kinds})
           AND {VISIBLE_TO_VIEWER}
         ORDER BY a.created_at DESC, a.id DESC LIMIT ?4 OFFSET ?5"
    );

    let mut args: Vec<&dyn ToSql> =
        vec![&viewer, &user_id, &filter.include_hidden, &limit, &offset];
    args.extend(filter.kinds.iter().map(|k| k as &dyn ToSql));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(args.as_slice(), map_activity)?;
    rows.collect()
}

/// Only the owner's own entries change; anything else reports zero rows.
pub fn set_hidden(
    conn: &Connection,
    id: &str,
    user_id: &str,
    hidden: bool,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE user_activities SET is_hidden = ?3 WHERE id = ?1 AND user_id = ?2",
        params![id, user_id, hidden],
    )
}

/// Stored settings, or the defaults when the user never saved any.
pub fn settings(conn: &Connection, user_id: &str) -> rusqlite::Result<ActivitySettings> {
    let stored = conn
        .query_row(
            "SELECT show_posts, show_comments, show_likes, show_to_followers_only
             FROM user_activity_settings WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(ActivitySettings {
                    show_posts: row.get(0)?,
                    show_comments: row.get(1)?,
                    show_likes: row.get(2)?,
                    show_to_followers_only: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(stored.unwrap_or_default())
}

pub fn save_settings(
    conn: &Connection,
    user_id: &str,
    settings: &ActivitySettings,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO user_activity_settings
            (user_id, show_posts, show_comments, show_likes, show_to_followers_only)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(user_id) DO UPDATE SET
            show_posts = excluded.show_posts,
            show_comments = excluded.show_comments,
            show_likes = excluded.show_likes,
            show_to_followers_only = excluded.show_to_followers_only,
            updated_at = datetime('now')",
        params![
            user_id,
            settings.show_posts,
            settings.show_comments,
            settings.show_likes,
            settings.show_to_followers_only,
        ],
    )?;
    Ok(())
}

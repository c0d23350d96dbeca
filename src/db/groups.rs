use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::{EventResponse, Group, GroupEvent, GroupMember, MemberStatus};
use crate::db::users::map_summary;

fn map_group(row: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        creator_id: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

/// Creates the group and enrolls the creator as an accepted member.
/// Callers pass a transaction so both rows land together.
pub fn create(
    conn: &Connection,
    creator_id: &str,
    title: &str,
    description: &str,
) -> rusqlite::Result<Group> {
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO groups (id, title, description, creator_id) VALUES (?1, ?2, ?3, ?4)",
        params![id, title, description, creator_id],
    )?;
    add_member(conn, &id, creator_id, MemberStatus::Accepted)?;

    find(conn, &id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

pub fn find(conn: &Connection, id: &str) -> rusqlite::Result<Option<Group>> {
    conn.query_row(
        "SELECT id, title, description, creator_id, created_at, updated_at
         FROM groups WHERE id = ?1",
        params![id],
        map_group,
    )
    .optional()
}

pub fn list(conn: &Connection, limit: i64, offset: i64) -> rusqlite::Result<Vec<Group>> {
    let mut stmt = conn.prepare(
        "SELECT id, title, description, creator_id, created_at, updated_at FROM groups
         ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
    )?;
    let rows = stmt.query_map(params![limit, offset], map_group)?;
    rows.collect()
}

pub fn update(
    conn: &Connection,
    id: &str,
    title: &str,
    description: &str,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE groups SET title = ?2, description = ?3, updated_at = datetime('now')
         WHERE id = ?1",
        params![id, title, description],
    )
}

pub fn delete(conn: &Connection, id: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM groups WHERE id = ?1", params![id])
}

// -- Membership --

pub fn member_status(
    conn: &Connection,
    group_id: &str,
    user_id: &str,
) -> rusqlite::Result<Option<MemberStatus>> {
    conn.query_row(
        "SELECT status FROM group_members WHERE group_id = ?1 AND user_id = ?2",
        params![group_id, user_id],
        |row| row.get(0),
    )
    .optional()
}

pub fn is_accepted_member(
    conn: &Connection,
    group_id: &str,
    user_id: &str,
) -> rusqlite::Result<bool> {
    Ok(member_status(conn, group_id, user_id)? == Some(MemberStatus::Accepted))
}

/// Returns false when the user already has a membership row (pending or accepted).
pub fn add_member(
    conn: &Connection,
    group_id: &str,
    user_id: &str,
    status: MemberStatus,
) -> rusqlite::Result<bool> {
    let rows = conn.execute(
        "INSERT INTO group_members (group_id, user_id, status) VALUES (?1, ?2, ?3)
         ON CONFLICT(group_id, user_id) DO NOTHING",
        params![group_id, user_id, status],
    )?;
    Ok(rows > 0)
}

pub fn accept_member(conn: &Connection, group_id: &str, user_id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE group_members SET status = 'accepted'
         WHERE group_id = ?1 AND user_id = ?2 AND status = 'pending'",
        params![group_id, user_id],
    )
}

pub fn remove_member(conn: &Connection, group_id: &str, user_id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
        params![group_id, user_id],
    )
}

pub fn members(conn: &Connection, group_id: &str) -> rusqlite::Result<Vec<GroupMember>> {
    let mut stmt = conn.prepare(
        "SELECT gm.group_id, gm.user_id, gm.status, gm.created_at,
                u.id, u.first_name, u.last_name, u.nickname, u.avatar_url
         FROM group_members gm JOIN users u ON u.id = gm.user_id
         WHERE gm.group_id = ?1
         ORDER BY gm.status, gm.created_at",
    )?;
    let rows = stmt.query_map(params![group_id], |row| {
        Ok(GroupMember {
            group_id: row.get(0)?,
            user_id: row.get(1)?,
            status: row.get(2)?,
            created_at: row.get(3)?,
            user: map_summary(row, 4)?,
        })
    })?;
    rows.collect()
}

pub fn member_count(conn: &Connection, group_id: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM group_members WHERE group_id = ?1 AND status = 'accepted'",
        params![group_id],
        |row| row.get(0),
    )
}

pub fn accepted_member_ids(conn: &Connection, group_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM group_members WHERE group_id = ?1 AND status = 'accepted'",
    )?;
    let rows = stmt.query_map(params![group_id], |row| row.get(0))?;
    rows.collect()
}

// -- Events --

fn map_event(row: &Row<'_>) -> rusqlite::Result<GroupEvent> {
    Ok(GroupEvent {
        id: row.get(0)?,
        group_id: row.get(1)?,
        creator_id: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        event_date: row.get(5)?,
        created_at: row.get(6)?,
        going: row.get(7)?,
        not_going: row.get(8)?,
    })
}

const EVENT_SELECT: &str = "SELECT e.id, e.group_id, e.creator_id, e.title, e.description,
        e.event_date, e.created_at,
        (SELECT COUNT(*) FROM event_responses r
          WHERE r.event_id = e.id AND r.response = 'going'),
        (SELECT COUNT(*) FROM event_responses r
          WHERE r.event_id = e.id AND r.response = 'not_going')
     FROM group_events e";

pub fn create_event(
    conn: &Connection,
    group_id: &str,
    creator_id: &str,
    title: &str,
    description: &str,
    event_date: &str,
) -> rusqlite::Result<GroupEvent> {
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO group_events (id, group_id, creator_id, title, description, event_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, group_id, creator_id, title, description, event_date],
    )?;

    find_event(conn, &id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

pub fn find_event(conn: &Connection, id: &str) -> rusqlite::Result<Option<GroupEvent>> {
    conn.query_row(&format!("{EVENT_SELECT} WHERE e.id = ?1"), params![id], map_event)
        .optional()
}

pub fn list_events(conn: &Connection, group_id: &str) -> rusqlite::Result<Vec<GroupEvent>> {
    let mut stmt = conn.prepare(&format!(
        "{EVENT_SELECT} WHERE e.group_id = ?1 ORDER BY e.event_date, e.id"
    ))?;
    let rows = stmt.query_map(params![group_id], map_event)?;
    rows.collect()
}

/// Records or replaces the user's answer for the event.
pub fn respond(
    conn: &Connection,
    event_id: &str,
    user_id: &str,
    response: EventResponse,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO event_responses (event_id, user_id, response) VALUES (?1, ?2, ?3)
         ON CONFLICT(event_id, user_id) DO UPDATE SET response = excluded.response",
        params![event_id, user_id, response],
    )?;
    Ok(())
}

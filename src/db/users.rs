use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::models::{User, UserSummary};

const USER_COLUMNS: &str = "id, email, password_hash, first_name, last_name, date_of_birth, \
     nickname, about_me, avatar_url, is_public, created_at, updated_at";

/// Row data for a freshly registered user. Email is expected to be normalized already.
pub struct NewUserRecord<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub date_of_birth: &'a str,
    pub nickname: Option<&'a str>,
    pub about_me: Option<&'a str>,
    pub avatar_url: Option<&'a str>,
    pub is_public: bool,
}

#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub nickname: Option<String>,
    pub about_me: Option<String>,
    pub avatar_url: Option<String>,
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        date_of_birth: row.get(5)?,
        nickname: row.get(6)?,
        about_me: row.get(7)?,
        avatar_url: row.get(8)?,
        is_public: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

/// Maps `id, first_name, last_name, nickname, avatar_url` starting at `offset`.
pub fn map_summary(row: &Row<'_>, offset: usize) -> rusqlite::Result<UserSummary> {
    Ok(UserSummary {
        id: row.get(offset)?,
        first_name: row.get(offset + 1)?,
        last_name: row.get(offset + 2)?,
        nickname: row.get(offset + 3)?,
        avatar_url: row.get(offset + 4)?,
    })
}

pub fn insert(conn: &Connection, new: &NewUserRecord<'_>) -> rusqlite::Result<User> {
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO users (id, email, password_hash, first_name, last_name, date_of_birth,
                            nickname, about_me, avatar_url, is_public)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            id,
            new.email,
            new.password_hash,
            new.first_name,
            new.last_name,
            new.date_of_birth,
            new.nickname,
            new.about_me,
            new.avatar_url,
            new.is_public,
        ],
    )?;

    find_by_id(conn, &id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

pub fn find_by_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        params![id],
        map_user,
    )
    .optional()
}

pub fn find_by_email(conn: &Connection, email: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
        params![email],
        map_user,
    )
    .optional()
}

pub fn email_exists(conn: &Connection, email: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE email = ?1",
        params![email],
        |row| row.get(0),
    )
}

pub fn exists(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )
}

pub fn summary(conn: &Connection, id: &str) -> rusqlite::Result<Option<UserSummary>> {
    conn.query_row(
        "SELECT id, first_name, last_name, nickname, avatar_url FROM users WHERE id = ?1",
        params![id],
        |row| map_summary(row, 0),
    )
    .optional()
}

/// Everyone except `user_id`, ordered by name.
pub fn list_others(
    conn: &Connection,
    user_id: &str,
    limit: i64,
    offset: i64,
) -> rusqlite::Result<Vec<UserSummary>> {
    let mut stmt = conn.prepare(
        "SELECT id, first_name, last_name, nickname, avatar_url FROM users
         WHERE id != ?1
         ORDER BY first_name COLLATE NOCASE, last_name COLLATE NOCASE, id
         LIMIT ?2 OFFSET ?3",
    )?;
    let rows = stmt.query_map(params![user_id, limit, offset], |row| map_summary(row, 0))?;
    rows.collect()
}

/// Applies the fields that are present; absent fields keep their stored value.
pub fn update_profile(
    conn: &Connection,
    id: &str,
    update: &ProfileUpdate,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE users SET
            first_name = COALESCE(?2, first_name),
            last_name = COALESCE(?3, last_name),
            date_of_birth = COALESCE(?4, date_of_birth),
            nickname = COALESCE(?5, nickname),
            about_me = COALESCE(?6, about_me),
            avatar_url = COALESCE(?7, avatar_url),
            updated_at = datetime('now')
         WHERE id = ?1",
        params![
            id,
            update.first_name,
            update.last_name,
            update.date_of_birth,
            update.nickname,
            update.about_me,
            update.avatar_url,
        ],
    )
}

pub fn set_public(conn: &Connection, id: &str, is_public: bool) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE users SET is_public = ?2, updated_at = datetime('now') WHERE id = ?1",
        params![id, is_public],
    )
}

pub fn set_password_hash(conn: &Connection, id: &str, hash: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE users SET password_hash = ?2, updated_at = datetime('now') WHERE id = ?1",
        params![id, hash],
    )
}

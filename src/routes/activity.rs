use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::activities::{self, ActivityFilter};
use crate::db::models::{Activity, ActivityKind, ActivitySettings, Post, TargetType};
use crate::db::{comments, follows, posts};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, JsonBody};
use crate::routes::posts::redact;
use crate::routes::users::load_viewable_profile;
use crate::routes::Pagination;
use crate::state::AppState;

const MAX_ACTIVITY_PAGE: i64 = 50;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/activity", get(my_activity))
        .route("/activity/posts", get(my_posts))
        .route("/activity/settings", get(get_settings).put(update_settings))
        .route("/activity/{id}", get(user_activity))
        .route("/activity/{id}/posts", get(user_posts))
        .route("/activity/{id}/hide", put(hide))
        .route("/activity/{id}/unhide", put(unhide))
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    /// Comma-separated activity types.
    pub types: Option<String>,
    pub show_hidden: Option<bool>,
}

impl ActivityQuery {
    fn pagination(&self) -> Pagination {
        Pagination {
            page: self.page,
            limit: self.limit.map(|l| l.min(MAX_ACTIVITY_PAGE)),
        }
    }

    fn kinds(&self) -> AppResult<Vec<ActivityKind>> {
        let Some(types) = self.types.as_deref() else {
            return Ok(ActivityKind::ALL.to_vec());
        };
        let mut kinds = Vec::new();
        for name in types.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let kind: ActivityKind = name
                .parse()
                .map_err(|_| AppError::BadRequest(format!("Unknown activity type: {name}")))?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        if kinds.is_empty() {
            return Ok(ActivityKind::ALL.to_vec());
        }
        Ok(kinds)
    }
}

#[derive(Deserialize)]
pub struct SettingsRequest {
    pub show_posts: Option<bool>,
    pub show_comments: Option<bool>,
    pub show_likes: Option<bool>,
    pub show_to_followers_only: Option<bool>,
}

#[derive(Serialize)]
pub struct ActivityPage {
    pub activities: Vec<Activity>,
    pub page: i64,
    pub limit: i64,
    pub total: usize,
}

#[derive(Serialize)]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub page: i64,
    pub limit: i64,
    pub total: usize,
}

/// Attaches the post and comment each entry points at, as `viewer` may see them.
fn attach_targets(
    conn: &Connection,
    viewer: &str,
    mut items: Vec<Activity>,
) -> rusqlite::Result<Vec<Activity>> {
    for item in &mut items {
        item.post = posts::find(conn, &item.post_id)?.map(|p| redact(p, Some(viewer)));
        if item.target_type == TargetType::Comment {
            item.comment = comments::find(conn, &item.target_id)?;
        }
    }
    Ok(items)
}

fn activity_page(
    conn: &Connection,
    viewer: &str,
    user_id: &str,
    filter: &ActivityFilter<'_>,
    page: &Pagination,
) -> AppResult<ActivityPage> {
    let items = activities::list(conn, viewer, user_id, filter, page.limit(), page.offset())?;
    let activities = attach_targets(conn, viewer, items)?;
    Ok(ActivityPage {
        total: activities.len(),
        activities,
        page: page.page.unwrap_or(1).max(1),
        limit: page.limit(),
    })
}

fn own_activity(conn: &Connection, me: &str, q: &ActivityQuery) -> AppResult<ActivityPage> {
    let kinds = q.kinds()?;
    let filter = ActivityFilter {
        kinds: &kinds,
        include_hidden: q.show_hidden.unwrap_or(false),
    };
    activity_page(conn, me, me, &filter, &q.pagination())
}

/// GET /api/activity: the caller's history; `show_hidden=true` includes hidden entries
async fn my_activity(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Query(q): Query<ActivityQuery>,
) -> AppResult<Json<ActivityPage>> {
    let conn = state.db.get()?;
    Ok(Json(own_activity(&conn, &me.id, &q)?))
}

/// GET /api/activity/{id}: filtered by the owner's activity settings
async fn user_activity(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
    Query(q): Query<ActivityQuery>,
) -> AppResult<Json<ActivityPage>> {
    let conn = state.db.get()?;
    if id == me.id {
        return Ok(Json(own_activity(&conn, &me.id, &q)?));
    }
    load_viewable_profile(&conn, &id, Some(&me.id))?;

    let settings = activities::settings(&conn, &id)?;
    let page = q.pagination();
    let requested = q.kinds()?;
    let kinds: Vec<ActivityKind> = if settings.show_to_followers_only
        && !follows::is_following(&conn, &me.id, &id)?
    {
        Vec::new()
    } else {
        requested.into_iter().filter(|k| settings.shows(*k)).collect()
    };

    let filter = ActivityFilter {
        kinds: &kinds,
        include_hidden: false,
    };
    Ok(Json(activity_page(&conn, &me.id, &id, &filter, &page)?))
}

fn post_page(
    conn: &Connection,
    author: &str,
    viewer: &str,
    page: &Pagination,
) -> AppResult<PostPage> {
    let items = posts::by_author(conn, author, Some(viewer), page.limit(), page.offset())?;
    Ok(PostPage {
        total: items.len(),
        posts: items,
        page: page.page.unwrap_or(1).max(1),
        limit: page.limit(),
    })
}

/// GET /api/activity/posts
async fn my_posts(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Query(q): Query<ActivityQuery>,
) -> AppResult<Json<PostPage>> {
    let conn = state.db.get()?;
    Ok(Json(post_page(&conn, &me.id, &me.id, &q.pagination())?))
}

/// GET /api/activity/{id}/posts: only the posts the caller may read
async fn user_posts(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
    Query(q): Query<ActivityQuery>,
) -> AppResult<Json<PostPage>> {
    let conn = state.db.get()?;
    load_viewable_profile(&conn, &id, Some(&me.id))?;
    Ok(Json(post_page(&conn, &id, &me.id, &q.pagination())?))
}

fn set_hidden(state: &AppState, id: &str, user_id: &str, hidden: bool) -> AppResult<()> {
    let conn = state.db.get()?;
    if activities::set_hidden(&conn, id, user_id, hidden)? == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

/// PUT /api/activity/{id}/hide
async fn hide(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    set_hidden(&state, &id, &me.id, true)?;
    Ok(Json(json!({ "success": true, "message": "Activity hidden successfully" })))
}

/// PUT /api/activity/{id}/unhide
async fn unhide(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    set_hidden(&state, &id, &me.id, false)?;
    Ok(Json(json!({ "success": true, "message": "Activity unhidden successfully" })))
}

/// GET /api/activity/settings
async fn get_settings(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
) -> AppResult<Json<ActivitySettings>> {
    let conn = state.db.get()?;
    Ok(Json(activities::settings(&conn, &me.id)?))
}

/// PUT /api/activity/settings: absent fields keep their current value
async fn update_settings(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    JsonBody(req): JsonBody<SettingsRequest>,
) -> AppResult<Json<ActivitySettings>> {
    let conn = state.db.get()?;
    let current = activities::settings(&conn, &me.id)?;
    let updated = ActivitySettings {
        show_posts: req.show_posts.unwrap_or(current.show_posts),
        show_comments: req.show_comments.unwrap_or(current.show_comments),
        show_likes: req.show_likes.unwrap_or(current.show_likes),
        show_to_followers_only: req
            .show_to_followers_only
            .unwrap_or(current.show_to_followers_only),
    };
    activities::save_settings(&conn, &me.id, &updated)?;
    Ok(Json(updated))
}

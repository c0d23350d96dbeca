use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::models::{EventResponse, Group, GroupEvent, GroupMember, MemberStatus, Post};
use crate::db::{groups, notifications, posts};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, JsonBody};
use crate::routes::Pagination;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/groups", get(list_groups).post(create_group))
        .route(
            "/groups/{id}",
            get(get_group).put(update_group).delete(delete_group),
        )
        .route("/groups/{id}/join", post(join_group).delete(leave_group))
        .route(
            "/groups/{id}/members/{user_id}",
            put(respond_to_request).delete(remove_member),
        )
        .route("/groups/{id}/posts", get(group_posts))
        .route("/groups/{id}/events", get(list_events).post(create_event))
        .route("/groups/events/{event_id}/respond", post(respond_to_event))
}

#[derive(Deserialize)]
pub struct GroupRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize)]
pub struct MemberAction {
    #[serde(default)]
    pub action: String,
}

#[derive(Deserialize)]
pub struct EventRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub event_date: String,
}

#[derive(Deserialize)]
pub struct EventReply {
    #[serde(default)]
    pub response: String,
}

#[derive(Serialize)]
pub struct GroupView {
    #[serde(flatten)]
    pub group: Group,
    pub member_count: i64,
    pub membership: Option<MemberStatus>,
}

#[derive(Serialize)]
pub struct GroupDetail {
    #[serde(flatten)]
    pub view: GroupView,
    pub members: Vec<GroupMember>,
}

fn view(conn: &Connection, group: Group, user_id: &str) -> rusqlite::Result<GroupView> {
    Ok(GroupView {
        member_count: groups::member_count(conn, &group.id)?,
        membership: groups::member_status(conn, &group.id, user_id)?,
        group,
    })
}

fn load_group(conn: &Connection, id: &str) -> AppResult<Group> {
    groups::find(conn, id)?.ok_or(AppError::NotFound)
}

fn require_creator(group: &Group, user_id: &str, what: &str) -> AppResult<()> {
    if group.creator_id == user_id {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!("Only the group creator can {what}")))
    }
}

fn require_member(conn: &Connection, group_id: &str, user_id: &str) -> AppResult<()> {
    if groups::is_accepted_member(conn, group_id, user_id)? {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Only group members can access this content".into(),
        ))
    }
}

fn validate_title(title: &str) -> AppResult<&str> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::BadRequest("Title is required".into()));
    }
    Ok(title)
}

/// Accepts `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM[:SS]` or RFC 3339.
fn validate_event_date(value: &str) -> AppResult<&str> {
    let value = value.trim();
    let ok = DateTime::parse_from_rfc3339(value).is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M").is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M").is_ok()
        || NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok();
    if ok {
        Ok(value)
    } else {
        Err(AppError::BadRequest("Invalid event date".into()))
    }
}

/// GET /api/groups
async fn list_groups(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Query(page): Query<Pagination>,
) -> AppResult<Json<Vec<GroupView>>> {
    let conn = state.db.get()?;
    let views = groups::list(&conn, page.limit(), page.offset())?
        .into_iter()
        .map(|g| view(&conn, g, &me.id))
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(Json(views))
}

/// POST /api/groups: the creator joins as an accepted member
async fn create_group(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    JsonBody(req): JsonBody<GroupRequest>,
) -> AppResult<(StatusCode, Json<GroupView>)> {
    let title = validate_title(&req.title)?;

    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;
    let group = groups::create(&tx, &me.id, title, req.description.trim())?;
    tx.commit()?;

    tracing::info!(group_id = %group.id, "Group created");
    Ok((StatusCode::CREATED, Json(view(&conn, group, &me.id)?)))
}

/// GET /api/groups/{id}: pending requests are listed for the creator only
async fn get_group(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<GroupDetail>> {
    let conn = state.db.get()?;
    let group = load_group(&conn, &id)?;
    let is_creator = group.creator_id == me.id;

    let members = groups::members(&conn, &id)?
        .into_iter()
        .filter(|m| is_creator || m.status == MemberStatus::Accepted)
        .collect();

    Ok(Json(GroupDetail {
        view: view(&conn, group, &me.id)?,
        members,
    }))
}

/// PUT /api/groups/{id}
async fn update_group(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<GroupRequest>,
) -> AppResult<Json<GroupView>> {
    let conn = state.db.get()?;
    let group = load_group(&conn, &id)?;
    require_creator(&group, &me.id, "edit this group")?;

    let title = validate_title(&req.title)?;
    groups::update(&conn, &id, title, req.description.trim())?;
    let group = load_group(&conn, &id)?;
    Ok(Json(view(&conn, group, &me.id)?))
}

/// DELETE /api/groups/{id}
async fn delete_group(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let group = load_group(&conn, &id)?;
    require_creator(&group, &me.id, "delete this group")?;

    groups::delete(&conn, &id)?;
    tracing::info!(group_id = %id, "Group deleted");
    Ok(Json(json!({ "success": true })))
}

/// POST /api/groups/{id}/join: files a pending request and notifies the creator
async fn join_group(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let mut conn = state.db.get()?;
    let group = load_group(&conn, &id)?;

    match groups::member_status(&conn, &id, &me.id)? {
        Some(MemberStatus::Accepted) => {
            return Err(AppError::Conflict("Already a member of this group".into()))
        }
        Some(MemberStatus::Pending) => {
            return Err(AppError::Conflict("Join request already pending".into()))
        }
        None => {}
    }

    let tx = conn.transaction()?;
    if !groups::add_member(&tx, &id, &me.id, MemberStatus::Pending)? {
        return Err(AppError::Conflict("Join request already pending".into()));
    }
    notifications::create(
        &tx,
        &group.creator_id,
        notifications::GROUP_JOIN_REQUEST,
        &format!("{} wants to join {}", me.display_name(), group.title),
        Some(&group.id),
    )?;
    tx.commit()?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": MemberStatus::Pending })),
    ))
}

/// DELETE /api/groups/{id}/join: leave, or withdraw a pending request
async fn leave_group(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let group = load_group(&conn, &id)?;
    if group.creator_id == me.id {
        return Err(AppError::BadRequest(
            "The group creator cannot leave the group".into(),
        ));
    }

    if groups::remove_member(&conn, &id, &me.id)? == 0 {
        return Err(AppError::NotFound);
    }
    Ok(Json(json!({ "success": true })))
}

/// PUT /api/groups/{id}/members/{user_id}: accept or decline a join request
async fn respond_to_request(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path((id, user_id)): Path<(String, String)>,
    JsonBody(req): JsonBody<MemberAction>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db.get()?;
    let group = load_group(&conn, &id)?;
    require_creator(&group, &me.id, "manage members")?;

    if groups::member_status(&conn, &id, &user_id)? != Some(MemberStatus::Pending) {
        return Err(AppError::NotFound);
    }

    match req.action.trim() {
        "accept" => {
            let tx = conn.transaction()?;
            groups::accept_member(&tx, &id, &user_id)?;
            notifications::create(
                &tx,
                &user_id,
                notifications::GROUP_ACCEPTED,
                &format!("Your request to join {} was accepted", group.title),
                Some(&group.id),
            )?;
            tx.commit()?;
            Ok(Json(json!({ "status": MemberStatus::Accepted })))
        }
        "decline" => {
            groups::remove_member(&conn, &id, &user_id)?;
            Ok(Json(json!({ "success": true })))
        }
        _ => Err(AppError::BadRequest("Action must be accept or decline".into())),
    }
}

/// DELETE /api/groups/{id}/members/{user_id}
async fn remove_member(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path((id, user_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let group = load_group(&conn, &id)?;
    require_creator(&group, &me.id, "remove members")?;
    if user_id == group.creator_id {
        return Err(AppError::BadRequest(
            "The group creator cannot be removed".into(),
        ));
    }

    if groups::remove_member(&conn, &id, &user_id)? == 0 {
        return Err(AppError::NotFound);
    }
    Ok(Json(json!({ "success": true })))
}

/// GET /api/groups/{id}/posts
async fn group_posts(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
    Query(page): Query<Pagination>,
) -> AppResult<Json<Vec<Post>>> {
    let conn = state.db.get()?;
    load_group(&conn, &id)?;
    require_member(&conn, &id, &me.id)?;
    Ok(Json(posts::by_group(&conn, &id, page.limit(), page.offset())?))
}

/// GET /api/groups/{id}/events
async fn list_events(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<GroupEvent>>> {
    let conn = state.db.get()?;
    load_group(&conn, &id)?;
    require_member(&conn, &id, &me.id)?;
    Ok(Json(groups::list_events(&conn, &id)?))
}

/// POST /api/groups/{id}/events: every other member is notified
async fn create_event(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<EventRequest>,
) -> AppResult<(StatusCode, Json<GroupEvent>)> {
    let title = validate_title(&req.title)?;
    let event_date = validate_event_date(&req.event_date)?;

    let mut conn = state.db.get()?;
    let group = load_group(&conn, &id)?;
    require_member(&conn, &id, &me.id)?;

    let tx = conn.transaction()?;
    let event = groups::create_event(
        &tx,
        &id,
        &me.id,
        title,
        req.description.trim(),
        event_date,
    )?;
    let message = format!("New event in {}: {}", group.title, event.title);
    for member in groups::accepted_member_ids(&tx, &id)? {
        if member != me.id {
            notifications::create(
                &tx,
                &member,
                notifications::GROUP_EVENT,
                &message,
                Some(&event.id),
            )?;
        }
    }
    tx.commit()?;

    Ok((StatusCode::CREATED, Json(event)))
}

/// POST /api/groups/events/{event_id}/respond: going / not_going, replaceable
async fn respond_to_event(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(event_id): Path<String>,
    JsonBody(req): JsonBody<EventReply>,
) -> AppResult<Json<GroupEvent>> {
    let response: EventResponse = req
        .response
        .trim()
        .parse()
        .map_err(|_| AppError::BadRequest("Response must be going or not_going".into()))?;

    let conn = state.db.get()?;
    let event = groups::find_event(&conn, &event_id)?.ok_or(AppError::NotFound)?;
    require_member(&conn, &event.group_id, &me.id)?;

    groups::respond(&conn, &event_id, &me.id, response)?;
    let event = groups::find_event(&conn, &event_id)?.ok_or(AppError::NotFound)?;
    Ok(Json(event))
}

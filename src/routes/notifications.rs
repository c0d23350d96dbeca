use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::db::models::Notification;
use crate::db::notifications;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::routes::Pagination;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list))
        .route("/notifications/unread-count", get(unread_count))
        .route("/notifications/read-all", put(mark_all_read))
        .route("/notifications/{id}/read", put(mark_read))
}

async fn list(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Query(page): Query<Pagination>,
) -> AppResult<Json<Vec<Notification>>> {
    let conn = state.db.get()?;
    let items = notifications::list(&conn, &me.id, page.limit(), page.offset())?;
    Ok(Json(items))
}

async fn unread_count(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let count = notifications::unread_count(&conn, &me.id)?;
    Ok(Json(json!({ "count": count })))
}

/// Someone else's notification looks the same as a missing one.
async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    if notifications::mark_read(&conn, &id, &me.id)? == 0 {
        return Err(AppError::NotFound);
    }
    Ok(Json(json!({ "success": true })))
}

async fn mark_all_read(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let updated = notifications::mark_all_read(&conn, &me.id)?;
    Ok(Json(json!({ "success": true, "updated": updated })))
}

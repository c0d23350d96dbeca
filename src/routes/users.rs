use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::auth::cookie::session_cookie;
use crate::auth::gateway::validate_date_of_birth;
use crate::db::models::{FollowStatus, Post, User, UserSummary};
use crate::db::users::ProfileUpdate;
use crate::db::{follows, notifications, posts, users};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, JsonBody, MaybeUser};
use crate::routes::{non_blank, Pagination};
use crate::state::AppState;
use crate::visibility::{self, SqliteFacts};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/me/profile", put(update_profile))
        .route("/users/me/privacy", put(update_privacy))
        .route("/users/me/password", put(change_password))
        .route("/users/me/counts", get(my_counts))
        .route("/users/me/follow-requests", get(follow_requests))
        .route(
            "/users/me/follow-requests/{follower_id}",
            put(answer_follow_request),
        )
        .route("/users/all", get(all_users))
        .route("/users/suggested", get(suggested_users))
        .route("/users/{id}/profile", get(profile))
        .route("/users/{id}/follow", post(follow).delete(unfollow))
        .route("/users/{id}/follow-status", get(follow_status))
        .route("/users/{id}/counts", get(counts))
        .route("/users/{id}/followers", get(followers))
        .route("/users/{id}/following", get(following))
}

const SUGGESTION_LIMIT: i64 = 10;

#[derive(Deserialize, Default)]
pub struct ProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub nickname: Option<String>,
    pub about_me: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Deserialize)]
pub struct PrivacyRequest {
    pub is_public: bool,
}

#[derive(Deserialize)]
pub struct PasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct FollowAction {
    #[serde(default)]
    pub action: String,
}

/// A profile as others see it. Contact and birth date are for the owner only.
#[derive(Serialize)]
pub struct ProfileUser {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub nickname: Option<String>,
    pub about_me: Option<String>,
    pub avatar_url: Option<String>,
    pub is_public: bool,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
}

impl ProfileUser {
    pub fn new(user: User, is_owner: bool) -> Self {
        let (email, date_of_birth) = if is_owner {
            (Some(user.email), Some(user.date_of_birth))
        } else {
            (None, None)
        };
        Self {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            nickname: user.nickname,
            about_me: user.about_me,
            avatar_url: user.avatar_url,
            is_public: user.is_public,
            created_at: user.created_at,
            email,
            date_of_birth,
        }
    }
}

#[derive(Serialize)]
pub struct FollowCounts {
    pub followers_count: i64,
    pub following_count: i64,
}

#[derive(Serialize)]
pub struct ProfileView {
    pub user: ProfileUser,
    pub followers_count: i64,
    pub following_count: i64,
    /// The requester's edge toward this profile.
    pub follow_status: Option<FollowStatus>,
    pub is_own_profile: bool,
    pub posts: Vec<Post>,
}

/// Readable profile of `id`, or 403 "Profile is private".
pub(crate) fn load_viewable_profile(
    conn: &rusqlite::Connection,
    id: &str,
    requester: Option<&str>,
) -> AppResult<User> {
    let user = users::find_by_id(conn, id)?.ok_or(AppError::NotFound)?;
    if !visibility::can_view_profile(requester, &user, &SqliteFacts::new(conn))? {
        return Err(AppError::Forbidden("Profile is private".into()));
    }
    Ok(user)
}

/// GET /api/users/{id}/profile
async fn profile(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Json<ProfileView>> {
    let conn = state.db.get()?;
    let user = load_viewable_profile(&conn, &id, viewer.id())?;

    let (followers_count, following_count) = follows::counts(&conn, &id)?;
    let follow_status = match viewer.id() {
        Some(me) if me != id => follows::status(&conn, me, &id)?,
        _ => None,
    };
    let page = Pagination::default();
    let posts = posts::by_author(&conn, &id, viewer.id(), page.limit(), page.offset())?;
    let is_own_profile = viewer.id() == Some(id.as_str());

    Ok(Json(ProfileView {
        is_own_profile,
        user: ProfileUser::new(user, is_own_profile),
        followers_count,
        following_count,
        follow_status,
        posts,
    }))
}

/// PUT /api/users/me/profile
async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    JsonBody(req): JsonBody<ProfileRequest>,
) -> AppResult<Json<User>> {
    let first_name = req.first_name.as_deref().map(str::trim);
    let last_name = req.last_name.as_deref().map(str::trim);
    if first_name == Some("") || last_name == Some("") {
        return Err(AppError::BadRequest("First and last name cannot be empty".into()));
    }
    if let Some(dob) = req.date_of_birth.as_deref() {
        validate_date_of_birth(dob)?;
    }

    let update = ProfileUpdate {
        first_name: first_name.map(String::from),
        last_name: last_name.map(String::from),
        date_of_birth: req.date_of_birth.as_deref().map(|d| d.trim().to_string()),
        nickname: req.nickname.as_deref().map(|v| v.trim().to_string()),
        about_me: req.about_me.as_deref().map(|v| v.trim().to_string()),
        avatar_url: non_blank(req.avatar_url.as_deref()).map(String::from),
    };

    let conn = state.db.get()?;
    users::update_profile(&conn, &me.id, &update)?;
    let user = users::find_by_id(&conn, &me.id)?.ok_or(AppError::NotFound)?;
    Ok(Json(user))
}

/// PUT /api/users/me/privacy: going public settles pending follow requests
async fn update_privacy(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    JsonBody(req): JsonBody<PrivacyRequest>,
) -> AppResult<Json<User>> {
    let mut conn = state.db.get()?;
    let tx = conn.transaction()?;
    users::set_public(&tx, &me.id, req.is_public)?;
    if req.is_public {
        let accepted = follows::accept_all_pending(&tx, &me.id)?;
        if accepted > 0 {
            tracing::info!(user_id = %me.id, accepted, "Accepted pending follow requests");
        }
    }
    let user = users::find_by_id(&tx, &me.id)?.ok_or(AppError::NotFound)?;
    tx.commit()?;

    Ok(Json(user))
}

/// PUT /api/users/me/password: every session is revoked; the caller gets a new one
async fn change_password(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    JsonBody(req): JsonBody<PasswordRequest>,
) -> AppResult<Response> {
    let token = state
        .auth
        .change_password(&me.id, &req.current_password, &req.new_password)
        .await?;

    Ok((
        [(header::SET_COOKIE, session_cookie(&state.config.auth, &token))],
        Json(json!({ "success": true })),
    )
        .into_response())
}

/// POST /api/users/{id}/follow: immediate for public profiles, a request otherwise
async fn follow(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    if id == me.id {
        return Err(AppError::BadRequest("You cannot follow yourself".into()));
    }

    let mut conn = state.db.get()?;
    let target = users::find_by_id(&conn, &id)?.ok_or(AppError::NotFound)?;
    let status = if target.is_public {
        FollowStatus::Accepted
    } else {
        FollowStatus::Pending
    };

    let tx = conn.transaction()?;
    if !follows::insert(&tx, &me.id, &id, status)? {
        return Err(AppError::Conflict(
            "Already following or request pending".into(),
        ));
    }

    let (kind, message) = match status {
        FollowStatus::Accepted => (
            notifications::FOLLOW,
            format!("{} started following you", me.display_name()),
        ),
        FollowStatus::Pending => (
            notifications::FOLLOW_REQUEST,
            format!("{} wants to follow you", me.display_name()),
        ),
    };
    notifications::create(&tx, &id, kind, &message, Some(&me.id))?;
    tx.commit()?;

    Ok(Json(json!({ "status": status })))
}

/// DELETE /api/users/{id}/follow: unfollow, or cancel a pending request
async fn unfollow(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    if follows::delete(&conn, &me.id, &id)? == 0 {
        return Err(AppError::NotFound);
    }
    Ok(Json(json!({ "success": true })))
}

/// GET /api/users/{id}/followers
async fn followers(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<UserSummary>>> {
    let conn = state.db.get()?;
    load_viewable_profile(&conn, &id, viewer.id())?;
    Ok(Json(follows::followers(&conn, &id)?))
}

/// GET /api/users/{id}/following
async fn following(
    State(state): State<AppState>,
    viewer: MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<UserSummary>>> {
    let conn = state.db.get()?;
    load_viewable_profile(&conn, &id, viewer.id())?;
    Ok(Json(follows::following(&conn, &id)?))
}

/// GET /api/users/me/follow-requests
async fn follow_requests(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
) -> AppResult<Json<Vec<UserSummary>>> {
    let conn = state.db.get()?;
    Ok(Json(follows::pending_requests(&conn, &me.id)?))
}

/// PUT /api/users/me/follow-requests/{follower_id}
async fn answer_follow_request(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(follower_id): Path<String>,
    JsonBody(req): JsonBody<FollowAction>,
) -> AppResult<Json<Value>> {
    let mut conn = state.db.get()?;

    match req.action.trim() {
        "accept" => {
            let tx = conn.transaction()?;
            if follows::accept(&tx, &follower_id, &me.id)? == 0 {
                return Err(AppError::NotFound);
            }
            notifications::create(
                &tx,
                &follower_id,
                notifications::FOLLOW_ACCEPTED,
                &format!("{} accepted your follow request", me.display_name()),
                Some(&me.id),
            )?;
            tx.commit()?;
            Ok(Json(json!({ "status": FollowStatus::Accepted })))
        }
        "decline" => {
            if follows::decline(&conn, &follower_id, &me.id)? == 0 {
                return Err(AppError::NotFound);
            }
            Ok(Json(json!({ "success": true })))
        }
        _ => Err(AppError::BadRequest("Action must be accept or decline".into())),
    }
}

/// GET /api/users/{id}/follow-status: the caller's edge toward `id`
async fn follow_status(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    if !users::exists(&conn, &id)? {
        return Err(AppError::NotFound);
    }
    let status = match follows::status(&conn, &me.id, &id)? {
        Some(status) => status.as_str(),
        None => "none",
    };
    Ok(Json(json!({ "status": status, "is_self": id == me.id })))
}

fn load_counts(conn: &rusqlite::Connection, id: &str) -> AppResult<FollowCounts> {
    let (followers_count, following_count) = follows::counts(conn, id)?;
    Ok(FollowCounts {
        followers_count,
        following_count,
    })
}

/// GET /api/users/{id}/counts
async fn counts(
    State(state): State<AppState>,
    CurrentUser(_me): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<FollowCounts>> {
    let conn = state.db.get()?;
    if !users::exists(&conn, &id)? {
        return Err(AppError::NotFound);
    }
    Ok(Json(load_counts(&conn, &id)?))
}

/// GET /api/users/me/counts
async fn my_counts(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
) -> AppResult<Json<FollowCounts>> {
    let conn = state.db.get()?;
    Ok(Json(load_counts(&conn, &me.id)?))
}

/// GET /api/users/all: everyone but the caller, by name
async fn all_users(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Query(page): Query<Pagination>,
) -> AppResult<Json<Vec<UserSummary>>> {
    let conn = state.db.get()?;
    Ok(Json(users::list_others(&conn, &me.id, page.limit(), page.offset())?))
}

/// GET /api/users/suggested: people the caller has no edge to yet
async fn suggested_users(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
) -> AppResult<Json<Vec<UserSummary>>> {
    let conn = state.db.get()?;
    Ok(Json(follows::suggestions(&conn, &me.id, SUGGESTION_LIMIT)?))
}

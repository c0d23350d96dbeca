use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::activities::{self, NewActivity};
use crate::db::models::{ActivityKind, Comment, ReactionSummary, TargetType};
use crate::db::{comments, groups, notifications, posts, reactions};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, JsonBody, MaybeUser};
use crate::routes::posts::{
    apply_reaction, load_visible_post, parse_reaction, ReactRequest, Reaction,
};
use crate::routes::{non_blank, Pagination};
use crate::state::AppState;
use crate::visibility;

const DEFAULT_COMMENT_PAGE: i64 = 50;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/posts/{id}/comments",
            get(list_comments).post(create_comment),
        )
        .route(
            "/comments/{id}",
            get(get_comment).put(update_comment).delete(delete_comment),
        )
        .route("/comments/{id}/reactions", get(get_reactions).post(react))
}

#[derive(Deserialize)]
pub struct CommentListQuery {
    pub parent_id: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct CreateCommentRequest {
    #[serde(default)]
    pub content: String,
    pub image_url: Option<String>,
    pub parent_id: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateCommentRequest {
    #[serde(default)]
    pub content: String,
    pub image_url: Option<String>,
}

async fn list_comments(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(post_id): Path<String>,
    Query(q): Query<CommentListQuery>,
) -> AppResult<Json<Vec<Comment>>> {
    let page = Pagination {
        page: q.page,
        limit: Some(q.limit.unwrap_or(DEFAULT_COMMENT_PAGE)),
    };

    let conn = state.db.get()?;
    load_visible_post(&conn, &post_id, user.id())?;
    let items = comments::list(
        &conn,
        &post_id,
        non_blank(q.parent_id.as_deref()),
        page.limit(),
        page.offset(),
    )?;
    Ok(Json(items))
}

async fn create_comment(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(post_id): Path<String>,
    JsonBody(req): JsonBody<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    let content = req.content.trim();
    let image_url = non_blank(req.image_url.as_deref());
    if content.is_empty() && image_url.is_none() {
        return Err(AppError::BadRequest("Comment cannot be empty".into()));
    }

    let mut conn = state.db.get()?;
    let post = load_visible_post(&conn, &post_id, Some(&me.id))?;

    let parent_id = non_blank(req.parent_id.as_deref());
    if let Some(parent_id) = parent_id {
        match comments::find(&conn, parent_id)? {
            Some(parent) if parent.post_id == post.id => {}
            Some(_) => {
                return Err(AppError::BadRequest(
                    "Parent comment does not belong to this post".into(),
                ))
            }
            None => return Err(AppError::BadRequest("Parent comment not found".into())),
        }
    }

    let tx = conn.transaction()?;
    let comment = comments::insert(&tx, &post.id, &me.id, parent_id, content, image_url)?;
    activities::record(
        &tx,
        &NewActivity {
            user_id: &me.id,
            kind: ActivityKind::CommentCreated,
            target_type: TargetType::Comment,
            target_id: &comment.id,
            target_user_id: &post.user_id,
            post_id: &post.id,
            content: Some(content),
        },
    )?;
    if post.user_id != me.id {
        notifications::create(
            &tx,
            &post.user_id,
            notifications::COMMENT,
            &format!("{} commented on your post", me.display_name()),
            Some(&post.id),
        )?;
    }
    tx.commit()?;

    Ok((StatusCode::CREATED, Json(comment)))
}

async fn get_comment(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Json<Comment>> {
    let conn = state.db.get()?;
    let comment = comments::find(&conn, &id)?.ok_or(AppError::NotFound)?;
    load_visible_post(&conn, &comment.post_id, user.id())?;
    Ok(Json(comment))
}

async fn update_comment(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateCommentRequest>,
) -> AppResult<Json<Comment>> {
    let conn = state.db.get()?;
    let comment = comments::find(&conn, &id)?.ok_or(AppError::NotFound)?;
    if !visibility::can_mutate(&me.id, &comment.user_id) {
        return Err(AppError::Forbidden("You can only edit your own comments".into()));
    }

    let content = req.content.trim();
    let image_url = match req.image_url.as_deref() {
        Some(url) => non_blank(Some(url)),
        None => comment.image_url.as_deref(),
    };
    if content.is_empty() && image_url.is_none() {
        return Err(AppError::BadRequest("Comment cannot be empty".into()));
    }

    comments::update(&conn, &id, content, image_url)?;
    let updated = comments::find(&conn, &id)?.ok_or(AppError::NotFound)?;
    Ok(Json(updated))
}

/// Owner, or the creator of the group the parent post lives in.
async fn delete_comment(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let comment = comments::find(&conn, &id)?.ok_or(AppError::NotFound)?;

    let group_creator = match posts::find(&conn, &comment.post_id)?.and_then(|p| p.group_id) {
        Some(gid) => groups::find(&conn, &gid)?.map(|g| g.creator_id),
        None => None,
    };
    if !visibility::can_remove(&me.id, &comment.user_id, group_creator.as_deref()) {
        return Err(AppError::Forbidden("You can only delete your own comments".into()));
    }

    comments::soft_delete(&conn, &id)?;
    Ok(Json(json!({ "success": true })))
}

/// GET /api/comments/{id}/reactions
async fn get_reactions(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Json<ReactionSummary>> {
    let conn = state.db.get()?;
    let comment = comments::find(&conn, &id)?.ok_or(AppError::NotFound)?;
    load_visible_post(&conn, &comment.post_id, user.id())?;
    Ok(Json(reactions::summary(&conn, TargetType::Comment, &id, user.id())?))
}

/// POST /api/comments/{id}/reactions: like/dislike toggle, same rules as posts
async fn react(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<ReactRequest>,
) -> AppResult<Json<ReactionSummary>> {
    let kind = parse_reaction(&req.kind)?;

    let mut conn = state.db.get()?;
    let comment = comments::find(&conn, &id)?.ok_or(AppError::NotFound)?;
    load_visible_post(&conn, &comment.post_id, Some(&me.id))?;
    let summary = apply_reaction(
        &mut conn,
        &me.id,
        &Reaction {
            target_type: TargetType::Comment,
            target_id: &comment.id,
            owner_id: &comment.user_id,
            post_id: &comment.post_id,
            kind,
        },
    )?;
    Ok(Json(summary))
}

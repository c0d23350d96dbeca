use std::collections::BTreeSet;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::activities::{self, NewActivity};
use crate::db::models::{ActivityKind, Post, Privacy, ReactionKind, ReactionSummary, TargetType};
use crate::db::posts::{self, NewPost};
use crate::db::{groups, reactions, users};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, JsonBody, MaybeUser};
use crate::routes::{non_blank, Pagination};
use crate::state::AppState;
use crate::visibility::{self, SqliteFacts};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(feed).post(create_post))
        .route(
            "/posts/{id}",
            get(get_post).put(update_post).delete(delete_post),
        )
        .route("/posts/{id}/reactions", get(get_reactions).post(react))
}

#[derive(Deserialize)]
pub struct CreatePostRequest {
    #[serde(default)]
    pub content: String,
    pub image_url: Option<String>,
    pub privacy: Option<String>,
    pub allowed_viewers: Option<Vec<String>>,
    pub group_id: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdatePostRequest {
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub privacy: Option<String>,
    pub allowed_viewers: Option<Vec<String>>,
}

#[derive(Deserialize)]
pub struct ReactRequest {
    #[serde(alias = "type", alias = "reaction")]
    pub kind: String,
}

/// Loads a live post the requester may read. Hidden posts answer 401 to
/// anonymous callers and 403 to signed-in ones.
pub(crate) fn load_visible_post(
    conn: &Connection,
    post_id: &str,
    requester: Option<&str>,
) -> AppResult<Post> {
    let post = posts::find(conn, post_id)?.ok_or(AppError::NotFound)?;
    if visibility::can_view(requester, &post, &SqliteFacts::new(conn))? {
        Ok(post)
    } else if requester.is_none() {
        Err(AppError::Unauthorized)
    } else {
        Err(AppError::Forbidden(
            "You do not have permission to view this post".into(),
        ))
    }
}

/// A reaction to apply, and who owns the thing being reacted to.
pub(crate) struct Reaction<'a> {
    pub target_type: TargetType,
    pub target_id: &'a str,
    pub owner_id: &'a str,
    pub post_id: &'a str,
    pub kind: ReactionKind,
}

pub(crate) fn parse_reaction(value: &str) -> AppResult<ReactionKind> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::BadRequest("Reaction must be like or dislike".into()))
}

/// Toggles the reaction and keeps the user's activity history in step with it.
pub(crate) fn apply_reaction(
    conn: &mut Connection,
    user_id: &str,
    reaction: &Reaction<'_>,
) -> AppResult<ReactionSummary> {
    let tx = conn.transaction()?;
    let now = reactions::toggle(
        &tx,
        reaction.target_type,
        reaction.target_id,
        user_id,
        reaction.kind,
    )?;
    activities::forget_reactions(&tx, user_id, reaction.target_type, reaction.target_id)?;
    if let Some(kind) = now {
        activities::record(
            &tx,
            &NewActivity {
                user_id,
                kind: ActivityKind::reaction(reaction.target_type, kind),
                target_type: reaction.target_type,
                target_id: reaction.target_id,
                target_user_id: reaction.owner_id,
                post_id: reaction.post_id,
                content: None,
            },
        )?;
    }
    let summary =
        reactions::summary(&tx, reaction.target_type, reaction.target_id, Some(user_id))?;
    tx.commit()?;
    Ok(summary)
}

/// The allow-list is only shown to the post's owner.
pub(crate) fn redact(mut post: Post, requester: Option<&str>) -> Post {
    if requester != Some(post.user_id.as_str()) {
        post.allowed_viewers.clear();
    }
    post
}

fn parse_privacy(value: Option<&str>) -> AppResult<Option<Privacy>> {
    value
        .map(|p| {
            p.trim()
                .parse::<Privacy>()
                .map_err(|_| AppError::BadRequest("Invalid privacy setting".into()))
        })
        .transpose()
}

/// Dedupes the list, drops the author and rejects unknown users.
fn clean_viewers(conn: &Connection, author_id: &str, viewers: &[String]) -> AppResult<Vec<String>> {
    let unique: BTreeSet<&str> = viewers
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty() && *v != author_id)
        .collect();

    for viewer in &unique {
        if !users::exists(conn, viewer)? {
            return Err(AppError::BadRequest(format!(
                "Unknown user in allowed_viewers: {viewer}"
            )));
        }
    }
    Ok(unique.into_iter().map(String::from).collect())
}

/// GET /api/posts: newest visible posts
async fn feed(
    State(state): State<AppState>,
    user: MaybeUser,
    Query(page): Query<Pagination>,
) -> AppResult<Json<Vec<Post>>> {
    let conn = state.db.get()?;
    let posts = posts::feed(&conn, user.id(), page.limit(), page.offset())?;
    Ok(Json(posts))
}

/// POST /api/posts
async fn create_post(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    JsonBody(req): JsonBody<CreatePostRequest>,
) -> AppResult<(StatusCode, Json<Post>)> {
    let content = req.content.trim();
    let image_url = non_blank(req.image_url.as_deref());
    if content.is_empty() && image_url.is_none() {
        return Err(AppError::BadRequest("Post content cannot be empty".into()));
    }

    let mut conn = state.db.get()?;
    let group_id = non_blank(req.group_id.as_deref());

    let (privacy, viewers) = match group_id {
        Some(group_id) => {
            if groups::find(&conn, group_id)?.is_none() {
                return Err(AppError::NotFound);
            }
            if !groups::is_accepted_member(&conn, group_id, &me.id)? {
                return Err(AppError::Forbidden(
                    "You must be a member of this group to post".into(),
                ));
            }
            (Privacy::Group, Vec::new())
        }
        None => {
            let privacy = parse_privacy(req.privacy.as_deref())?.unwrap_or(Privacy::Public);
            if privacy == Privacy::Group {
                return Err(AppError::BadRequest("Group posts require a group_id".into()));
            }
            let viewers = match (privacy, req.allowed_viewers.as_deref()) {
                (Privacy::PrivateList, Some(list)) => clean_viewers(&conn, &me.id, list)?,
                _ => Vec::new(),
            };
            (privacy, viewers)
        }
    };

    let tx = conn.transaction()?;
    let post = posts::insert(
        &tx,
        &NewPost {
            user_id: &me.id,
            group_id,
            content,
            image_url,
            privacy,
            allowed_viewers: &viewers,
        },
    )?;
    activities::record(
        &tx,
        &NewActivity {
            user_id: &me.id,
            kind: ActivityKind::PostCreated,
            target_type: TargetType::Post,
            target_id: &post.id,
            target_user_id: &me.id,
            post_id: &post.id,
            content: Some(content),
        },
    )?;
    tx.commit()?;

    tracing::info!(post_id = %post.id, privacy = %post.privacy, "Post created");
    Ok((StatusCode::CREATED, Json(post)))
}

/// GET /api/posts/{id}
async fn get_post(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Json<Post>> {
    let conn = state.db.get()?;
    let post = load_visible_post(&conn, &id, user.id())?;
    Ok(Json(redact(post, user.id())))
}

/// PUT /api/posts/{id}: owner only
async fn update_post(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdatePostRequest>,
) -> AppResult<Json<Post>> {
    let mut conn = state.db.get()?;
    let post = posts::find(&conn, &id)?.ok_or(AppError::NotFound)?;
    if !visibility::can_mutate(&me.id, &post.user_id) {
        return Err(AppError::Forbidden("You can only edit your own posts".into()));
    }

    let content = req.content.as_deref().map(str::trim).unwrap_or(&post.content);
    let image_url = match req.image_url.as_deref() {
        Some(url) => non_blank(Some(url)),
        None => post.image_url.as_deref(),
    };
    if content.is_empty() && image_url.is_none() {
        return Err(AppError::BadRequest("Post content cannot be empty".into()));
    }

    let privacy = match parse_privacy(req.privacy.as_deref())? {
        Some(p) if post.group_id.is_some() && p != Privacy::Group => {
            return Err(AppError::BadRequest(
                "Group posts cannot change their privacy".into(),
            ))
        }
        Some(Privacy::Group) if post.group_id.is_none() => {
            return Err(AppError::BadRequest("Group posts require a group_id".into()))
        }
        Some(p) => p,
        None => post.privacy,
    };

    let viewers = match (privacy, req.allowed_viewers.as_deref()) {
        (Privacy::PrivateList, Some(list)) => Some(clean_viewers(&conn, &me.id, list)?),
        (Privacy::PrivateList, None) => None,
        _ => Some(Vec::new()),
    };

    let tx = conn.transaction()?;
    posts::update(&tx, &id, content, image_url, privacy)?;
    if let Some(viewers) = viewers {
        posts::replace_allowed_viewers(&tx, &id, &viewers)?;
    }
    let updated = posts::find(&tx, &id)?.ok_or(AppError::NotFound)?;
    tx.commit()?;

    Ok(Json(updated))
}

/// DELETE /api/posts/{id}: owner or the group's creator; soft delete
async fn delete_post(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let conn = state.db.get()?;
    let post = posts::find(&conn, &id)?.ok_or(AppError::NotFound)?;

    let group_creator = match post.group_id.as_deref() {
        Some(gid) => groups::find(&conn, gid)?.map(|g| g.creator_id),
        None => None,
    };
    if !visibility::can_remove(&me.id, &post.user_id, group_creator.as_deref()) {
        return Err(AppError::Forbidden("You can only delete your own posts".into()));
    }

    posts::soft_delete(&conn, &id)?;
    tracing::info!(post_id = %id, by = %me.id, "Post deleted");
    Ok(Json(json!({ "success": true })))
}

/// GET /api/posts/{id}/reactions
async fn get_reactions(
    State(state): State<AppState>,
    user: MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Json<ReactionSummary>> {
    let conn = state.db.get()?;
    load_visible_post(&conn, &id, user.id())?;
    Ok(Json(reactions::summary(&conn, TargetType::Post, &id, user.id())?))
}

/// POST /api/posts/{id}/reactions: like/dislike toggle
async fn react(
    State(state): State<AppState>,
    CurrentUser(me): CurrentUser,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<ReactRequest>,
) -> AppResult<Json<ReactionSummary>> {
    let kind = parse_reaction(&req.kind)?;

    let mut conn = state.db.get()?;
    let post = load_visible_post(&conn, &id, Some(&me.id))?;
    let summary = apply_reaction(
        &mut conn,
        &me.id,
        &Reaction {
            target_type: TargetType::Post,
            target_id: &post.id,
            owner_id: &post.user_id,
            post_id: &post.id,
            kind,
        },
    )?;
    Ok(Json(summary))
}

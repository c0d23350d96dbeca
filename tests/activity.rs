mod common;

use axum::http::StatusCode;
use common::{json_body, spawn_app, Account, TestApp};
use serde_json::{json, Value};

async fn activity(app: &TestApp, uri: &str, who: &Account) -> Vec<Value> {
    let res = app.get(uri, Some(&who.cookie)).await;
    assert_eq!(res.status(), StatusCode::OK, "GET {uri}");
    json_body(res).await["activities"].as_array().unwrap().clone()
}

fn kinds(items: &[Value]) -> Vec<&str> {
    items
        .iter()
        .map(|a| a["activity_type"].as_str().unwrap())
        .collect()
}

async fn comment(app: &TestApp, who: &Account, post: &str, content: &str) -> String {
    let res = app
        .post(
            &format!("/api/posts/{post}/comments"),
            Some(&who.cookie),
            json!({ "content": content }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    json_body(res).await["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn comment_reactions_toggle_over_http() {
    let app = spawn_app();
    let author = app.register("author@example.com", true).await;
    let fan = app.register("fan@example.com", true).await;
    let post = app.create_post(&author, json!({ "content": "discuss" })).await;
    let reply = comment(&app, &author, &post, "first").await;
    let uri = format!("/api/comments/{reply}/reactions");

    let res = app.post(&uri, None, json!({ "kind": "like" })).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let res = app.post(&uri, Some(&fan.cookie), json!({ "kind": "love" })).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app.post(&uri, Some(&fan.cookie), json!({ "kind": "like" })).await;
    let body = json_body(res).await;
    assert_eq!(
        (body["likeCount"].as_i64(), body["userReaction"].as_str()),
        (Some(1), Some("like"))
    );

    let res = app.post(&uri, Some(&fan.cookie), json!({ "kind": "dislike" })).await;
    let body = json_body(res).await;
    assert_eq!(
        (body["likeCount"].as_i64(), body["dislikeCount"].as_i64()),
        (Some(0), Some(1))
    );

    // Post reactions are counted separately.
    let res = app.get(&format!("/api/posts/{post}/reactions"), None).await;
    assert_eq!(json_body(res).await["dislikeCount"], 0);

    let res = app.get(&uri, None).await;
    let body = json_body(res).await;
    assert_eq!(body["dislikeCount"], 1);
    assert!(body["userReaction"].is_null());

    let res = app.get("/api/comments/missing/reactions", None).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn comment_reactions_follow_post_visibility() {
    let app = spawn_app();
    let author = app.register("author@example.com", true).await;
    let stranger = app.register("stranger@example.com", true).await;
    let post = app
        .create_post(&author, json!({ "content": "inner circle", "privacy": "followers" }))
        .await;
    let reply = comment(&app, &author, &post, "hush").await;
    let uri = format!("/api/comments/{reply}/reactions");

    let res = app.post(&uri, Some(&stranger.cookie), json!({ "kind": "like" })).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let res = app.get(&uri, None).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn activity_tracks_posts_comments_and_reactions() {
    let app = spawn_app();
    let author = app.register("author@example.com", true).await;
    let fan = app.register("fan@example.com", true).await;
    let post = app.create_post(&author, json!({ "content": "hello world" })).await;
    let reply = comment(&app, &fan, &post, "nice one").await;
    app.post(&format!("/api/posts/{post}/reactions"), Some(&fan.cookie), json!({ "kind": "like" }))
        .await;
    app.post(
        &format!("/api/comments/{reply}/reactions"),
        Some(&fan.cookie),
        json!({ "kind": "like" }),
    )
    .await;

    let mine = activity(&app, "/api/activity", &author).await;
    assert_eq!(kinds(&mine), vec!["post_created"]);
    assert_eq!(mine[0]["content_preview"], "hello world");
    assert_eq!(mine[0]["post"]["id"], post.as_str());

    let theirs = activity(&app, "/api/activity", &fan).await;
    let seen = kinds(&theirs);
    assert_eq!(seen.len(), 3);
    for kind in ["comment_created", "post_liked", "comment_liked"] {
        assert!(seen.contains(&kind), "missing {kind} in {seen:?}");
    }
    let commented = theirs
        .iter()
        .find(|a| a["activity_type"] == "comment_created")
        .unwrap();
    assert_eq!(commented["target_user_id"], author.id.as_str());
    assert_eq!(commented["comment"]["id"], reply.as_str());

    // Switching the reaction replaces the entry; taking it back removes it.
    app.post(
        &format!("/api/posts/{post}/reactions"),
        Some(&fan.cookie),
        json!({ "kind": "dislike" }),
    )
    .await;
    let seen = activity(&app, "/api/activity?types=post_liked,post_disliked", &fan).await;
    assert_eq!(kinds(&seen), vec!["post_disliked"]);
    app.post(
        &format!("/api/posts/{post}/reactions"),
        Some(&fan.cookie),
        json!({ "kind": "dislike" }),
    )
    .await;
    let seen = activity(&app, "/api/activity?types=post_liked,post_disliked", &fan).await;
    assert!(seen.is_empty());

    let res = app.get("/api/activity?types=post_like", Some(&fan.cookie)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn hidden_entries_show_only_on_request() {
    let app = spawn_app();
    let ada = app.register("ada@example.com", true).await;
    let bob = app.register("bob@example.com", true).await;
    app.create_post(&ada, json!({ "content": "engines" })).await;

    let items = activity(&app, "/api/activity", &ada).await;
    let id = items[0]["id"].as_str().unwrap().to_string();

    let res = app.put(&format!("/api/activity/{id}/hide"), Some(&bob.cookie), json!({})).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let res = app.put(&format!("/api/activity/{id}/hide"), Some(&ada.cookie), json!({})).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await["success"], true);

    assert!(activity(&app, "/api/activity", &ada).await.is_empty());
    assert!(activity(&app, &format!("/api/activity/{}", ada.id), &bob).await.is_empty());
    let all = activity(&app, "/api/activity?show_hidden=true", &ada).await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0]["is_hidden"], true);

    let res = app.put(&format!("/api/activity/{id}/unhide"), Some(&ada.cookie), json!({})).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(activity(&app, "/api/activity", &ada).await.len(), 1);
}

#[tokio::test]
async fn settings_shape_what_others_see() {
    let app = spawn_app();
    let ada = app.register("ada@example.com", true).await;
    let bob = app.register("bob@example.com", true).await;
    let post = app.create_post(&ada, json!({ "content": "engines" })).await;
    comment(&app, &ada, &post, "and looms").await;
    let uri = format!("/api/activity/{}", ada.id);

    let res = app.get("/api/activity/settings", Some(&ada.cookie)).await;
    assert_eq!(
        json_body(res).await,
        json!({
            "show_posts": true,
            "show_comments": true,
            "show_likes": true,
            "show_to_followers_only": false,
        })
    );
    assert_eq!(activity(&app, &uri, &bob).await.len(), 2);

    let res = app
        .put("/api/activity/settings", Some(&ada.cookie), json!({ "show_comments": false }))
        .await;
    let saved = json_body(res).await;
    assert_eq!(saved["show_posts"], true);
    assert_eq!(saved["show_comments"], false);
    assert_eq!(kinds(&activity(&app, &uri, &bob).await), vec!["post_created"]);
    // The owner still sees everything.
    assert_eq!(activity(&app, "/api/activity", &ada).await.len(), 2);

    app.put(
        "/api/activity/settings",
        Some(&ada.cookie),
        json!({ "show_to_followers_only": true }),
    )
    .await;
    assert!(activity(&app, &uri, &bob).await.is_empty());

    app.follow(&bob, &ada).await;
    assert_eq!(kinds(&activity(&app, &uri, &bob).await), vec!["post_created"]);
}

#[tokio::test]
async fn private_activity_needs_an_accepted_follow() {
    let app = spawn_app();
    let shy = app.register("shy@example.com", false).await;
    let fan = app.register("fan@example.com", true).await;
    app.create_post(&shy, json!({ "content": "diary" })).await;

    let res = app.get(&format!("/api/activity/{}", shy.id), Some(&fan.cookie)).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let res = app.get(&format!("/api/activity/{}/posts", shy.id), Some(&fan.cookie)).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let res = app.get("/api/activity/nobody", Some(&fan.cookie)).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    app.follow(&fan, &shy).await;
    app.put(
        &format!("/api/users/me/follow-requests/{}", fan.id),
        Some(&shy.cookie),
        json!({ "action": "accept" }),
    )
    .await;

    assert_eq!(activity(&app, &format!("/api/activity/{}", shy.id), &fan).await.len(), 1);
    let res = app.get(&format!("/api/activity/{}/posts", shy.id), Some(&fan.cookie)).await;
    let page = json_body(res).await;
    assert_eq!(page["posts"][0]["content"], "diary");
    assert_eq!(page["total"], 1);
}

#[tokio::test]
async fn posts_carry_their_comment_count() {
    let app = spawn_app();
    let ada = app.register("ada@example.com", true).await;
    let post = app.create_post(&ada, json!({ "content": "count me" })).await;
    let first = comment(&app, &ada, &post, "one").await;
    comment(&app, &ada, &post, "two").await;

    let res = app.get(&format!("/api/posts/{post}"), None).await;
    assert_eq!(json_body(res).await["comment_count"], 2);

    app.delete(&format!("/api/comments/{first}"), Some(&ada.cookie)).await;
    let res = app.get("/api/posts", Some(&ada.cookie)).await;
    assert_eq!(json_body(res).await[0]["comment_count"], 1);

    let res = app.get("/api/activity/posts", Some(&ada.cookie)).await;
    assert_eq!(json_body(res).await["posts"][0]["comment_count"], 1);
}

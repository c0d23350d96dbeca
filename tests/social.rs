mod common;

use axum::http::StatusCode;
use common::{json_body, spawn_app, Account, TestApp};
use serde_json::{json, Value};

async fn create_group(app: &TestApp, owner: &Account, title: &str) -> String {
    let res = app
        .post("/api/groups", Some(&owner.cookie), json!({ "title": title, "description": "about" }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    json_body(res).await["id"].as_str().unwrap().to_string()
}

async fn notifications(app: &TestApp, who: &Account) -> Vec<Value> {
    let res = app.get("/api/notifications", Some(&who.cookie)).await;
    assert_eq!(res.status(), StatusCode::OK);
    json_body(res).await.as_array().unwrap().clone()
}

#[tokio::test]
async fn group_membership_lifecycle() {
    let app = spawn_app();
    let owner = app.register("owner@example.com", true).await;
    let joiner = app.register("joiner@example.com", true).await;
    let group = create_group(&app, &owner, "Crabs").await;

    let res = app.post(&format!("/api/groups/{group}/join"), Some(&joiner.cookie), json!({})).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(json_body(res).await["status"], "pending");
    let res = app.post(&format!("/api/groups/{group}/join"), Some(&joiner.cookie), json!({})).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    // Pending members are hidden from everyone but the creator.
    let res = app.get(&format!("/api/groups/{group}"), Some(&joiner.cookie)).await;
    let detail = json_body(res).await;
    assert_eq!(detail["membership"], "pending");
    assert_eq!(detail["members"].as_array().unwrap().len(), 1);
    let res = app.get(&format!("/api/groups/{group}"), Some(&owner.cookie)).await;
    assert_eq!(json_body(res).await["members"].as_array().unwrap().len(), 2);

    let kinds: Vec<Value> = notifications(&app, &owner)
        .await
        .iter()
        .map(|n| n["kind"].clone())
        .collect();
    assert!(kinds.contains(&json!("group_join_request")));

    let members_uri = format!("/api/groups/{group}/members/{}", joiner.id);
    let res = app.put(&members_uri, Some(&joiner.cookie), json!({ "action": "accept" })).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let res = app.put(&members_uri, Some(&owner.cookie), json!({ "action": "accept" })).await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = app.get(&format!("/api/groups/{group}"), Some(&joiner.cookie)).await;
    let detail = json_body(res).await;
    assert_eq!(detail["membership"], "accepted");
    assert_eq!(detail["member_count"], 2);

    let res = app.delete(&format!("/api/groups/{group}/join"), Some(&owner.cookie)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let res = app.delete(&format!("/api/groups/{group}/join"), Some(&joiner.cookie)).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn only_the_creator_edits_or_deletes_a_group() {
    let app = spawn_app();
    let owner = app.register("owner@example.com", true).await;
    let other = app.register("other@example.com", true).await;
    let group = create_group(&app, &owner, "Crabs").await;
    let uri = format!("/api/groups/{group}");

    let res = app.put(&uri, Some(&other.cookie), json!({ "title": "Mine now" })).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let res = app.delete(&uri, Some(&other.cookie)).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = app.put(&uri, Some(&owner.cookie), json!({ "title": "  " })).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let res = app.put(&uri, Some(&owner.cookie), json!({ "title": "Lobsters" })).await;
    assert_eq!(json_body(res).await["title"], "Lobsters");

    let res = app.delete(&uri, Some(&owner.cookie)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = app.get(&uri, Some(&owner.cookie)).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn events_notify_members_and_collect_responses() {
    let app = spawn_app();
    let owner = app.register("owner@example.com", true).await;
    let member = app.register("member@example.com", true).await;
    let outsider = app.register("outsider@example.com", true).await;
    let group = create_group(&app, &owner, "Crabs").await;

    app.post(&format!("/api/groups/{group}/join"), Some(&member.cookie), json!({})).await;
    app.put(
        &format!("/api/groups/{group}/members/{}", member.id),
        Some(&owner.cookie),
        json!({ "action": "accept" }),
    )
    .await;

    let events_uri = format!("/api/groups/{group}/events");
    let res = app
        .post(
            &events_uri,
            Some(&owner.cookie),
            json!({ "title": "Meetup", "event_date": "next week" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .post(
            &events_uri,
            Some(&owner.cookie),
            json!({ "title": "Meetup", "description": "pier 3", "event_date": "2026-11-01T18:30" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let event_id = json_body(res).await["id"].as_str().unwrap().to_string();

    let kinds: Vec<Value> = notifications(&app, &member)
        .await
        .iter()
        .map(|n| n["kind"].clone())
        .collect();
    assert!(kinds.contains(&json!("group_event")));
    assert!(!notifications(&app, &owner)
        .await
        .iter()
        .any(|n| n["kind"] == "group_event"));

    let respond_uri = format!("/api/groups/events/{event_id}/respond");
    let res = app.post(&respond_uri, Some(&outsider.cookie), json!({ "response": "going" })).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = app.post(&respond_uri, Some(&member.cookie), json!({ "response": "going" })).await;
    assert_eq!(json_body(res).await["going"], 1);
    let res = app
        .post(&respond_uri, Some(&member.cookie), json!({ "response": "not_going" }))
        .await;
    let event = json_body(res).await;
    assert_eq!((event["going"].as_i64(), event["not_going"].as_i64()), (Some(0), Some(1)));

    let res = app.get(&events_uri, Some(&outsider.cookie)).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let res = app.get(&events_uri, Some(&member.cookie)).await;
    assert_eq!(json_body(res).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn comments_thread_and_ownership() {
    let app = spawn_app();
    let author = app.register("author@example.com", true).await;
    let commenter = app.register("commenter@example.com", true).await;
    let other = app.register("other@example.com", true).await;
    let post = app.create_post(&author, json!({ "content": "discuss" })).await;
    let comments_uri = format!("/api/posts/{post}/comments");

    let res = app.post(&comments_uri, Some(&commenter.cookie), json!({ "content": "  " })).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app.post(&comments_uri, Some(&commenter.cookie), json!({ "content": "first" })).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let top = json_body(res).await["id"].as_str().unwrap().to_string();

    let res = app
        .post(&comments_uri, Some(&author.cookie), json!({ "content": "reply", "parent_id": top }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = app.get(&comments_uri, None).await;
    let listed = json_body(res).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    let res = app.get(&format!("{comments_uri}?parent_id={top}"), None).await;
    assert_eq!(json_body(res).await[0]["content"], "reply");

    let comment_uri = format!("/api/comments/{top}");
    let res = app.put(&comment_uri, Some(&other.cookie), json!({ "content": "edited" })).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let res = app.delete(&comment_uri, Some(&other.cookie)).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = app.put(&comment_uri, Some(&commenter.cookie), json!({ "content": "edited" })).await;
    assert_eq!(json_body(res).await["content"], "edited");

    let kinds: Vec<Value> = notifications(&app, &author)
        .await
        .iter()
        .map(|n| n["kind"].clone())
        .collect();
    assert_eq!(kinds, vec![json!("comment")]);

    let res = app.delete(&comment_uri, Some(&commenter.cookie)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = app.get(&comment_uri, None).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn comments_inherit_post_visibility() {
    let app = spawn_app();
    let author = app.register("author@example.com", true).await;
    let stranger = app.register("stranger@example.com", true).await;
    let post = app
        .create_post(&author, json!({ "content": "hidden", "privacy": "followers" }))
        .await;

    let uri = format!("/api/posts/{post}/comments");
    let res = app.post(&uri, Some(&stranger.cookie), json!({ "content": "hi" })).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let res = app.get(&uri, None).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn private_profiles_and_follow_requests() {
    let app = spawn_app();
    let shy = app.register("shy@example.com", false).await;
    let fan = app.register("fan@example.com", true).await;
    let profile_uri = format!("/api/users/{}/profile", shy.id);

    let res = app.get(&profile_uri, Some(&fan.cookie)).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let res = app.get(&profile_uri, Some(&shy.cookie)).await;
    assert_eq!(json_body(res).await["is_own_profile"], true);

    let res = app
        .post(&format!("/api/users/{}/follow", fan.id), Some(&fan.cookie), json!({}))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    assert_eq!(app.follow(&fan, &shy).await["status"], "pending");
    let res = app
        .post(&format!("/api/users/{}/follow", shy.id), Some(&fan.cookie), json!({}))
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = app.get("/api/users/me/follow-requests", Some(&shy.cookie)).await;
    let requests = json_body(res).await;
    assert_eq!(requests[0]["id"], fan.id.as_str());

    // Going public settles the pending request.
    let res = app
        .put("/api/users/me/privacy", Some(&shy.cookie), json!({ "is_public": true }))
        .await;
    assert_eq!(json_body(res).await["is_public"], true);

    let res = app.get(&profile_uri, Some(&fan.cookie)).await;
    let profile = json_body(res).await;
    assert_eq!(profile["follow_status"], "accepted");
    assert_eq!(profile["followers_count"], 1);

    let res = app.get(&format!("/api/users/{}/following", fan.id), None).await;
    assert_eq!(json_body(res).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn declined_request_can_be_filed_again() {
    let app = spawn_app();
    let shy = app.register("shy@example.com", false).await;
    let fan = app.register("fan@example.com", true).await;
    app.follow(&fan, &shy).await;

    let uri = format!("/api/users/me/follow-requests/{}", fan.id);
    let res = app.put(&uri, Some(&shy.cookie), json!({ "action": "maybe" })).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let res = app.put(&uri, Some(&shy.cookie), json!({ "action": "decline" })).await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = app.put(&uri, Some(&shy.cookie), json!({ "action": "decline" })).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    assert_eq!(app.follow(&fan, &shy).await["status"], "pending");
}

#[tokio::test]
async fn profile_update_validates_names() {
    let app = spawn_app();
    let ada = app.register("ada@example.com", true).await;

    let res = app
        .put("/api/users/me/profile", Some(&ada.cookie), json!({ "first_name": " " }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app
        .put(
            "/api/users/me/profile",
            Some(&ada.cookie),
            json!({ "nickname": "countess", "about_me": "engines" }),
        )
        .await;
    let user = json_body(res).await;
    assert_eq!(user["nickname"], "countess");
    assert_eq!(user["first_name"], "Test");
}

#[tokio::test]
async fn notifications_are_private_and_markable() {
    let app = spawn_app();
    let star = app.register("star@example.com", true).await;
    let fan = app.register("fan@example.com", true).await;
    app.follow(&fan, &star).await;

    let res = app.get("/api/notifications/unread-count", Some(&star.cookie)).await;
    assert_eq!(json_body(res).await["count"], 1);

    let items = notifications(&app, &star).await;
    assert_eq!(items[0]["kind"], "follow");
    let id = items[0]["id"].as_str().unwrap().to_string();

    let res = app.put(&format!("/api/notifications/{id}/read"), Some(&fan.cookie), json!({})).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let res = app
        .put(&format!("/api/notifications/{id}/read"), Some(&star.cookie), json!({}))
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = app.get("/api/notifications/unread-count", Some(&star.cookie)).await;
    assert_eq!(json_body(res).await["count"], 0);

    let res = app.put("/api/notifications/read-all", Some(&star.cookie), json!({})).await;
    assert_eq!(json_body(res).await["updated"], 0);
}

async fn join_and_accept(app: &TestApp, group: &str, owner: &Account, member: &Account) {
    let res = app.post(&format!("/api/groups/{group}/join"), Some(&member.cookie), json!({})).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let res = app
        .put(
            &format!("/api/groups/{group}/members/{}", member.id),
            Some(&owner.cookie),
            json!({ "action": "accept" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn group_creator_moderates_member_content() {
    let app = spawn_app();
    let owner = app.register("owner@example.com", true).await;
    let poster = app.register("poster@example.com", true).await;
    let bystander = app.register("bystander@example.com", true).await;
    let group = create_group(&app, &owner, "Crabs").await;
    join_and_accept(&app, &group, &owner, &poster).await;
    join_and_accept(&app, &group, &owner, &bystander).await;

    let post = app
        .create_post(&poster, json!({ "content": "off topic", "group_id": group }))
        .await;
    let res = app
        .post(
            &format!("/api/posts/{post}/comments"),
            Some(&poster.cookie),
            json!({ "content": "still off topic" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let comment = json_body(res).await["id"].as_str().unwrap().to_string();
    let post_uri = format!("/api/posts/{post}");
    let comment_uri = format!("/api/comments/{comment}");

    let res = app.delete(&comment_uri, Some(&bystander.cookie)).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let res = app.delete(&post_uri, Some(&bystander.cookie)).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = app.delete(&comment_uri, Some(&owner.cookie)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = app.get(&comment_uri, Some(&poster.cookie)).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = app.delete(&post_uri, Some(&owner.cookie)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = app.get(&post_uri, Some(&poster.cookie)).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn only_the_creator_removes_members() {
    let app = spawn_app();
    let owner = app.register("owner@example.com", true).await;
    let ada = app.register("ada@example.com", true).await;
    let bob = app.register("bob@example.com", true).await;
    let group = create_group(&app, &owner, "Crabs").await;
    join_and_accept(&app, &group, &owner, &ada).await;
    join_and_accept(&app, &group, &owner, &bob).await;
    let bob_uri = format!("/api/groups/{group}/members/{}", bob.id);

    let res = app.delete(&bob_uri, Some(&ada.cookie)).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let owner_uri = format!("/api/groups/{group}/members/{}", owner.id);
    let res = app.delete(&owner_uri, Some(&owner.cookie)).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = app.delete(&bob_uri, Some(&owner.cookie)).await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = app.delete(&bob_uri, Some(&owner.cookie)).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = app.get(&format!("/api/groups/{group}"), Some(&owner.cookie)).await;
    assert_eq!(json_body(res).await["member_count"], 2);
    let res = app.get(&format!("/api/groups/{group}"), Some(&bob.cookie)).await;
    assert!(json_body(res).await["membership"].is_null());
}

#[tokio::test]
async fn profiles_keep_contact_details_for_the_owner() {
    let app = spawn_app();
    let ada = app.register("ada@example.com", true).await;
    let bob = app.register("bob@example.com", true).await;
    let uri = format!("/api/users/{}/profile", ada.id);

    for cookie in [None, Some(bob.cookie.as_str())] {
        let res = app.get(&uri, cookie).await;
        assert_eq!(res.status(), StatusCode::OK);
        let user = json_body(res).await["user"].clone();
        assert_eq!(user["id"], ada.id.as_str());
        assert_eq!(user["first_name"], "Test");
        assert!(user.get("email").is_none(), "email leaked: {user}");
        assert!(user.get("date_of_birth").is_none(), "birth date leaked: {user}");
    }

    let res = app.get(&uri, Some(&ada.cookie)).await;
    let user = json_body(res).await["user"].clone();
    assert_eq!(user["email"], "ada@example.com");
    assert_eq!(user["date_of_birth"], "1990-05-17");
}

/// Makes every notification insert fail until switched back.
fn break_notifications(app: &TestApp, broken: bool) {
    let conn = app.state.db.get().unwrap();
    let sql = if broken {
        "CREATE TRIGGER notifications_down BEFORE INSERT ON notifications
         BEGIN SELECT RAISE(ABORT, 'notifications unavailable'); END;"
    } else {
        "DROP TRIGGER notifications_down;"
    };
    conn.execute_batch(sql).unwrap();
}

#[tokio::test]
async fn failed_notifications_roll_back_the_write() {
    let app = spawn_app();
    let star = app.register("star@example.com", true).await;
    let fan = app.register("fan@example.com", true).await;
    let group = create_group(&app, &star, "Crabs").await;
    let post = app.create_post(&star, json!({ "content": "say hi" })).await;
    let follow_uri = format!("/api/users/{}/follow", star.id);
    let join_uri = format!("/api/groups/{group}/join");
    let comments_uri = format!("/api/posts/{post}/comments");

    break_notifications(&app, true);

    let res = app.post(&follow_uri, Some(&fan.cookie), json!({})).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let res = app.post(&join_uri, Some(&fan.cookie), json!({})).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let res = app.post(&comments_uri, Some(&fan.cookie), json!({ "content": "hi" })).await;
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let res = app.get(&format!("/api/users/{}/following", fan.id), None).await;
    assert!(json_body(res).await.as_array().unwrap().is_empty());
    let res = app.get(&format!("/api/groups/{group}"), Some(&star.cookie)).await;
    assert_eq!(json_body(res).await["members"].as_array().unwrap().len(), 1);
    let res = app.get(&comments_uri, None).await;
    assert!(json_body(res).await.as_array().unwrap().is_empty());

    break_notifications(&app, false);

    let res = app.post(&follow_uri, Some(&fan.cookie), json!({})).await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = app.post(&join_uri, Some(&fan.cookie), json!({})).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let res = app.post(&comments_uri, Some(&fan.cookie), json!({ "content": "hi" })).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(notifications(&app, &star).await.len(), 3);
}

#[tokio::test]
async fn discovery_and_follow_status() {
    let app = spawn_app();
    let ada = app.register("ada@example.com", true).await;
    let bob = app.register("bob@example.com", true).await;
    let cat = app.register("cat@example.com", true).await;
    let dan = app.register("dan@example.com", false).await;
    app.follow(&ada, &bob).await;
    app.follow(&bob, &cat).await;
    assert_eq!(app.follow(&ada, &dan).await["status"], "pending");

    let res = app.get("/api/users/all", None).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let res = app.get("/api/users/all", Some(&ada.cookie)).await;
    let everyone = json_body(res).await;
    let ids: Vec<&str> = everyone
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids.len(), 3);
    assert!(!ids.contains(&ada.id.as_str()));
    assert!(everyone[0].get("email").is_none());

    let res = app.get("/api/users/suggested", Some(&ada.cookie)).await;
    let suggested = json_body(res).await;
    assert_eq!(suggested.as_array().unwrap().len(), 1);
    assert_eq!(suggested[0]["id"], cat.id.as_str());

    for (target, status) in [(&bob, "accepted"), (&dan, "pending"), (&cat, "none")] {
        let res = app
            .get(&format!("/api/users/{}/follow-status", target.id), Some(&ada.cookie))
            .await;
        let body = json_body(res).await;
        assert_eq!(body["status"], status);
        assert_eq!(body["is_self"], false);
    }
    let res = app
        .get(&format!("/api/users/{}/follow-status", ada.id), Some(&ada.cookie))
        .await;
    assert_eq!(json_body(res).await["is_self"], true);
    let res = app.get("/api/users/nobody/follow-status", Some(&ada.cookie)).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = app.get(&format!("/api/users/{}/counts", bob.id), Some(&ada.cookie)).await;
    assert_eq!(
        json_body(res).await,
        json!({ "followers_count": 1, "following_count": 1 })
    );
    let res = app.get("/api/users/me/counts", Some(&ada.cookie)).await;
    assert_eq!(
        json_body(res).await,
        json!({ "followers_count": 0, "following_count": 1 })
    );
    let res = app.get("/api/users/nobody/counts", Some(&ada.cookie)).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
